//! Pipetting channels and per-channel batches.

use crate::error::{LhError, LhResult};
use crate::resources::{Grid, Tip};
use crate::tracking::{TipTracker, Tracker, VolumeTracker};

/// One value per participating channel of a multi-channel command.
///
/// The batch has a slot for every channel of the head; channels without a
/// value sit the command out.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBatch<T> {
    slots: Vec<Option<T>>,
}

impl<T> ChannelBatch<T> {
    /// Empty batch for a head with `num_channels` channels.
    pub fn new(num_channels: usize) -> Self {
        Self {
            slots: (0..num_channels).map(|_| None).collect(),
        }
    }

    /// Assign `item` to `channel`.
    pub fn set(&mut self, channel: usize, item: T) -> LhResult<()> {
        let num_channels = self.slots.len();
        let slot = self.slots.get_mut(channel).ok_or_else(|| LhError::InvalidChannel {
            channel,
            reason: format!("head has {} channels", num_channels),
        })?;
        *slot = Some(item);
        Ok(())
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, channel: usize, item: T) -> LhResult<Self> {
        self.set(channel, item)?;
        Ok(self)
    }

    /// Pair `channels[i]` with `items[i]`.
    pub fn from_channels(num_channels: usize, channels: &[usize], items: Vec<T>) -> LhResult<Self> {
        if channels.len() != items.len() {
            return Err(LhError::InvalidChannel {
                channel: channels.len(),
                reason: format!("{} channels given for {} items", channels.len(), items.len()),
            });
        }
        let mut batch = Self::new(num_channels);
        for (channel, item) in channels.iter().copied().zip(items) {
            if batch.get(channel).is_some() {
                return Err(LhError::InvalidChannel {
                    channel,
                    reason: "channel used twice in one batch".into(),
                });
            }
            batch.set(channel, item)?;
        }
        Ok(batch)
    }

    /// Assign items to channels 0, 1, 2, ...
    pub fn sequential(num_channels: usize, items: Vec<T>) -> LhResult<Self> {
        let channels: Vec<usize> = (0..items.len()).collect();
        Self::from_channels(num_channels, &channels, items)
    }

    /// Number of channel slots, participating or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no channel participates.
    pub fn is_empty(&self) -> bool {
        self.participating_count() == 0
    }

    /// Value for `channel`, if it participates.
    pub fn get(&self, channel: usize) -> Option<&T> {
        self.slots.get(channel).and_then(Option::as_ref)
    }

    /// Participating channels with their values, in channel order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(channel, slot)| slot.as_ref().map(|item| (channel, item)))
    }

    /// Participating channels in order.
    pub fn channels(&self) -> Vec<usize> {
        self.iter().map(|(channel, _)| channel).collect()
    }

    /// Number of participating channels.
    pub fn participating_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// A channel, or one position of the 96 head.
///
/// The liquid tracker exists exactly while a tip is mounted.
#[derive(Debug)]
pub struct Channel {
    name: String,
    pub(crate) tips: TipTracker,
    pub(crate) liquid: Option<VolumeTracker>,
}

impl Channel {
    pub(crate) fn new(name: String) -> Self {
        Self {
            tips: TipTracker::channel(name.clone()),
            liquid: None,
            name,
        }
    }

    /// `channel 3` or `head96 B2`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a tip is mounted.
    pub fn has_tip(&self) -> bool {
        self.tips.has_tip()
    }

    /// The mounted tip as it was picked up.
    pub fn tip(&self) -> Option<&Tip> {
        self.tips.tip()
    }

    /// Name of the spot the mounted tip came from.
    pub fn origin(&self) -> Option<&str> {
        self.tips.origin()
    }

    /// Tip tracker of this channel.
    pub fn tip_tracker(&self) -> &TipTracker {
        &self.tips
    }

    /// Liquid in the mounted tip.
    pub fn volume_tracker(&self) -> Option<&VolumeTracker> {
        self.liquid.as_ref()
    }

    /// Mutable access to the liquid in the mounted tip.
    pub fn volume_tracker_mut(&mut self) -> Option<&mut VolumeTracker> {
        self.liquid.as_mut()
    }

    /// The mounted tip carrying the liquid it currently holds.
    pub fn tip_with_liquid(&self) -> Option<Tip> {
        let tip = self.tips.tip()?;
        Some(match &self.liquid {
            Some(liquid) => tip.with_liquid(liquid.get_used_volume()),
            None => tip.clone(),
        })
    }

    /// Bring the liquid tracker in line with the committed tip.
    ///
    /// A newly mounted tip starts with the liquid it was put down with. With
    /// `suspended`, the new tracker starts disabled.
    pub(crate) fn sync_liquid(&mut self, suspended: bool) {
        match self.tips.tip() {
            None => self.liquid = None,
            Some(tip) => {
                let stale = self
                    .liquid
                    .as_ref()
                    .map_or(true, |l| l.thing() != tip.name);
                if stale {
                    let mut liquid = VolumeTracker::tip(tip.name.clone(), tip.maximal_volume)
                        .with_used_volume(tip.liquid_volume);
                    if suspended {
                        liquid.set_enabled_override(Some(false));
                    }
                    self.liquid = Some(liquid);
                }
            }
        }
    }

    pub(crate) fn tip_tracker_dyn(&mut self) -> &mut dyn Tracker {
        &mut self.tips
    }

    pub(crate) fn liquid_mut(&mut self) -> LhResult<&mut VolumeTracker> {
        match self.liquid {
            Some(ref mut liquid) => Ok(liquid),
            None => Err(LhError::ChannelHasNoTip(self.name.clone())),
        }
    }

    pub(crate) fn liquid_tracker_dyn(&mut self) -> LhResult<&mut dyn Tracker> {
        Ok(self.liquid_mut()? as &mut dyn Tracker)
    }

    /// The mounted tip, or the holder-specific no-tip error.
    pub(crate) fn require_tip(&self) -> LhResult<Tip> {
        self.tip_with_liquid()
            .ok_or_else(|| LhError::ChannelHasNoTip(self.name.clone()))
    }

    /// Force empty, no history.
    pub(crate) fn clear(&mut self) {
        self.tips.clear();
        self.liquid = None;
    }
}

/// A set of independent channels.
#[derive(Debug)]
pub struct Head {
    channels: Vec<Channel>,
}

impl Head {
    pub(crate) fn new(num_channels: usize) -> Self {
        Self {
            channels: (0..num_channels)
                .map(|i| Channel::new(format!("channel {}", i)))
                .collect(),
        }
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the head has no channels.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channel `index`, or `InvalidChannel`.
    pub fn channel(&self, index: usize) -> LhResult<&Channel> {
        self.channels.get(index).ok_or_else(|| self.out_of_range(index))
    }

    /// Mutable channel `index`, or `InvalidChannel`.
    pub fn channel_mut(&mut self, index: usize) -> LhResult<&mut Channel> {
        let err = self.out_of_range(index);
        self.channels.get_mut(index).ok_or(err)
    }

    /// Channels in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.channels.iter_mut()
    }

    /// Mounted tip per channel, with its current liquid.
    pub fn state(&self) -> Vec<Option<Tip>> {
        self.channels.iter().map(Channel::tip_with_liquid).collect()
    }

    /// Channels currently holding a tip.
    pub fn channels_with_tips(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.has_tip())
            .map(|(i, _)| i)
            .collect()
    }

    fn out_of_range(&self, index: usize) -> LhError {
        LhError::InvalidChannel {
            channel: index,
            reason: format!("head has {} channels", self.channels.len()),
        }
    }
}

/// The 96-channel head, positions addressed row-major like a 96 plate.
#[derive(Debug)]
pub struct Head96 {
    grid: Grid,
    positions: Head,
}

impl Default for Head96 {
    fn default() -> Self {
        Self::new()
    }
}

impl Head96 {
    /// Number of positions.
    pub const POSITIONS: usize = 96;

    /// An empty 12x8 head.
    pub fn new() -> Self {
        let grid = Grid::new(12, 8);
        let positions = Head {
            channels: (0..Self::POSITIONS)
                .map(|i| Channel::new(format!("head96 {}", grid.address_of(i))))
                .collect(),
        };
        Self { grid, positions }
    }

    /// Position grid, matching a 96 plate.
    pub fn grid(&self) -> Grid {
        self.grid
    }

    /// Position `index`, row-major.
    pub fn position(&self, index: usize) -> LhResult<&Channel> {
        self.positions.channel(index)
    }

    pub(crate) fn position_mut(&mut self, index: usize) -> LhResult<&mut Channel> {
        self.positions.channel_mut(index)
    }

    /// Channels in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.positions.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.positions.iter_mut()
    }

    /// Mounted tip per position, with its current liquid.
    pub fn state(&self) -> Vec<Option<Tip>> {
        self.positions.state()
    }

    /// Whether any position holds a tip.
    pub fn has_tips(&self) -> bool {
        self.positions.iter().any(Channel::has_tip)
    }
}
