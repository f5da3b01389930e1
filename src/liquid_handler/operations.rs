//! Per-channel operations: tips and liquid.

use tracing::debug;

use super::{Batch, ChannelBatch, LiquidHandler, TrackerRef};
use crate::coordinate::Coordinate;
use crate::error::{LhError, LhResult};
use crate::resources::{ResourceId, ResourceKind, Tip};
use crate::standard::{ChannelLiquid, ChannelTip, Operation};
use crate::tracking::VolumeTracker;
use crate::validation::BackendParams;

/// Where a channel picks up or drops a tip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TipTarget {
    /// Tip spot, or trash for drops
    pub resource: ResourceId,
    /// Added to the resource location
    pub offset: Coordinate,
}

impl TipTarget {
    /// Target `resource` without offset.
    pub fn new(resource: ResourceId) -> Self {
        Self {
            resource,
            offset: Coordinate::ZERO,
        }
    }

    /// Set the offset.
    pub fn with_offset(mut self, offset: Coordinate) -> Self {
        self.offset = offset;
        self
    }
}

impl From<ResourceId> for TipTarget {
    fn from(resource: ResourceId) -> Self {
        Self::new(resource)
    }
}

/// Where and how much a channel aspirates or dispenses.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidTarget {
    /// Well, tube or trough; a plate for the 96 head
    pub resource: ResourceId,
    /// uL
    pub volume: f64,
    /// Added to the resource location
    pub offset: Coordinate,
    /// uL/s
    pub flow_rate: Option<f64>,
    /// mm above the container bottom
    pub liquid_height: Option<f64>,
    /// uL of air pushed out after dispensing
    pub blow_out_air_volume: Option<f64>,
}

impl LiquidTarget {
    /// Move `volume` uL at `resource`, backend defaults otherwise.
    pub fn new(resource: ResourceId, volume: f64) -> Self {
        Self {
            resource,
            volume,
            offset: Coordinate::ZERO,
            flow_rate: None,
            liquid_height: None,
            blow_out_air_volume: None,
        }
    }

    /// Set the offset.
    pub fn with_offset(mut self, offset: Coordinate) -> Self {
        self.offset = offset;
        self
    }

    /// Set the flow rate in uL/s.
    pub fn with_flow_rate(mut self, flow_rate: f64) -> Self {
        self.flow_rate = Some(flow_rate);
        self
    }

    /// Set the liquid height in mm.
    pub fn with_liquid_height(mut self, liquid_height: f64) -> Self {
        self.liquid_height = Some(liquid_height);
        self
    }

    /// Set the blow-out air volume in uL.
    pub fn with_blow_out_air_volume(mut self, volume: f64) -> Self {
        self.blow_out_air_volume = Some(volume);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
    Aspirate,
    Dispense,
}

impl Direction {
    pub(crate) fn name(self, head96: bool) -> &'static str {
        match (self, head96) {
            (Direction::Aspirate, false) => "aspirate",
            (Direction::Dispense, false) => "dispense",
            (Direction::Aspirate, true) => "aspirate96",
            (Direction::Dispense, true) => "dispense96",
        }
    }
}

pub(crate) fn check_volume(volume: f64) -> LhResult<()> {
    if volume.is_finite() && volume >= 0.0 {
        Ok(())
    } else {
        Err(LhError::InvalidVolume(volume))
    }
}

impl LiquidHandler {
    /// Tip a spot would hand out right now: its own tip, or a fresh one
    /// from the prototype when the spot looks empty.
    pub(crate) fn spot_tip(&self, spot: ResourceId) -> LhResult<Tip> {
        let state = self.tree.tip_spot(spot)?;
        Ok(match state.tracker.tip() {
            Some(tip) => tip.clone(),
            None => state
                .prototype
                .renamed(format!("{}_tip", self.tree.name(spot)?)),
        })
    }

    /// Pick up tips with the participating channels.
    ///
    /// Every spot must hold a tip and every channel must be empty, unless
    /// the respective tracker is disabled.
    pub async fn pick_up_tips(
        &mut self,
        targets: &ChannelBatch<TipTarget>,
        params: &BackendParams,
    ) -> LhResult<()> {
        const OPERATION: &str = "pick_up_tips";
        self.check_batch(targets)?;

        let mut resolved = Vec::with_capacity(targets.participating_count());
        for (channel, target) in targets.iter() {
            self.head.channel(channel)?;
            let tip = self.spot_tip(target.resource)?;
            let location = self.reach(Some(channel), target.resource)?;
            resolved.push((
                target.resource,
                ChannelTip {
                    channel,
                    resource_name: self.tree.name(target.resource)?.to_string(),
                    location,
                    offset: target.offset,
                    tip,
                },
            ));
        }
        self.check_legality(OPERATION, Some(resolved.len()), params)?;

        self.run_batch(|lh, batch| {
            for (spot, op) in &resolved {
                lh.tree
                    .tip_tracker_mut(*spot)?
                    .queue_pick_up(&op.tip, None, &lh.config)?;
                batch.touch(TrackerRef::Resource(*spot));
                lh.head.channel_mut(op.channel)?.tips.queue_pick_up(
                    &op.tip,
                    Some(&op.resource_name),
                    &lh.config,
                )?;
                batch.touch(TrackerRef::Channel(op.channel));
            }
            Ok(())
        })?;

        let ops = resolved.into_iter().map(|(_, op)| op).collect();
        self.dispatch(Operation::PickUpTips { ops }, params).await
    }

    /// Drop tips into tip spots or a trash.
    ///
    /// A trash target touches only the channel tracker.
    pub async fn drop_tips(
        &mut self,
        targets: &ChannelBatch<TipTarget>,
        params: &BackendParams,
    ) -> LhResult<()> {
        const OPERATION: &str = "drop_tips";
        self.check_batch(targets)?;

        let mut resolved = Vec::with_capacity(targets.participating_count());
        for (channel, target) in targets.iter() {
            let to_spot = self.tip_sink_is_spot(target.resource)?;
            let mounted = self.head.channel(channel)?.tip_with_liquid();
            let tip = match (mounted, to_spot) {
                (Some(tip), _) => tip,
                (None, true) => self.spot_tip(target.resource)?,
                (None, false) => self.head.channel(channel)?.require_tip()?,
            };
            let location = self.reach(Some(channel), target.resource)?;
            resolved.push((
                to_spot.then_some(target.resource),
                ChannelTip {
                    channel,
                    resource_name: self.tree.name(target.resource)?.to_string(),
                    location,
                    offset: target.offset,
                    tip,
                },
            ));
        }
        self.check_legality(OPERATION, Some(resolved.len()), params)?;

        self.run_batch(|lh, batch| {
            for (spot, op) in &resolved {
                lh.head
                    .channel_mut(op.channel)?
                    .tips
                    .queue_drop(&op.tip, &lh.config)?;
                batch.touch(TrackerRef::Channel(op.channel));
                if let Some(spot) = spot {
                    lh.tree.tip_tracker_mut(*spot)?.queue_drop(&op.tip, &lh.config)?;
                    batch.touch(TrackerRef::Resource(*spot));
                }
            }
            Ok(())
        })?;

        let ops = resolved.into_iter().map(|(_, op)| op).collect();
        self.dispatch(Operation::DropTips { ops }, params).await
    }

    /// `true` for tip spots, `false` for trash, error for anything else.
    pub(crate) fn tip_sink_is_spot(&self, id: ResourceId) -> LhResult<bool> {
        let node = self.tree.node(id)?;
        match node.kind() {
            ResourceKind::TipSpot(_) => Ok(true),
            ResourceKind::Trash => Ok(false),
            kind => Err(LhError::WrongResourceKind {
                resource: node.name().to_string(),
                expected: "TipSpot or Trash",
                actual: kind.type_name(),
            }),
        }
    }

    /// Put tips back where they were picked up.
    ///
    /// Without `use_channels`, every channel holding a tip returns it.
    pub async fn return_tips(
        &mut self,
        use_channels: Option<&[usize]>,
        params: &BackendParams,
    ) -> LhResult<()> {
        let channels = self.tip_channels(use_channels)?;
        let mut targets = self.batch();
        for channel in channels {
            let origin = self
                .head
                .channel(channel)?
                .origin()
                .ok_or(LhError::NoTipToReturn(channel))?;
            let spot = self.tree.get(origin)?;
            targets.set(channel, TipTarget::new(spot))?;
        }
        self.drop_tips(&targets, params).await
    }

    /// Drop every held tip (or those on `use_channels`) into `trash`.
    pub async fn discard_tips(
        &mut self,
        trash: ResourceId,
        use_channels: Option<&[usize]>,
        params: &BackendParams,
    ) -> LhResult<()> {
        let channels = self.tip_channels(use_channels)?;
        let mut targets = self.batch();
        for channel in channels {
            targets.set(channel, TipTarget::new(trash))?;
        }
        self.drop_tips(&targets, params).await
    }

    fn tip_channels(&self, use_channels: Option<&[usize]>) -> LhResult<Vec<usize>> {
        let channels = match use_channels {
            Some(channels) => channels.to_vec(),
            None => self.head.channels_with_tips(),
        };
        if channels.is_empty() {
            return Err(LhError::ChannelHasNoTip("any channel".into()));
        }
        Ok(channels)
    }

    /// Aspirate from containers into the mounted tips.
    pub async fn aspirate(
        &mut self,
        targets: &ChannelBatch<LiquidTarget>,
        params: &BackendParams,
    ) -> LhResult<()> {
        self.transfer(Direction::Aspirate, targets, params).await
    }

    /// Dispense from the mounted tips into containers.
    pub async fn dispense(
        &mut self,
        targets: &ChannelBatch<LiquidTarget>,
        params: &BackendParams,
    ) -> LhResult<()> {
        self.transfer(Direction::Dispense, targets, params).await
    }

    async fn transfer(
        &mut self,
        direction: Direction,
        targets: &ChannelBatch<LiquidTarget>,
        params: &BackendParams,
    ) -> LhResult<()> {
        let operation = direction.name(false);
        self.check_batch(targets)?;

        let mut resolved = Vec::with_capacity(targets.participating_count());
        for (channel, target) in targets.iter() {
            check_volume(target.volume)?;
            self.tree.volume_tracker(target.resource)?;
            let tip = self.head.channel(channel)?.require_tip()?;
            let location = self.reach(Some(channel), target.resource)?;
            resolved.push((
                target.resource,
                ChannelLiquid {
                    channel,
                    resource_name: self.tree.name(target.resource)?.to_string(),
                    location,
                    offset: target.offset,
                    tip,
                    volume: target.volume,
                    flow_rate: target.flow_rate,
                    liquid_height: target.liquid_height,
                    blow_out_air_volume: target.blow_out_air_volume,
                },
            ));
        }
        self.check_legality(operation, Some(resolved.len()), params)?;

        self.run_batch(|lh, batch| {
            for (container, op) in &resolved {
                let tip = TrackerRef::ChannelLiquid(op.channel);
                queue_transfer(lh, batch, direction, *container, tip, op.volume)?;
            }
            Ok(())
        })?;
        debug!(operation = operation, channels = resolved.len(), "Liquid committed");

        let ops = resolved.into_iter().map(|(_, op)| op).collect();
        let operation = match direction {
            Direction::Aspirate => Operation::Aspirate { ops },
            Direction::Dispense => Operation::Dispense { ops },
        };
        self.dispatch(operation, params).await
    }
}

/// Queue one container/tip pair, container first when aspirating and tip
/// first when dispensing.
pub(crate) fn queue_transfer(
    lh: &mut LiquidHandler,
    batch: &mut Batch,
    direction: Direction,
    container: ResourceId,
    tip: TrackerRef,
    volume: f64,
) -> LhResult<()> {
    let config = lh.config.clone();
    match direction {
        Direction::Aspirate => {
            lh.tree
                .volume_tracker_mut(container)?
                .queue_aspirate(volume, &config)?;
            batch.touch(TrackerRef::Resource(container));
            tip_liquid(lh, tip)?.queue_aspirate(volume, &config)?;
            batch.touch(tip);
        }
        Direction::Dispense => {
            tip_liquid(lh, tip)?.queue_dispense(volume, &config)?;
            batch.touch(tip);
            lh.tree
                .volume_tracker_mut(container)?
                .queue_dispense(volume, &config)?;
            batch.touch(TrackerRef::Resource(container));
        }
    }
    Ok(())
}

fn tip_liquid(lh: &mut LiquidHandler, tip: TrackerRef) -> LhResult<&mut VolumeTracker> {
    match tip {
        TrackerRef::ChannelLiquid(i) => lh.head.channel_mut(i)?.liquid_mut(),
        TrackerRef::Head96Liquid(i) => lh.head96_mut()?.position_mut(i)?.liquid_mut(),
        other => Err(LhError::InvalidChannel {
            channel: 0,
            reason: format!("{:?} is not a tip liquid tracker", other),
        }),
    }
}
