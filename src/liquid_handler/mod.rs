//! Liquid handler front end.
//!
//! [`LiquidHandler`] ties a resource tree, the channel heads, a backend and
//! the engine configuration together. Every operation follows the same path:
//!
//! 1. resolve per-channel targets and check reachability
//! 2. run legality checks through the strictness gate
//! 3. queue every participating tracker; on the first error roll all of them back
//! 4. commit every tracker and emit `set_state`
//! 5. hand the standard-form operation to the backend
//!
//! Backend failures in step 5 are surfaced but never roll trackers back.

mod channels;
mod guard;
mod head96;
mod operations;

pub use channels::{Channel, ChannelBatch, Head, Head96};
pub use guard::TrackingGuard;
pub use operations::{LiquidTarget, TipTarget};

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendCapabilities};
use crate::config::EngineConfig;
use crate::coordinate::Coordinate;
use crate::error::{LhError, LhResult};
use crate::resources::{Resource, ResourceId, ResourceTree, Tip};
use crate::standard::Operation;
use crate::tracking::Tracker;
use crate::validation::{self, BackendParams};

/// Address of a tracker anywhere in a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum TrackerRef {
    Resource(ResourceId),
    Channel(usize),
    ChannelLiquid(usize),
    Head96(usize),
    Head96Liquid(usize),
}

/// Trackers queued by one batch.
#[derive(Debug, Default)]
pub(crate) struct Batch {
    touched: Vec<TrackerRef>,
}

impl Batch {
    pub(crate) fn touch(&mut self, tracker: TrackerRef) {
        if !self.touched.contains(&tracker) {
            self.touched.push(tracker);
        }
    }
}

/// A liquid handling robot.
pub struct LiquidHandler {
    tree: ResourceTree,
    head: Head,
    head96: Option<Head96>,
    backend: Arc<dyn Backend>,
    config: Arc<EngineConfig>,
    setup_finished: bool,
}

impl LiquidHandler {
    /// Build a handler whose tree is rooted at `deck`.
    ///
    /// The number of channels and the presence of a 96 head follow the
    /// backend's capabilities.
    pub fn new(backend: Arc<dyn Backend>, deck: Resource, config: Arc<EngineConfig>) -> LhResult<Self> {
        Ok(Self::with_tree(backend, ResourceTree::new(deck)?, config))
    }

    /// Build a handler around an existing tree.
    pub fn with_tree(backend: Arc<dyn Backend>, tree: ResourceTree, config: Arc<EngineConfig>) -> Self {
        let capabilities = backend.capabilities();
        Self {
            tree,
            head: Head::new(capabilities.num_channels),
            head96: capabilities.has_head96.then(Head96::new),
            backend,
            config,
            setup_finished: false,
        }
    }

    /// Set up the backend. Operations check that this ran.
    pub async fn setup(&mut self) -> LhResult<()> {
        self.backend.setup().await.map_err(LhError::Backend)?;
        self.setup_finished = true;
        info!(
            backend = self.backend.name(),
            channels = self.head.len(),
            head96 = self.head96.is_some(),
            "Liquid handler set up"
        );
        Ok(())
    }

    /// Stop the backend.
    pub async fn stop(&mut self) -> LhResult<()> {
        self.backend.stop().await.map_err(LhError::Backend)?;
        self.setup_finished = false;
        info!(backend = self.backend.name(), "Liquid handler stopped");
        Ok(())
    }

    /// Whether `setup` succeeded and `stop` has not run since.
    pub fn is_setup(&self) -> bool {
        self.setup_finished
    }

    /// The resource tree.
    pub fn tree(&self) -> &ResourceTree {
        &self.tree
    }

    /// Mutable resource tree, for assigning and unassigning labware.
    pub fn tree_mut(&mut self) -> &mut ResourceTree {
        &mut self.tree
    }

    /// Root of the tree.
    pub fn deck(&self) -> ResourceId {
        self.tree.root()
    }

    /// Live configuration, read by every call.
    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    /// The backend operations are dispatched to.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Independent channels.
    pub fn head(&self) -> &Head {
        &self.head
    }

    /// The 96 head, if the backend has one.
    pub fn head96(&self) -> Option<&Head96> {
        self.head96.as_ref()
    }

    /// Number of independent channels.
    pub fn num_channels(&self) -> usize {
        self.head.len()
    }

    /// Mounted tip per channel.
    pub fn head_state(&self) -> Vec<Option<Tip>> {
        self.head.state()
    }

    /// Mounted tip per 96-head position, `None` without a 96 head.
    pub fn head96_state(&self) -> Option<Vec<Option<Tip>>> {
        self.head96.as_ref().map(Head96::state)
    }

    /// Empty batch sized for this head.
    pub fn batch<T>(&self) -> ChannelBatch<T> {
        ChannelBatch::new(self.head.len())
    }

    /// Forget every mounted tip without recording history.
    ///
    /// For resynchronizing after the physical head was cleared by hand.
    pub fn clear_head_state(&mut self) {
        self.head.iter_mut().for_each(Channel::clear);
        if let Some(head96) = self.head96.as_mut() {
            head96.iter_mut().for_each(Channel::clear);
        }
        debug!("Head state cleared");
    }

    // ------------------------------------------------------------------
    // Batch machinery
    // ------------------------------------------------------------------

    fn head96_mut(&mut self) -> LhResult<&mut Head96> {
        self.head96.as_mut().ok_or_else(no_head96)
    }

    fn head96_ref(&self) -> LhResult<&Head96> {
        self.head96.as_ref().ok_or_else(no_head96)
    }

    pub(crate) fn tracker_mut(&mut self, tracker: TrackerRef) -> LhResult<&mut dyn Tracker> {
        match tracker {
            TrackerRef::Resource(id) => self.tree.tracker_mut(id),
            TrackerRef::Channel(i) => Ok(self.head.channel_mut(i)?.tip_tracker_dyn()),
            TrackerRef::ChannelLiquid(i) => self.head.channel_mut(i)?.liquid_tracker_dyn(),
            TrackerRef::Head96(i) => Ok(self.head96_mut()?.position_mut(i)?.tip_tracker_dyn()),
            TrackerRef::Head96Liquid(i) => self.head96_mut()?.position_mut(i)?.liquid_tracker_dyn(),
        }
    }

    /// Every tracker currently reachable from this handler.
    pub(crate) fn tracker_refs(&self) -> Vec<TrackerRef> {
        let mut refs: Vec<TrackerRef> = self
            .tree
            .tracked_ids()
            .into_iter()
            .map(TrackerRef::Resource)
            .collect();
        for (i, channel) in self.head.iter().enumerate() {
            refs.push(TrackerRef::Channel(i));
            if channel.volume_tracker().is_some() {
                refs.push(TrackerRef::ChannelLiquid(i));
            }
        }
        if let Some(head96) = &self.head96 {
            for (i, position) in head96.iter().enumerate() {
                refs.push(TrackerRef::Head96(i));
                if position.volume_tracker().is_some() {
                    refs.push(TrackerRef::Head96Liquid(i));
                }
            }
        }
        refs
    }

    /// Queue through `queue`, then commit everything or roll everything back.
    pub(crate) fn run_batch<F>(&mut self, queue: F) -> LhResult<()>
    where
        F: FnOnce(&mut Self, &mut Batch) -> LhResult<()>,
    {
        let mut batch = Batch::default();
        match queue(self, &mut batch) {
            Ok(()) => {
                self.commit(batch);
                Ok(())
            }
            Err(e) => {
                debug!(trackers = batch.touched.len(), error = %e, "Rolling back batch");
                self.rollback(batch);
                Err(e)
            }
        }
    }

    fn commit(&mut self, batch: Batch) {
        let suspended = self.tree.tracking_suspended();
        let mut changed = Vec::new();
        for tracker in batch.touched {
            if let Ok(t) = self.tracker_mut(tracker) {
                t.commit();
            }
            match tracker {
                TrackerRef::Resource(id) => changed.push(id),
                TrackerRef::Channel(i) => {
                    if let Ok(channel) = self.head.channel_mut(i) {
                        channel.sync_liquid(suspended);
                    }
                }
                TrackerRef::Head96(i) => {
                    if let Ok(position) = self.head96_mut().and_then(|h| h.position_mut(i)) {
                        position.sync_liquid(suspended);
                    }
                }
                TrackerRef::ChannelLiquid(_) | TrackerRef::Head96Liquid(_) => {}
            }
        }
        self.tree.emit_state(&changed);
    }

    fn rollback(&mut self, batch: Batch) {
        for tracker in batch.touched {
            if let Ok(t) = self.tracker_mut(tracker) {
                t.rollback();
            }
        }
    }

    /// Reject batches that do not match the head.
    fn check_batch<T>(&self, batch: &ChannelBatch<T>) -> LhResult<()> {
        if batch.len() != self.head.len() {
            return Err(LhError::InvalidChannel {
                channel: batch.len(),
                reason: format!(
                    "batch has {} slots for a head of {} channels",
                    batch.len(),
                    self.head.len()
                ),
            });
        }
        if batch.is_empty() {
            return Err(LhError::InvalidChannel {
                channel: 0,
                reason: "no channel participates in the batch".into(),
            });
        }
        Ok(())
    }

    /// Absolute location of `id`, if the backend can reach it.
    ///
    /// `channel` is `None` for the 96 head.
    fn reach(&self, channel: Option<usize>, id: ResourceId) -> LhResult<Coordinate> {
        let location = self.tree.get_absolute_location(id)?;
        if !self.backend.can_reach(channel, location) {
            return Err(LhError::Unreachable {
                resource: self.tree.name(id)?.to_string(),
                by: channel.map_or_else(|| "the 96 head".to_string(), |c| format!("channel {}", c)),
            });
        }
        Ok(location)
    }

    /// Protocol legality checks, routed through the strictness gate.
    ///
    /// `participating` is `None` for 96-head operations.
    fn check_legality(
        &self,
        operation: &'static str,
        participating: Option<usize>,
        params: &BackendParams,
    ) -> LhResult<BackendCapabilities> {
        if !self.setup_finished {
            validation::enforce(&self.config, operation, "liquid handler has not been set up")?;
        }
        let capabilities = self.backend.capabilities();
        validation::check_unsupported_params(
            &self.config,
            operation,
            params,
            &capabilities.supported_params,
        )?;
        if let Some(count) = participating {
            validation::check_channel_count(
                &self.config,
                operation,
                count,
                capabilities.max_channels_per_command,
            )?;
        }
        Ok(capabilities)
    }

    /// Hand a committed operation to the backend.
    async fn dispatch(&self, operation: Operation, params: &BackendParams) -> LhResult<()> {
        debug!(
            backend = self.backend.name(),
            operation = operation.name(),
            channels = ?operation.use_channels(),
            "Dispatching"
        );
        self.backend.execute(&operation, params).await.map_err(|e| {
            warn!(
                backend = self.backend.name(),
                operation = operation.name(),
                error = %e,
                "Backend failed, tracker state is kept"
            );
            LhError::Backend(e)
        })
    }
}

fn no_head96() -> LhError {
    LhError::InvalidChannel {
        channel: 0,
        reason: "no 96 head installed".into(),
    }
}
