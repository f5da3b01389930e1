//! Tip and volume state trackers.
//!
//! Every tip spot, container, channel and 96-head position owns one or two
//! trackers. A tracker mirrors a piece of consumable physical state (is there
//! a tip, how much liquid) and keeps an append-only history of committed
//! operations.
//!
//! # Two-phase updates
//!
//! Operations are first *queued*: preconditions are checked against the
//! pending state and, if they hold, the pending state moves forward. Nothing
//! is visible until [`Tracker::commit`] copies pending into committed state and
//! appends the queued records to the history. [`Tracker::rollback`] discards
//! the pending state instead. Multi-channel batches queue every channel first
//! and only commit when all of them succeeded.
//!
//! # Enabled resolution
//!
//! A tracker is enabled when its instance override says so, or, without an
//! override, when the matching default in [`EngineConfig`] is on. The scoped
//! guard in [`crate::liquid_handler`] works by overriding instances and
//! restoring the previous overrides afterwards.
//!
//! A disabled tracker skips precondition checks and history records, but the
//! occupancy/volume field still follows the operation.
//!
//! [`EngineConfig`]: crate::config::EngineConfig

pub mod tip;
pub mod volume;

pub use tip::{TipHolder, TipOp, TipTracker};
pub use volume::{VolumeHolder, VolumeOp, VolumeTracker};

/// Behaviour shared by tip and volume trackers.
pub trait Tracker {
    /// Name of the thing this tracker belongs to (for messages).
    fn thing(&self) -> &str;

    /// Explicit instance override, if any.
    fn enabled_override(&self) -> Option<bool>;

    /// Set or clear the instance override.
    fn set_enabled_override(&mut self, enabled: Option<bool>);

    /// Whether uncommitted operations are queued.
    fn has_pending(&self) -> bool;

    /// Make queued operations permanent.
    fn commit(&mut self);

    /// Discard queued operations.
    fn rollback(&mut self);

    /// Current committed state as JSON.
    fn serialize_state(&self) -> serde_json::Value;
}

/// Tolerance used when comparing volumes, in uL.
pub const VOLUME_EPSILON: f64 = 1e-9;
