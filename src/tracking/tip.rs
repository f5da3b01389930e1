//! Tip occupancy tracker.
//!
//! The same two verbs mean opposite transitions depending on who owns the
//! tracker:
//!
//! | Holder    | `pick_up` requires | `drop` requires |
//! |-----------|--------------------|-----------------|
//! | `Spot`    | occupied           | empty           |
//! | `Channel` | empty              | occupied        |

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::trace;

use super::Tracker;
use crate::config::EngineConfig;
use crate::error::{LhError, LhResult};
use crate::resources::Tip;

/// What kind of thing owns a tip tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TipHolder {
    /// A position in a tip rack.
    Spot,
    /// A pipetting channel.
    Channel,
}

/// A committed tip operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TipOp {
    /// A tip was picked up (left a spot or mounted on a channel).
    Pickup {
        /// The tip
        tip: Tip,
        /// Spot the tip came from, for channel trackers
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
    },
    /// A tip was dropped (arrived at a spot or left a channel).
    Drop {
        /// The tip
        tip: Tip,
    },
}

/// Occupancy tracker for a tip spot or a channel.
#[derive(Debug, Clone)]
pub struct TipTracker {
    thing: String,
    holder: TipHolder,
    enabled: Option<bool>,
    tip: Option<Tip>,
    origin: Option<String>,
    pending_tip: Option<Tip>,
    pending_origin: Option<String>,
    pending_ops: Vec<TipOp>,
    dirty: bool,
    history: Vec<TipOp>,
}

impl TipTracker {
    fn new(thing: impl Into<String>, holder: TipHolder, tip: Option<Tip>) -> Self {
        Self {
            thing: thing.into(),
            holder,
            enabled: None,
            pending_tip: tip.clone(),
            tip,
            origin: None,
            pending_origin: None,
            pending_ops: Vec::new(),
            dirty: false,
            history: Vec::new(),
        }
    }

    /// Tracker for a tip spot, optionally starting with a tip.
    pub fn spot(thing: impl Into<String>, tip: Option<Tip>) -> Self {
        Self::new(thing, TipHolder::Spot, tip)
    }

    /// Tracker for an empty channel.
    pub fn channel(thing: impl Into<String>) -> Self {
        Self::new(thing, TipHolder::Channel, None)
    }

    /// Spot or channel.
    pub fn holder(&self) -> TipHolder {
        self.holder
    }

    /// Resolve the enabled flag against the configured default.
    pub fn is_enabled(&self, config: &EngineConfig) -> bool {
        self.enabled.unwrap_or_else(|| config.tip_tracking())
    }

    /// Committed occupancy.
    pub fn has_tip(&self) -> bool {
        self.tip.is_some()
    }

    /// Committed tip, if any.
    pub fn tip(&self) -> Option<&Tip> {
        self.tip.as_ref()
    }

    /// The committed tip, or the holder-specific "no tip" error.
    pub fn get_tip(&self) -> LhResult<&Tip> {
        self.tip.as_ref().ok_or_else(|| self.no_tip_error())
    }

    /// Tip in the pending state (equal to the committed tip when nothing is queued).
    pub fn pending_tip(&self) -> Option<&Tip> {
        self.pending_tip.as_ref()
    }

    /// Name of the spot the committed tip was picked up from.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Append-only log of committed operations.
    pub fn history(&self) -> &[TipOp] {
        &self.history
    }

    fn no_tip_error(&self) -> LhError {
        match self.holder {
            TipHolder::Spot => LhError::TipSpotHasNoTip(self.thing.clone()),
            TipHolder::Channel => LhError::ChannelHasNoTip(self.thing.clone()),
        }
    }

    fn has_tip_error(&self) -> LhError {
        match self.holder {
            TipHolder::Spot => LhError::TipSpotHasTip(self.thing.clone()),
            TipHolder::Channel => LhError::ChannelHasTip(self.thing.clone()),
        }
    }

    /// Queue a pickup of `tip`.
    ///
    /// `origin` is remembered by channel trackers so the tip can be returned.
    pub fn queue_pick_up(
        &mut self,
        tip: &Tip,
        origin: Option<&str>,
        config: &EngineConfig,
    ) -> LhResult<()> {
        let enabled = self.is_enabled(config);
        if enabled {
            match self.holder {
                TipHolder::Spot if self.pending_tip.is_none() => return Err(self.no_tip_error()),
                TipHolder::Channel if self.pending_tip.is_some() => {
                    return Err(self.has_tip_error())
                }
                _ => {}
            }
        }

        match self.holder {
            TipHolder::Spot => {
                self.pending_tip = None;
            }
            TipHolder::Channel => {
                self.pending_tip = Some(tip.clone());
                self.pending_origin = origin.map(str::to_string);
            }
        }
        if enabled {
            self.pending_ops.push(TipOp::Pickup {
                tip: tip.clone(),
                origin: match self.holder {
                    TipHolder::Channel => origin.map(str::to_string),
                    TipHolder::Spot => None,
                },
            });
        }
        self.dirty = true;
        Ok(())
    }

    /// Queue a drop of `tip`.
    pub fn queue_drop(&mut self, tip: &Tip, config: &EngineConfig) -> LhResult<()> {
        let enabled = self.is_enabled(config);
        if enabled {
            match self.holder {
                TipHolder::Spot if self.pending_tip.is_some() => return Err(self.has_tip_error()),
                TipHolder::Channel if self.pending_tip.is_none() => {
                    return Err(self.no_tip_error())
                }
                _ => {}
            }
        }

        match self.holder {
            TipHolder::Spot => {
                self.pending_tip = Some(tip.clone());
            }
            TipHolder::Channel => {
                self.pending_tip = None;
                self.pending_origin = None;
            }
        }
        if enabled {
            self.pending_ops.push(TipOp::Drop { tip: tip.clone() });
        }
        self.dirty = true;
        Ok(())
    }

    /// Pick up and commit in one step.
    pub fn pick_up(&mut self, tip: &Tip, origin: Option<&str>, config: &EngineConfig) -> LhResult<()> {
        self.queue_pick_up(tip, origin, config)?;
        self.commit();
        Ok(())
    }

    /// Drop and commit in one step.
    pub fn drop(&mut self, tip: &Tip, config: &EngineConfig) -> LhResult<()> {
        self.queue_drop(tip, config)?;
        self.commit();
        Ok(())
    }

    /// Force the tracker to empty without recording anything.
    ///
    /// Used to resynchronize channels after excursions with tracking disabled.
    pub fn clear(&mut self) {
        self.tip = None;
        self.origin = None;
        self.pending_tip = None;
        self.pending_origin = None;
        self.pending_ops.clear();
        self.dirty = false;
    }

    /// Replace committed state from a serialized form, without history.
    pub fn load_state(&mut self, state: &serde_json::Value) -> LhResult<()> {
        let tip = match state.get("tip") {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => Some(serde_json::from_value::<Tip>(value.clone()).map_err(|e| {
                LhError::Configuration(format!("Invalid tip state for '{}': {}", self.thing, e))
            })?),
        };
        self.clear();
        self.pending_tip = tip.clone();
        self.tip = tip;
        Ok(())
    }
}

impl Tracker for TipTracker {
    fn thing(&self) -> &str {
        &self.thing
    }

    fn enabled_override(&self) -> Option<bool> {
        self.enabled
    }

    fn set_enabled_override(&mut self, enabled: Option<bool>) {
        self.enabled = enabled;
    }

    fn has_pending(&self) -> bool {
        self.dirty
    }

    fn commit(&mut self) {
        if !self.dirty {
            return;
        }
        trace!(thing = %self.thing, ops = self.pending_ops.len(), "tip tracker commit");
        self.tip = self.pending_tip.clone();
        self.origin = self.pending_origin.clone();
        self.history.append(&mut self.pending_ops);
        self.dirty = false;
    }

    fn rollback(&mut self) {
        self.pending_tip = self.tip.clone();
        self.pending_origin = self.origin.clone();
        self.pending_ops.clear();
        self.dirty = false;
    }

    fn serialize_state(&self) -> serde_json::Value {
        json!({ "tip": self.tip })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tip() -> Tip {
        Tip::new("A1_tip", false, 59.9, 300.0, 8.0)
    }

    #[test]
    fn test_spot_pickup_then_drop_restores_occupancy() {
        let config = EngineConfig::tracking();
        let mut spot = TipTracker::spot("A1", Some(tip()));
        spot.pick_up(&tip(), None, &config).unwrap();
        assert!(!spot.has_tip());
        spot.drop(&tip(), &config).unwrap();
        assert!(spot.has_tip());
        assert_eq!(spot.history().len(), 2);
        assert!(matches!(spot.history()[0], TipOp::Pickup { .. }));
        assert!(matches!(spot.history()[1], TipOp::Drop { .. }));
    }

    #[test]
    fn test_failed_call_leaves_state_and_history() {
        let config = EngineConfig::tracking();
        let mut spot = TipTracker::spot("A1", None);
        let err = spot.pick_up(&tip(), None, &config).unwrap_err();
        assert!(matches!(err, LhError::TipSpotHasNoTip(ref s) if s == "A1"));
        assert!(!spot.has_tip());
        assert!(spot.history().is_empty());
        assert!(!spot.has_pending());

        let mut channel = TipTracker::channel("channel 0");
        channel.pick_up(&tip(), Some("A1"), &config).unwrap();
        let err = channel.pick_up(&tip(), Some("A2"), &config).unwrap_err();
        assert!(matches!(err, LhError::ChannelHasTip(_)));
        assert_eq!(channel.origin(), Some("A1"));
        assert_eq!(channel.history().len(), 1);
    }

    #[test]
    fn test_channel_drop_without_tip() {
        let config = EngineConfig::tracking();
        let mut channel = TipTracker::channel("channel 1");
        assert!(matches!(
            channel.drop(&tip(), &config),
            Err(LhError::ChannelHasNoTip(_))
        ));
        let mut spot = TipTracker::spot("B1", Some(tip()));
        assert!(matches!(
            spot.drop(&tip(), &config),
            Err(LhError::TipSpotHasTip(_))
        ));
    }

    #[test]
    fn test_disabled_flips_without_checks_or_history() {
        let config = EngineConfig::tracking();
        let mut channel = TipTracker::channel("channel 0");
        channel.set_enabled_override(Some(false));
        channel.pick_up(&tip(), None, &config).unwrap();
        channel.pick_up(&tip(), None, &config).unwrap();
        assert!(channel.has_tip());
        assert!(channel.history().is_empty());
    }

    #[test]
    fn test_default_comes_from_config() {
        let config = EngineConfig::default();
        let mut channel = TipTracker::channel("channel 0");
        assert!(!channel.is_enabled(&config));
        config.set_tip_tracking(true);
        assert!(channel.is_enabled(&config));
        channel.set_enabled_override(Some(false));
        assert!(!channel.is_enabled(&config));
    }

    #[test]
    fn test_rollback_discards_pending() {
        let config = EngineConfig::tracking();
        let mut spot = TipTracker::spot("A1", Some(tip()));
        spot.queue_pick_up(&tip(), None, &config).unwrap();
        assert!(spot.pending_tip().is_none());
        assert!(spot.has_tip());
        spot.rollback();
        assert!(spot.pending_tip().is_some());
        assert!(spot.history().is_empty());
    }

    #[test]
    fn test_clear_keeps_history() {
        let config = EngineConfig::tracking();
        let mut channel = TipTracker::channel("channel 0");
        channel.pick_up(&tip(), Some("A1"), &config).unwrap();
        channel.clear();
        assert!(!channel.has_tip());
        assert_eq!(channel.origin(), None);
        assert_eq!(channel.history().len(), 1);
    }

    #[test]
    fn test_state_roundtrip() {
        let spot = TipTracker::spot("A1", Some(tip()));
        let mut other = TipTracker::spot("A1", None);
        other.load_state(&spot.serialize_state()).unwrap();
        assert_eq!(other.tip(), spot.tip());
    }
}
