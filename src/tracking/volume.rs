//! Liquid volume tracker.
//!
//! `aspirate` and `dispense` mean opposite things depending on the holder: a
//! container is drained by aspiration and filled by dispensing, a tip is the
//! other way round.
//!
//! Enabled trackers check capacity and keep `0 <= used <= max`. Disabled
//! trackers apply the arithmetic as-is, without bounds or errors, so that
//! air gaps and similar tricks outside the simple capacity model still work.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::trace;

use super::{Tracker, VOLUME_EPSILON};
use crate::config::EngineConfig;
use crate::error::{LhError, LhResult};

/// What kind of thing owns a volume tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeHolder {
    /// Well, tube or trough: a liquid source/sink on the deck.
    Container,
    /// A tip mounted on a channel.
    Tip,
}

/// A committed volume operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum VolumeOp {
    /// Liquid taken up (tips) or drawn out (containers)
    Aspirate {
        /// uL
        volume: f64,
    },
    /// Liquid released (tips) or received (containers)
    Dispense {
        /// uL
        volume: f64,
    },
    /// Direct assignment used for seeding
    Set {
        /// uL after the assignment
        volume: f64,
    },
}

/// Volume tracker for a container or a tip.
#[derive(Debug, Clone)]
pub struct VolumeTracker {
    thing: String,
    holder: VolumeHolder,
    enabled: Option<bool>,
    max_volume: f64,
    used_volume: f64,
    pending_volume: f64,
    pending_ops: Vec<VolumeOp>,
    dirty: bool,
    history: Vec<VolumeOp>,
}

impl VolumeTracker {
    fn new(thing: impl Into<String>, holder: VolumeHolder, max_volume: f64) -> Self {
        Self {
            thing: thing.into(),
            holder,
            enabled: None,
            max_volume,
            used_volume: 0.0,
            pending_volume: 0.0,
            pending_ops: Vec::new(),
            dirty: false,
            history: Vec::new(),
        }
    }

    /// Empty container tracker.
    pub fn container(thing: impl Into<String>, max_volume: f64) -> Self {
        Self::new(thing, VolumeHolder::Container, max_volume)
    }

    /// Empty tip tracker.
    pub fn tip(thing: impl Into<String>, max_volume: f64) -> Self {
        Self::new(thing, VolumeHolder::Tip, max_volume)
    }

    /// Start from `volume` uL without recording history.
    pub fn with_used_volume(mut self, volume: f64) -> Self {
        self.used_volume = volume;
        self.pending_volume = volume;
        self
    }

    /// Container or tip.
    pub fn holder(&self) -> VolumeHolder {
        self.holder
    }

    /// Resolve the enabled flag against the configured default.
    pub fn is_enabled(&self, config: &EngineConfig) -> bool {
        self.enabled.unwrap_or_else(|| config.volume_tracking())
    }

    /// Capacity in uL.
    pub fn max_volume(&self) -> f64 {
        self.max_volume
    }

    /// Committed used volume.
    pub fn get_used_volume(&self) -> f64 {
        self.used_volume
    }

    /// Committed free volume (`max - used`).
    pub fn get_free_volume(&self) -> f64 {
        self.max_volume - self.used_volume
    }

    /// Used volume including queued operations.
    pub fn pending_volume(&self) -> f64 {
        self.pending_volume
    }

    /// Committed operations, oldest first.
    pub fn history(&self) -> &[VolumeOp] {
        &self.history
    }

    fn check_volume(volume: f64) -> LhResult<()> {
        if !volume.is_finite() || volume < 0.0 {
            return Err(LhError::InvalidVolume(volume));
        }
        Ok(())
    }

    fn remove_liquid(&mut self, volume: f64, enabled: bool) -> LhResult<()> {
        if !enabled {
            self.pending_volume -= volume;
            return Ok(());
        }
        if volume > self.pending_volume + VOLUME_EPSILON {
            let (owner, available) = (self.thing.clone(), self.pending_volume);
            return Err(match self.holder {
                VolumeHolder::Container => LhError::WellTooLittleLiquid {
                    owner,
                    requested: volume,
                    available,
                },
                VolumeHolder::Tip => LhError::TipTooLittleLiquid {
                    owner,
                    requested: volume,
                    available,
                },
            });
        }
        self.pending_volume = (self.pending_volume - volume).max(0.0);
        Ok(())
    }

    fn add_liquid(&mut self, volume: f64, enabled: bool) -> LhResult<()> {
        if !enabled {
            self.pending_volume += volume;
            return Ok(());
        }
        let free = self.max_volume - self.pending_volume;
        if volume > free + VOLUME_EPSILON {
            let (owner, available) = (self.thing.clone(), free);
            return Err(match self.holder {
                VolumeHolder::Container => LhError::WellTooLittleVolume {
                    owner,
                    requested: volume,
                    available,
                },
                VolumeHolder::Tip => LhError::TipTooLittleVolume {
                    owner,
                    requested: volume,
                    available,
                },
            });
        }
        self.pending_volume = (self.pending_volume + volume).min(self.max_volume);
        Ok(())
    }

    /// Queue an aspiration of `volume` uL.
    pub fn queue_aspirate(&mut self, volume: f64, config: &EngineConfig) -> LhResult<()> {
        Self::check_volume(volume)?;
        let enabled = self.is_enabled(config);
        match self.holder {
            VolumeHolder::Container => self.remove_liquid(volume, enabled)?,
            VolumeHolder::Tip => self.add_liquid(volume, enabled)?,
        }
        if enabled {
            self.pending_ops.push(VolumeOp::Aspirate { volume });
        }
        self.dirty = true;
        Ok(())
    }

    /// Queue a dispense of `volume` uL.
    pub fn queue_dispense(&mut self, volume: f64, config: &EngineConfig) -> LhResult<()> {
        Self::check_volume(volume)?;
        let enabled = self.is_enabled(config);
        match self.holder {
            VolumeHolder::Container => self.add_liquid(volume, enabled)?,
            VolumeHolder::Tip => self.remove_liquid(volume, enabled)?,
        }
        if enabled {
            self.pending_ops.push(VolumeOp::Dispense { volume });
        }
        self.dirty = true;
        Ok(())
    }

    /// Aspirate and commit in one step.
    pub fn aspirate(&mut self, volume: f64, config: &EngineConfig) -> LhResult<()> {
        self.queue_aspirate(volume, config)?;
        self.commit();
        Ok(())
    }

    /// Dispense and commit in one step.
    pub fn dispense(&mut self, volume: f64, config: &EngineConfig) -> LhResult<()> {
        self.queue_dispense(volume, config)?;
        self.commit();
        Ok(())
    }

    /// Seed the used volume, bypassing capacity checks.
    ///
    /// Enabled trackers clamp to `[0, max_volume]` and record a `Set` entry.
    /// Any queued operations are discarded.
    pub fn set_used_volume(&mut self, volume: f64, config: &EngineConfig) {
        let enabled = self.is_enabled(config);
        let volume = if enabled {
            volume.clamp(0.0, self.max_volume)
        } else {
            volume
        };
        self.used_volume = volume;
        self.pending_volume = volume;
        self.pending_ops.clear();
        self.dirty = false;
        if enabled {
            self.history.push(VolumeOp::Set { volume });
        }
    }

    /// Replace committed state from a serialized form, without history.
    pub fn load_state(&mut self, state: &serde_json::Value) -> LhResult<()> {
        let volume = state.get("volume").and_then(|v| v.as_f64()).ok_or_else(|| {
            LhError::Configuration(format!("Invalid volume state for '{}'", self.thing))
        })?;
        self.used_volume = volume;
        self.pending_volume = volume;
        self.pending_ops.clear();
        self.dirty = false;
        Ok(())
    }
}

impl Tracker for VolumeTracker {
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
        trace!(thing = %self.thing, volume = self.pending_volume, "volume tracker commit");
        self.used_volume = self.pending_volume;
        self.history.append(&mut self.pending_ops);
        self.dirty = false;
    }

    fn rollback(&mut self) {
        self.pending_volume = self.used_volume;
        self.pending_ops.clear();
        self.dirty = false;
    }

    fn serialize_state(&self) -> serde_json::Value {
        json!({ "volume": self.used_volume })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_set_used_volume() {
        let config = EngineConfig::tracking();
        let mut well = VolumeTracker::container("well", 572.56);
        well.set_used_volume(10.0, &config);
        assert!(approx(well.get_used_volume(), 10.0));
        assert!(approx(well.get_free_volume(), 562.56));
        assert_eq!(well.history(), &[VolumeOp::Set { volume: 10.0 }]);
    }

    #[test]
    fn test_set_used_volume_clamps() {
        let config = EngineConfig::tracking();
        let mut well = VolumeTracker::container("well", 100.0);
        well.set_used_volume(150.0, &config);
        assert_eq!(well.get_used_volume(), 100.0);
        well.set_used_volume(-5.0, &config);
        assert_eq!(well.get_used_volume(), 0.0);
    }

    #[test]
    fn test_container_aspirate_drains() {
        let config = EngineConfig::tracking();
        let mut well = VolumeTracker::container("well", 200.0);
        well.set_used_volume(50.0, &config);
        well.aspirate(20.0, &config).unwrap();
        assert!(approx(well.get_used_volume(), 30.0));
        let err = well.aspirate(40.0, &config).unwrap_err();
        assert!(matches!(
            err,
            LhError::WellTooLittleLiquid { requested, available, .. }
                if requested == 40.0 && approx(available, 30.0)
        ));
        assert!(approx(well.get_used_volume(), 30.0));
    }

    #[test]
    fn test_container_dispense_overflow() {
        let config = EngineConfig::tracking();
        let mut well = VolumeTracker::container("well", 100.0);
        well.set_used_volume(90.0, &config);
        let err = well.dispense(20.0, &config).unwrap_err();
        assert!(matches!(err, LhError::WellTooLittleVolume { .. }));
        assert_eq!(well.history().len(), 1);
    }

    #[test]
    fn test_tip_dispense_from_empty() {
        let config = EngineConfig::tracking();
        let mut tip = VolumeTracker::tip("channel 0 tip", 300.0);
        let err = tip.dispense(100.0, &config).unwrap_err();
        match err {
            LhError::TipTooLittleLiquid {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 100.0);
                assert_eq!(available, 0.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_tip_aspirate_over_capacity() {
        let config = EngineConfig::tracking();
        let mut tip = VolumeTracker::tip("channel 0 tip", 10.0);
        tip.aspirate(8.0, &config).unwrap();
        assert!(matches!(
            tip.aspirate(5.0, &config),
            Err(LhError::TipTooLittleVolume { .. })
        ));
    }

    #[test]
    fn test_disabled_is_fully_permissive() {
        let config = EngineConfig::tracking();
        let mut tip = VolumeTracker::tip("channel 0 tip", 10.0);
        tip.set_enabled_override(Some(false));
        tip.aspirate(25.0, &config).unwrap();
        assert_eq!(tip.get_used_volume(), 25.0);
        tip.dispense(30.0, &config).unwrap();
        assert_eq!(tip.get_used_volume(), -5.0);
        assert!(tip.history().is_empty());
    }

    #[test]
    fn test_negative_volume_rejected() {
        let config = EngineConfig::tracking();
        let mut well = VolumeTracker::container("well", 100.0);
        assert!(matches!(
            well.aspirate(-1.0, &config),
            Err(LhError::InvalidVolume(_))
        ));
    }

    #[test]
    fn test_legal_sequences_stay_in_bounds() {
        let config = EngineConfig::tracking();
        let mut well = VolumeTracker::container("well", 100.0);
        for (i, v) in [30.0, 80.0, 10.5, 99.9, 0.1, 45.0].iter().enumerate() {
            let _ = if i % 2 == 0 {
                well.dispense(*v, &config)
            } else {
                well.aspirate(*v, &config)
            };
            let used = well.get_used_volume();
            assert!((0.0..=100.0).contains(&used), "used volume {used} out of bounds");
        }
    }
}
