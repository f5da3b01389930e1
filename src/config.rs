//! Engine configuration using Figment.
//!
//! Two layers live here:
//!
//! - [`EngineSettings`], a plain serde snapshot loaded from a TOML file and
//!   `LIQUID_`-prefixed environment variables.
//! - [`EngineConfig`], the live object handed to a [`LiquidHandler`] by `Arc`.
//!   Its fields are atomics so they can be changed between calls, and every
//!   engine operation reads them at call time. Nothing caches them.
//!
//! A single `EngineConfig` may be shared by several control instances. Tasks
//! sharing one instance must serialize their own writes; the engine only reads.
//!
//! # Environment Variable Overrides
//!
//! ```text
//! LIQUID_STRICTNESS=strict
//! LIQUID_TIP_TRACKING=true
//! LIQUID_VOLUME_TRACKING=true
//! ```
//!
//! [`LiquidHandler`]: crate::liquid_handler::LiquidHandler

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::error::{LhError, LhResult};
use crate::validation::Strictness;

/// Serializable snapshot of the engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Severity applied to protocol-legality violations
    #[serde(default)]
    pub strictness: Strictness,
    /// Default for tip trackers without an explicit override
    #[serde(default)]
    pub tip_tracking: bool,
    /// Default for volume trackers without an explicit override
    #[serde(default)]
    pub volume_tracking: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            strictness: Strictness::Warn,
            tip_tracking: false,
            volume_tracking: false,
        }
    }
}

impl EngineSettings {
    /// Load settings from a TOML file with environment overrides.
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment variables (`LIQUID_` prefix)
    /// 2. The TOML file
    /// 3. Built-in defaults
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> LhResult<Self> {
        let settings: Self = Figment::new()
            .merge(Serialized::defaults(EngineSettings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("LIQUID_"))
            .extract()?;
        Ok(settings)
    }

    /// Parse settings from TOML text, without environment overrides.
    pub fn from_toml_str(text: &str) -> LhResult<Self> {
        toml::from_str(text)
            .map_err(|e| LhError::Configuration(format!("Invalid settings TOML: {}", e)))
    }

    /// Render these settings as TOML.
    pub fn to_toml_string(&self) -> LhResult<String> {
        toml::to_string(self)
            .map_err(|e| LhError::Configuration(format!("Cannot render settings: {}", e)))
    }
}

/// Live, shared engine configuration.
///
/// Setters take `&self`; values are read fresh by every engine call.
#[derive(Debug)]
pub struct EngineConfig {
    strictness: AtomicU8,
    tip_tracking: AtomicBool,
    volume_tracking: AtomicBool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl From<EngineSettings> for EngineConfig {
    fn from(settings: EngineSettings) -> Self {
        Self::new(settings)
    }
}

impl EngineConfig {
    /// Create a live configuration from a settings snapshot.
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            strictness: AtomicU8::new(settings.strictness as u8),
            tip_tracking: AtomicBool::new(settings.tip_tracking),
            volume_tracking: AtomicBool::new(settings.volume_tracking),
        }
    }

    /// Convenience constructor with both trackers enabled by default.
    pub fn tracking() -> Self {
        Self::new(EngineSettings {
            tip_tracking: true,
            volume_tracking: true,
            ..EngineSettings::default()
        })
    }

    /// Current strictness level.
    pub fn strictness(&self) -> Strictness {
        Strictness::from_u8(self.strictness.load(Ordering::SeqCst))
    }

    /// Change the strictness level.
    pub fn set_strictness(&self, strictness: Strictness) {
        self.strictness.store(strictness as u8, Ordering::SeqCst);
    }

    /// Process-wide default for tip trackers without an explicit override.
    pub fn tip_tracking(&self) -> bool {
        self.tip_tracking.load(Ordering::SeqCst)
    }

    /// Change the tip tracking default.
    pub fn set_tip_tracking(&self, enabled: bool) {
        self.tip_tracking.store(enabled, Ordering::SeqCst);
    }

    /// Process-wide default for volume trackers without an explicit override.
    pub fn volume_tracking(&self) -> bool {
        self.volume_tracking.load(Ordering::SeqCst)
    }

    /// Change the volume tracking default.
    pub fn set_volume_tracking(&self, enabled: bool) {
        self.volume_tracking.store(enabled, Ordering::SeqCst);
    }

    /// Snapshot of the current values.
    pub fn snapshot(&self) -> EngineSettings {
        EngineSettings {
            strictness: self.strictness(),
            tip_tracking: self.tip_tracking(),
            volume_tracking: self.volume_tracking(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.strictness(), Strictness::Warn);
        assert!(!config.tip_tracking());
        assert!(!config.volume_tracking());
    }

    #[test]
    fn test_setters_are_visible_immediately() {
        let config = EngineConfig::default();
        config.set_strictness(Strictness::Strict);
        config.set_tip_tracking(true);
        assert_eq!(config.snapshot().strictness, Strictness::Strict);
        assert!(config.snapshot().tip_tracking);
    }

    #[test]
    fn test_toml_roundtrip() {
        let settings = EngineSettings {
            strictness: Strictness::Ignore,
            tip_tracking: true,
            volume_tracking: true,
        };
        let text = settings.to_toml_string().unwrap();
        assert_eq!(EngineSettings::from_toml_str(&text).unwrap(), settings);
    }

    #[test]
    fn test_unknown_strictness_is_rejected() {
        let err = EngineSettings::from_toml_str("strictness = \"loud\"\n").unwrap_err();
        assert!(matches!(err, LhError::Configuration(_)));
    }

    #[test]
    #[serial]
    fn test_load_from_file_with_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "strictness = \"strict\"\ntip_tracking = true").unwrap();

        std::env::set_var("LIQUID_STRICTNESS", "ignore");
        let settings = EngineSettings::load_from(file.path());
        std::env::remove_var("LIQUID_STRICTNESS");

        let settings = settings.unwrap();
        assert_eq!(settings.strictness, Strictness::Ignore);
        assert!(settings.tip_tracking);
        assert!(!settings.volume_tracking);
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        let settings = EngineSettings::load_from("does/not/exist.toml").unwrap();
        assert_eq!(settings, EngineSettings::default());
    }
}
