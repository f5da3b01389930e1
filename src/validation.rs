//! Protocol-legality gate.
//!
//! Legality is separate from physical consistency: a call can be perfectly
//! consistent with the trackers and still ask for something the protocol rules
//! or the active backend do not support. How such a call is treated depends on
//! the [`Strictness`] read from [`EngineConfig`] at the moment of the call:
//!
//! | Strictness | Effect                                   |
//! |------------|------------------------------------------|
//! | `Strict`   | returns [`LhError::Legality`]            |
//! | `Warn`     | logs at `warn`, the call proceeds         |
//! | `Ignore`   | logs at `debug`, the call proceeds        |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{LhError, LhResult};

/// Free-form backend-specific arguments attached to a call.
pub type BackendParams = BTreeMap<String, serde_json::Value>;

/// Severity applied to protocol-legality violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Strictness {
    /// Raise an error.
    Strict = 0,
    /// Log a warning and continue.
    #[default]
    Warn = 1,
    /// Log at debug level and continue.
    Ignore = 2,
}

impl Strictness {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Strictness::Strict,
            2 => Strictness::Ignore,
            _ => Strictness::Warn,
        }
    }
}

impl std::fmt::Display for Strictness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Strictness::Strict => "strict",
            Strictness::Warn => "warn",
            Strictness::Ignore => "ignore",
        };
        f.write_str(s)
    }
}

/// Apply the configured strictness to a legality violation.
pub fn enforce(
    config: &EngineConfig,
    operation: &'static str,
    message: impl Into<String>,
) -> LhResult<()> {
    let message = message.into();
    match config.strictness() {
        Strictness::Strict => Err(LhError::Legality { operation, message }),
        Strictness::Warn => {
            warn!(operation = operation, "{}", message);
            Ok(())
        }
        Strictness::Ignore => {
            debug!(operation = operation, "{}", message);
            Ok(())
        }
    }
}

/// Flag parameters the backend does not declare support for.
///
/// Unsupported parameters are still passed through when the call proceeds;
/// the backend decides what to do with them.
pub fn check_unsupported_params(
    config: &EngineConfig,
    operation: &'static str,
    params: &BackendParams,
    supported: &[String],
) -> LhResult<()> {
    let extra: Vec<&str> = params
        .keys()
        .filter(|k| !supported.iter().any(|s| s == *k))
        .map(String::as_str)
        .collect();
    if extra.is_empty() {
        return Ok(());
    }
    enforce(
        config,
        operation,
        format!("unsupported backend parameters: {}", extra.join(", ")),
    )
}

/// Flag batches that use more channels than the backend can drive per command.
pub fn check_channel_count(
    config: &EngineConfig,
    operation: &'static str,
    participating: usize,
    max_per_command: usize,
) -> LhResult<()> {
    if participating <= max_per_command {
        return Ok(());
    }
    enforce(
        config,
        operation,
        format!(
            "{} channels requested but backend services at most {} per command",
            participating, max_per_command
        ),
    )
}
