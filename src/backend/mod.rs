//! Backend dispatch interface.
//!
//! A backend turns standard-form [`Operation`]s into something that happens:
//! a hardware command, a simulated state change, a log line. The engine has
//! already validated and committed tracker state before calling
//! [`Backend::execute`]; a failing backend never causes a tracker rollback.
//!
//! # Available Backends
//!
//! - [`SimulatorBackend`] - records operations, optional work envelope, failure injection
//! - [`LoggingBackend`] - passthrough that logs every operation before forwarding

pub mod passthrough;
pub mod simulator;

pub use passthrough::LoggingBackend;
pub use simulator::SimulatorBackend;

use anyhow::Result;
use async_trait::async_trait;

use crate::coordinate::Coordinate;
use crate::standard::Operation;
use crate::validation::BackendParams;

/// What a backend can service.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendCapabilities {
    /// Independently addressable channels
    pub num_channels: usize,
    /// Channels that can take part in one command
    pub max_channels_per_command: usize,
    /// Whether a 96 head is installed
    pub has_head96: bool,
    /// Backend-specific parameter names accepted by `execute`
    pub supported_params: Vec<String>,
}

impl BackendCapabilities {
    /// `num_channels` channels, all usable together, no 96 head.
    pub fn channels(num_channels: usize) -> Self {
        Self {
            num_channels,
            max_channels_per_command: num_channels,
            has_head96: false,
            supported_params: Vec::new(),
        }
    }
}

/// Interchangeable executor of standard-form operations.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Fixed properties of the device.
    fn capabilities(&self) -> BackendCapabilities;

    /// Connect and initialize. Called once before any operation.
    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    /// Release the device.
    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Whether `channel` (or the 96 head when `None`) can reach `location`.
    fn can_reach(&self, _channel: Option<usize>, _location: Coordinate) -> bool {
        true
    }

    /// Execute one operation. Resolves when the device acknowledges it.
    async fn execute(&self, operation: &Operation, params: &BackendParams) -> Result<()>;
}
