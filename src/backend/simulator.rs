//! Simulated liquid handler backend for testing.
//!
//! Provides:
//! - Recording of every executed operation for test verification
//! - Controllable failure injection
//! - Optional work envelope for reachability checks
//! - Simulated command latency

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use super::{Backend, BackendCapabilities};
use crate::coordinate::Coordinate;
use crate::standard::Operation;
use crate::validation::BackendParams;

/// Simulated backend.
///
/// Clones share the operation log and failure flag, so a test can keep a
/// handle while the handler owns another.
///
/// # Example
///
/// ```
/// use liquid_handling::backend::{Backend, SimulatorBackend};
///
/// let sim = SimulatorBackend::new(8).with_head96();
/// assert_eq!(sim.capabilities().num_channels, 8);
/// assert!(sim.executed().is_empty());
/// ```
#[derive(Clone)]
pub struct SimulatorBackend {
    capabilities: BackendCapabilities,
    envelope: Option<(Coordinate, Coordinate)>,
    latency: Duration,
    setup_done: Arc<AtomicBool>,
    should_fail_next: Arc<AtomicBool>,
    executed: Arc<Mutex<Vec<Operation>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimulatorBackend {
    /// Backend with `num_channels` independent channels and no 96 head.
    pub fn new(num_channels: usize) -> Self {
        Self {
            capabilities: BackendCapabilities::channels(num_channels),
            envelope: None,
            latency: Duration::ZERO,
            setup_done: Arc::new(AtomicBool::new(false)),
            should_fail_next: Arc::new(AtomicBool::new(false)),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Install a 96 head.
    pub fn with_head96(mut self) -> Self {
        self.capabilities.has_head96 = true;
        self
    }

    /// Limit how many channels one command may use.
    pub fn with_max_channels_per_command(mut self, max: usize) -> Self {
        self.capabilities.max_channels_per_command = max;
        self
    }

    /// Accept these backend-specific parameters.
    pub fn with_supported_params(mut self, params: &[&str]) -> Self {
        self.capabilities.supported_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Only locations inside the box `min..=max` are reachable.
    pub fn with_envelope(mut self, min: Coordinate, max: Coordinate) -> Self {
        self.envelope = Some((min, max));
        self
    }

    /// Simulated latency per executed operation.
    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency = Duration::from_millis(ms);
        self
    }

    /// Make the next `execute` call fail.
    pub fn inject_next_failure(&self) {
        self.should_fail_next.store(true, Ordering::SeqCst);
    }

    fn check_failure(&self) -> bool {
        self.should_fail_next.swap(false, Ordering::SeqCst)
    }

    /// Whether `setup` ran without a matching `stop`.
    pub fn is_setup(&self) -> bool {
        self.setup_done.load(Ordering::SeqCst)
    }

    /// Operations executed so far, oldest first.
    pub fn executed(&self) -> Vec<Operation> {
        lock(&self.executed).clone()
    }

    /// Forget the executed operations.
    pub fn clear_log(&self) {
        lock(&self.executed).clear();
    }
}

#[async_trait]
impl Backend for SimulatorBackend {
    fn name(&self) -> &str {
        "simulator"
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities.clone()
    }

    async fn setup(&self) -> Result<()> {
        self.setup_done.store(true, Ordering::SeqCst);
        info!(channels = self.capabilities.num_channels, "Simulator set up");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.setup_done.store(false, Ordering::SeqCst);
        info!("Simulator stopped");
        Ok(())
    }

    fn can_reach(&self, _channel: Option<usize>, location: Coordinate) -> bool {
        match self.envelope {
            None => true,
            Some((min, max)) => {
                (min.x..=max.x).contains(&location.x)
                    && (min.y..=max.y).contains(&location.y)
                    && (min.z..=max.z).contains(&location.z)
            }
        }
    }

    async fn execute(&self, operation: &Operation, _params: &BackendParams) -> Result<()> {
        if self.check_failure() {
            bail!("Simulated failure during {}", operation.name());
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        debug!(operation = operation.name(), "Simulator executed operation");
        lock(&self.executed).push(operation.clone());
        Ok(())
    }
}
