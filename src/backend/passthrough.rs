//! Backend wrapper that logs every operation before forwarding it.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use super::{Backend, BackendCapabilities};
use crate::coordinate::Coordinate;
use crate::standard::Operation;
use crate::validation::BackendParams;

/// Forwards to `inner`, logging each operation as JSON.
pub struct LoggingBackend<B> {
    inner: B,
}

impl<B: Backend> LoggingBackend<B> {
    /// Wrap `inner`.
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: Backend> Backend for LoggingBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.inner.capabilities()
    }

    async fn setup(&self) -> Result<()> {
        info!(backend = self.inner.name(), "setup");
        self.inner.setup().await
    }

    async fn stop(&self) -> Result<()> {
        info!(backend = self.inner.name(), "stop");
        self.inner.stop().await
    }

    fn can_reach(&self, channel: Option<usize>, location: Coordinate) -> bool {
        self.inner.can_reach(channel, location)
    }

    async fn execute(&self, operation: &Operation, params: &BackendParams) -> Result<()> {
        let payload = serde_json::to_string(operation)?;
        info!(backend = self.inner.name(), operation = %payload, "execute");
        let result = self.inner.execute(operation, params).await;
        if let Err(e) = &result {
            warn!(backend = self.inner.name(), error = %e, "Operation failed");
        }
        result
    }
}
