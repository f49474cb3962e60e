//! Readiness probe for the upstream query.

use crate::error::EngineResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Outcome of waiting for a query to become ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessStatus {
    /// The query is ready; bootstrap may read its snapshot.
    Ready,
    /// The query reported not ready before the bound elapsed.
    NotReady,
    /// The bound elapsed without a definitive answer.
    TimedOut,
}

/// Capability for probing whether the source query is ready.
///
/// Used only during bootstrap. Implementations must enforce a timeout
/// strictly shorter than their transport's own timeout so the engine always
/// sees a logical status, never a raw transport error.
#[async_trait]
pub trait ReadinessGate: Send + Sync {
    /// Waits up to `timeout` for the query to become ready.
    async fn wait_ready(&self, query_id: &str, timeout: Duration) -> EngineResult<ReadinessStatus>;
}

/// A readiness gate with per-query canned answers, for tests.
///
/// Unknown queries report [`ReadinessStatus::Ready`].
#[derive(Debug, Default)]
pub struct MockReadinessGate {
    statuses: Mutex<HashMap<String, ReadinessStatus>>,
}

impl MockReadinessGate {
    /// Creates a gate that reports every query as ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status reported for a query.
    pub fn set_status(&self, query_id: impl Into<String>, status: ReadinessStatus) {
        self.statuses.lock().insert(query_id.into(), status);
    }
}

#[async_trait]
impl ReadinessGate for MockReadinessGate {
    async fn wait_ready(
        &self,
        query_id: &str,
        _timeout: Duration,
    ) -> EngineResult<ReadinessStatus> {
        Ok(self
            .statuses
            .lock()
            .get(query_id)
            .copied()
            .unwrap_or(ReadinessStatus::Ready))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_is_ready() {
        let gate = MockReadinessGate::new();
        let status = gate
            .wait_ready("orders", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(status, ReadinessStatus::Ready);
    }

    #[tokio::test]
    async fn configured_status() {
        let gate = MockReadinessGate::new();
        gate.set_status("orders", ReadinessStatus::TimedOut);
        let status = gate
            .wait_ready("orders", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(status, ReadinessStatus::TimedOut);
    }
}
