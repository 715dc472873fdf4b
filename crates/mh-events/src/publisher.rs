//! The publish collaborator and stock implementations.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::EventResult;

/// Accepts `(topic, payload)` pairs for external delivery.
///
/// Delivery is at-most-once per call with no ordering guarantee across
/// topics.  Implementations backed by a message bus live in the host
/// application.
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    async fn publish(&self, topic: &str, payload: &[u8]) -> EventResult<()>;
}

/// Drops everything.
pub struct NoopPublisher;

#[async_trait]
impl Publisher for NoopPublisher {
    async fn publish(&self, _topic: &str, _payload: &[u8]) -> EventResult<()> {
        Ok(())
    }
}

/// Writes each event to the `tracing` stream at debug level.
pub struct TracingPublisher;

#[async_trait]
impl Publisher for TracingPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> EventResult<()> {
        debug!(topic, payload = %String::from_utf8_lossy(payload), "event published");
        Ok(())
    }
}

/// Collects published pairs in memory.  Used by tests and the demo.
#[derive(Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything published so far.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().clone()
    }

    /// Topics published so far, in delivery order.
    pub fn topics(&self) -> Vec<String> {
        self.published.lock().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> EventResult<()> {
        self.published.lock().push((topic.to_owned(), payload.to_vec()));
        Ok(())
    }
}
