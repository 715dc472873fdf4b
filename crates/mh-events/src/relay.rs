//! `EventRelay` — the single point through which every mutation is announced.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{EventKind, Publisher, StateEvent};

/// Cheap-to-clone handle shared by every component that mutates state.
#[derive(Clone)]
pub struct EventRelay {
    inner: Arc<Inner>,
}

struct Inner {
    seq: AtomicU64,
    tx:  broadcast::Sender<StateEvent>,
}

impl EventRelay {
    /// Create a relay whose broadcast ring holds `capacity` events.
    ///
    /// Subscribers that fall more than `capacity` events behind lose the
    /// oldest ones (reported as a lag, never as a mutation failure).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner { seq: AtomicU64::new(0), tx }),
        }
    }

    /// Record one event.  Synchronous and infallible; returns the assigned
    /// sequence number.
    pub fn emit(
        &self,
        kind:      EventKind,
        entity_id: impl Into<String>,
        old:       Value,
        new:       Value,
    ) -> u64 {
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let event = StateEvent {
            seq,
            kind,
            entity_id: entity_id.into(),
            old,
            new,
            at: Utc::now(),
        };
        // Err only means nobody is subscribed right now.
        let _ = self.inner.tx.send(event);
        seq
    }

    /// Number of events emitted so far.
    pub fn emitted(&self) -> u64 {
        self.inner.seq.load(Ordering::SeqCst)
    }

    /// Subscribe to every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.inner.tx.subscribe()
    }

    /// Spawn the pump that forwards events to `publisher` until `cancel`
    /// fires.  Publish failures are logged and the event is dropped.
    pub fn spawn_publisher(
        &self,
        publisher: Arc<dyn Publisher>,
        cancel:    CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "event publisher lagged; events dropped");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };
                forward(publisher.as_ref(), &event).await;
            }
            // Flush what is already buffered so a clean shutdown loses nothing.
            while let Ok(event) = rx.try_recv() {
                forward(publisher.as_ref(), &event).await;
            }
            debug!("event publisher stopped");
        })
    }
}

async fn forward(publisher: &dyn Publisher, event: &StateEvent) {
    let payload = match event.payload() {
        Ok(p) => p,
        Err(e) => {
            warn!(seq = event.seq, error = %e, "event payload serialization failed");
            return;
        }
    };
    if let Err(e) = publisher.publish(event.topic(), &payload).await {
        warn!(seq = event.seq, topic = event.topic(), error = %e, "event publish failed");
    }
}
