//! Unit tests for mh-events.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::{EventKind, EventRelay, MemoryPublisher, Publisher};

#[cfg(test)]
mod emit {
    use super::*;

    #[test]
    fn emit_without_subscribers_still_counts() {
        let relay = EventRelay::new(8);
        assert_eq!(relay.emit(EventKind::LotCreated, "lot-1", json!(null), json!("waiting")), 1);
        assert_eq!(relay.emit(EventKind::LotCreated, "lot-2", json!(null), json!("waiting")), 2);
        assert_eq!(relay.emitted(), 2);
    }

    #[tokio::test]
    async fn subscriber_sees_event_with_old_and_new() {
        let relay = EventRelay::new(8);
        let mut rx = relay.subscribe();
        relay.emit(EventKind::LocationStateChanged, "p1", json!("available"), json!("occupied"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.seq, 1);
        assert_eq!(ev.kind, EventKind::LocationStateChanged);
        assert_eq!(ev.entity_id, "p1");
        assert_eq!(ev.old, json!("available"));
        assert_eq!(ev.new, json!("occupied"));
        assert_eq!(ev.topic(), "location.state_changed");
    }

    #[tokio::test]
    async fn each_emit_produces_exactly_one_event() {
        let relay = EventRelay::new(16);
        let mut rx = relay.subscribe();
        for i in 0..5 {
            relay.emit(EventKind::JobStatusChanged, format!("job-{i}"), json!(null), json!("pending"));
        }
        for expected in 1..=5 {
            assert_eq!(rx.recv().await.unwrap().seq, expected);
        }
        assert!(rx.try_recv().is_err());
    }
}

#[cfg(test)]
mod publish {
    use super::*;

    #[tokio::test]
    async fn pump_forwards_topic_and_payload() {
        let relay = EventRelay::new(16);
        let sink = Arc::new(MemoryPublisher::new());
        let cancel = CancellationToken::new();
        let pump = relay.spawn_publisher(sink.clone() as Arc<dyn Publisher>, cancel.clone());

        relay.emit(EventKind::RobotPositionChanged, "r1", json!([0.0, 0.0]), json!([0.5, 0.0]));
        relay.emit(EventKind::LotCreated, "lot-1", json!(null), json!("waiting"));

        // Give the pump a chance to drain before shutting down; the flush on
        // cancel covers anything still buffered.
        tokio::task::yield_now().await;
        cancel.cancel();
        pump.await.unwrap();

        let topics = sink.topics();
        assert_eq!(topics, vec!["robot.position_changed", "lot.created"]);
        let (_, payload) = &sink.published()[1];
        let decoded: serde_json::Value = serde_json::from_slice(payload).unwrap();
        assert_eq!(decoded["entity_id"], "lot-1");
        assert_eq!(decoded["kind"], "lot_created");
    }

    struct FailingPublisher;

    #[async_trait::async_trait]
    impl Publisher for FailingPublisher {
        async fn publish(&self, topic: &str, _payload: &[u8]) -> crate::EventResult<()> {
            Err(crate::EventError::Publish { topic: topic.into(), reason: "bus down".into() })
        }
    }

    #[tokio::test]
    async fn publish_failure_does_not_affect_emit() {
        let relay = EventRelay::new(4);
        let cancel = CancellationToken::new();
        let pump = relay.spawn_publisher(Arc::new(FailingPublisher), cancel.clone());

        let seq = relay.emit(EventKind::EdgeAdded, "A->B", json!(null), json!(3.0));
        assert_eq!(seq, 1);

        cancel.cancel();
        pump.await.unwrap();
        assert_eq!(relay.emitted(), 1);
    }
}
