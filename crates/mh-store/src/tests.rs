//! Unit tests for mh-store.

use mh_core::{
    Carrier, EdgeRecord, GraphSnapshot, ItemKind, Location, LocationId, LocationKind, Position,
    Robot, RobotId,
};

use crate::FacilityStore;

fn port(id: &str) -> Location {
    Location::new(id, id.to_uppercase(), LocationKind::CassettePort, Position::planar(1.0, 2.0))
}

fn graph() -> GraphSnapshot {
    GraphSnapshot {
        nodes: vec![LocationId::from("A"), LocationId::from("B")],
        edges: vec![EdgeRecord {
            from:          LocationId::from("A"),
            to:            LocationId::from("B"),
            cost:          3.0,
            bidirectional: true,
        }],
    }
}

/// Exercises the full trait surface against any back-end.
async fn roundtrip_all(store: &dyn FacilityStore) {
    store.put_location(&port("p2")).await.unwrap();
    store.put_location(&port("p1").holding("c1")).await.unwrap();
    let got = store.get_location(&LocationId::from("p1")).await.unwrap().unwrap();
    assert_eq!(got.current_item.as_ref().map(|i| i.as_str()), Some("c1"));
    assert!(store.get_location(&LocationId::from("nope")).await.unwrap().is_none());
    let ids: Vec<_> = store.list_locations().await.unwrap().into_iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![LocationId::from("p1"), LocationId::from("p2")]);

    let tray = Carrier::stowed("t1", ItemKind::Tray, "c1");
    store.put_item(&Carrier::cassette("c1", "p1")).await.unwrap();
    store.put_item(&tray).await.unwrap();
    assert_eq!(store.get_item(&"t1".into()).await.unwrap(), Some(tray));
    assert_eq!(store.list_items().await.unwrap().len(), 2);

    let robot = Robot::new("r1", Position::planar(0.5, 0.5));
    store.put_robot(&robot).await.unwrap();
    let moved = Robot::new("r1", Position::planar(4.0, 0.5));
    store.put_robot(&moved).await.unwrap();
    assert_eq!(store.get_robot(&RobotId::from("r1")).await.unwrap(), Some(moved));
    assert_eq!(store.list_robots().await.unwrap().len(), 1);

    assert!(store.get_graph().await.unwrap().is_none());
    store.put_graph(&graph()).await.unwrap();
    assert_eq!(store.get_graph().await.unwrap(), Some(graph()));
}

#[cfg(test)]
mod memory {
    use super::*;
    use crate::{MemoryStore, StoreError};

    #[tokio::test]
    async fn full_roundtrip() {
        roundtrip_all(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn unavailable_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.put_location(&port("p1")).await, Err(StoreError::Unavailable(_))));
        assert!(store.list_robots().await.is_err());
        store.set_unavailable(false);
        assert!(store.put_location(&port("p1")).await.is_ok());
    }

    #[tokio::test]
    async fn injected_fault_is_per_key() {
        let store = MemoryStore::new();
        store.put_robot(&Robot::new("r1", Position::default())).await.unwrap();
        store.put_robot(&Robot::new("r2", Position::default())).await.unwrap();
        store.inject_fault("robot/r1");
        assert!(store.get_robot(&"r1".into()).await.is_err());
        assert!(store.get_robot(&"r2".into()).await.unwrap().is_some());
        store.clear_fault("robot/r1");
        assert!(store.get_robot(&"r1".into()).await.unwrap().is_some());
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod sqlite {
    use super::*;
    use crate::SqliteStore;

    #[tokio::test]
    async fn full_roundtrip_in_memory() {
        roundtrip_all(&SqliteStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facility.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.put_location(&port("p1")).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.get_location(&"p1".into()).await.unwrap().is_some());
    }
}
