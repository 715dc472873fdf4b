//! Unit tests for mh-facility.

#[cfg(test)]
mod helpers {
    use std::sync::Arc;

    use mh_core::{Carrier, FacilityConfig, Location, LocationKind, LotId, Position, Robot};
    use mh_plan::{CassetteMove, ExecutionStrategy, FlowDirection, LotStep, WorkOrder};
    use mh_store::MemoryStore;
    use mh_topology::FacilityLayout;

    use crate::FacilityBuilder;

    pub fn port(id: &str, x: f64) -> Location {
        Location::new(id, id, LocationKind::CassettePort, Position::planar(x, 0.0))
    }

    /// Stock ports at x = 1, 2 and tool ports at x = 4, 5.
    pub fn layout() -> FacilityLayout {
        FacilityLayout::new()
            .location(port("stock-1", 1.0))
            .location(port("stock-2", 2.0))
            .location(port("tool-1", 4.0))
            .location(port("tool-2", 5.0))
            .edge("stock-1", "tool-1", 3.0, true)
            .unwrap()
    }

    pub fn tray_port(id: &str, x: f64) -> Location {
        Location::new(id, id, LocationKind::TrayPort, Position::planar(x, 0.0))
    }

    pub fn config() -> FacilityConfig {
        FacilityConfig { robot_speed: 2.0, ..FacilityConfig::default() }
    }

    pub fn robot(id: &str, x: f64) -> Robot {
        Robot::new(id, Position::planar(x, 0.0))
    }

    /// `c1` on `stock-1`, `c2` on `stock-2`, one robot at the origin.
    pub fn builder(store: Arc<MemoryStore>) -> FacilityBuilder {
        FacilityBuilder::new(config(), store, layout())
            .robots(vec![robot("r1", 0.0)])
            .carriers(vec![Carrier::cassette("c1", "stock-1"), Carrier::cassette("c2", "stock-2")])
    }

    pub fn inbound(lot: &str, moves: &[(&str, &str)], strategy: ExecutionStrategy) -> WorkOrder {
        WorkOrder {
            lot:      LotId::from(lot),
            priority: 0,
            steps:    vec![LotStep::new(
                1,
                FlowDirection::Inbound,
                moves.iter().map(|(c, d)| CassetteMove::new(*c, *d)).collect(),
            )
            .with_strategy(strategy)],
        }
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod builder {
    use std::sync::Arc;

    use mh_core::{
        Carrier, FacilityConfig, ItemId, LocationId, LocationKind, LocationStatus, Position,
    };
    use mh_store::MemoryStore;
    use mh_topology::TopologyError;

    use super::helpers::{builder, config, layout, robot};
    use crate::{DispatchMode, FacilityBuilder, FacilityError};

    #[test]
    fn robots_get_deck_locations() {
        let facility = builder(Arc::new(MemoryStore::new())).build().unwrap();
        let deck = facility.location(&LocationId::from("r1")).unwrap();
        assert_eq!(deck.kind, LocationKind::Robot);
        assert_eq!(deck.position, Position::planar(0.0, 0.0));
        assert!(!deck.is_occupied());
        assert_eq!(facility.robot_ids().len(), 1);
    }

    #[test]
    fn carriers_occupy_their_locations() {
        let facility = builder(Arc::new(MemoryStore::new())).build().unwrap();
        let stock = facility.location(&LocationId::from("stock-1")).unwrap();
        assert_eq!(stock.status, LocationStatus::Occupied);
        assert_eq!(stock.current_item, Some(ItemId::from("c1")));
        assert_eq!(facility.carrier_location(&ItemId::from("c2")).unwrap(), LocationId::from("stock-2"));
        assert_eq!(facility.events().emitted(), 0);
    }

    #[test]
    fn placement_conflict_rejected() {
        let result = builder(Arc::new(MemoryStore::new()))
            .carriers(vec![Carrier::cassette("c3", "stock-1")])
            .build();
        assert!(matches!(result, Err(FacilityError::PlacementConflict { .. })));
    }

    #[test]
    fn carrier_at_unknown_location_rejected() {
        let result = builder(Arc::new(MemoryStore::new()))
            .carriers(vec![Carrier::cassette("c3", "nowhere")])
            .build();
        assert!(matches!(result, Err(FacilityError::Topology(TopologyError::NotFound(_)))));
    }

    #[test]
    fn duplicate_robot_rejected() {
        let result = builder(Arc::new(MemoryStore::new()))
            .robots(vec![robot("r1", 3.0)])
            .build();
        assert!(matches!(result, Err(FacilityError::DuplicateRobot(_))));
    }

    #[test]
    fn robot_dispatch_needs_robots() {
        let result = FacilityBuilder::new(config(), Arc::new(MemoryStore::new()), layout()).build();
        assert!(matches!(result, Err(FacilityError::NoRobots)));

        let publishing = FacilityBuilder::new(config(), Arc::new(MemoryStore::new()), layout())
            .dispatch(DispatchMode::Publish)
            .build();
        assert!(publishing.is_ok());
    }

    #[test]
    fn invalid_config_rejected() {
        let bad = FacilityConfig { tick_interval_ms: 0, ..FacilityConfig::default() };
        let result = FacilityBuilder::new(bad, Arc::new(MemoryStore::new()), layout())
            .dispatch(DispatchMode::Publish)
            .build();
        assert!(matches!(result, Err(FacilityError::Config(_))));
    }
}

// ── Initialization ────────────────────────────────────────────────────────────

#[cfg(test)]
mod init {
    use std::sync::Arc;

    use futures::future::join_all;
    use mh_core::{Position, Robot, RobotId};
    use mh_store::{FacilityStore, MemoryStore};

    use super::helpers::builder;
    use crate::FacilityError;

    #[tokio::test]
    async fn seeds_store_once() {
        let store = Arc::new(MemoryStore::new());
        let facility = builder(store.clone()).build().unwrap();
        assert!(!facility.is_initialized());

        let results = join_all((0..8).map(|_| facility.ensure_initialized())).await;
        assert!(results.iter().all(Result::is_ok));
        assert!(facility.is_initialized());

        assert_eq!(store.list_locations().await.unwrap().len(), facility.topology().len());
        assert_eq!(store.list_items().await.unwrap().len(), 2);
        assert_eq!(store.list_robots().await.unwrap().len(), 1);
        assert_eq!(store.get_graph().await.unwrap().unwrap().edges.len(), 1);

        // A second call must not overwrite what happened since.
        store.put_robot(&Robot::new("r1", Position::planar(9.0, 9.0))).await.unwrap();
        facility.ensure_initialized().await.unwrap();
        let r1 = store.get_robot(&RobotId::from("r1")).await.unwrap().unwrap();
        assert_eq!(r1.position, Position::planar(9.0, 9.0));
    }

    #[tokio::test]
    async fn failed_seed_is_retried() {
        let store = Arc::new(MemoryStore::new());
        let facility = builder(store.clone()).build().unwrap();

        store.set_unavailable(true);
        assert!(matches!(facility.ensure_initialized().await, Err(FacilityError::Store(_))));
        assert!(!facility.is_initialized());

        store.set_unavailable(false);
        facility.ensure_initialized().await.unwrap();
        assert!(facility.is_initialized());
    }

    #[tokio::test]
    async fn stored_robot_keeps_position() {
        let store = Arc::new(MemoryStore::new());
        store.put_robot(&Robot::new("r1", Position::planar(3.0, 3.0))).await.unwrap();
        let facility = builder(store.clone()).build().unwrap();
        facility.ensure_initialized().await.unwrap();
        assert_eq!(
            facility.robot_position(&RobotId::from("r1")).await.unwrap(),
            Position::planar(3.0, 3.0)
        );
    }
}

// ── Graph edits ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod graph {
    use std::sync::Arc;

    use mh_core::LocationId;
    use mh_store::{FacilityStore, MemoryStore};
    use mh_topology::TopologyError;

    use super::helpers::builder;
    use crate::FacilityError;

    #[tokio::test]
    async fn runtime_edges_reach_the_store() {
        let store = Arc::new(MemoryStore::new());
        let facility = builder(store.clone()).build().unwrap();
        facility.ensure_initialized().await.unwrap();

        facility
            .add_edge(LocationId::from("stock-2"), LocationId::from("tool-2"), 3.0, true)
            .await
            .unwrap();
        let stored = store.get_graph().await.unwrap().unwrap();
        assert_eq!(stored.edges.len(), 2);
        assert_eq!(stored, facility.topology().graph_snapshot());

        assert!(facility.add_node(LocationId::from("aisle")).await.unwrap());
        assert!(!facility.add_node(LocationId::from("aisle")).await.unwrap());
        let stored = store.get_graph().await.unwrap().unwrap();
        assert!(stored.nodes.contains(&LocationId::from("aisle")));
        assert_eq!(stored, facility.topology().graph_snapshot());
    }

    #[tokio::test]
    async fn failed_graph_write_leaves_graph_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let facility = builder(store.clone()).build().unwrap();
        facility.ensure_initialized().await.unwrap();
        let emitted = facility.events().emitted();

        store.inject_fault("graph");
        let result = facility
            .add_edge(LocationId::from("stock-2"), LocationId::from("tool-2"), 3.0, true)
            .await;
        assert!(matches!(result, Err(FacilityError::Store(_))));
        assert!(matches!(facility.add_node(LocationId::from("aisle")).await, Err(FacilityError::Store(_))));
        assert_eq!(facility.topology().graph_snapshot().edges.len(), 1);
        assert!(facility.topology().neighbors(&LocationId::from("stock-2")).is_empty());
        assert_eq!(facility.events().emitted(), emitted);

        store.clear_fault("graph");
        assert_eq!(store.get_graph().await.unwrap().unwrap().edges.len(), 1);
    }

    #[tokio::test]
    async fn invalid_edge_is_not_persisted() {
        let store = Arc::new(MemoryStore::new());
        let facility = builder(store.clone()).build().unwrap();
        let result = facility
            .add_edge(LocationId::from("stock-2"), LocationId::from("tool-2"), -1.0, false)
            .await;
        assert!(matches!(result, Err(FacilityError::Topology(TopologyError::InvalidEdge { .. }))));
        assert_eq!(store.get_graph().await.unwrap().unwrap().edges.len(), 1);
    }
}

// ── Robot dispatcher ──────────────────────────────────────────────────────────

#[cfg(test)]
mod robots {
    use std::sync::Arc;
    use std::time::Duration;

    use mh_core::{ItemId, JobId, LocationId, RobotId};
    use mh_plan::{JobStatus, StepAction};
    use mh_store::MemoryStore;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::helpers::builder;
    use crate::{DispatchMode, Dispatcher, JobOrder, ReportSink, RobotDispatcher};

    fn load(job: &str, item: &str, from: &str, to: &str) -> JobOrder {
        JobOrder {
            job:    JobId::from(job),
            lot:    "lot-1".into(),
            group:  "group-1".into(),
            action: StepAction::CassetteLoad,
            from:   LocationId::from(from),
            to:     LocationId::from(to),
            item:   Some(ItemId::from(item)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drain_fails_moving_job_and_frees_robot() {
        let facility = builder(Arc::new(MemoryStore::new()))
            .dispatch(DispatchMode::Publish)
            .build()
            .unwrap();
        let handle = facility.start(CancellationToken::new()).await.unwrap();
        let robots = RobotDispatcher::new(
            vec![RobotId::from("r1")],
            Arc::clone(facility.motion()),
            Arc::clone(facility.assignment()),
            Arc::clone(facility.transport()),
            Arc::clone(facility.store()),
            2.0,
        )
        .unwrap();
        robots.attach(CancellationToken::new());

        let sink = ReportSink::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        sink.register(JobId::from("j1"), tx);
        robots.dispatch(load("j1", "c1", "stock-1", "tool-1"), sink.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(robots.idle_robots(), 0);
        assert_eq!(robots.active_jobs(), 1);

        robots.drain().await;
        assert_eq!(robots.idle_robots(), 1);
        assert_eq!(robots.active_jobs(), 0);
        assert_eq!(rx.try_recv().unwrap().status, JobStatus::InProgress);
        let failed = rx.try_recv().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.detail.unwrap().contains("shutdown"));

        // Stopped short of the source; nothing was picked.
        let at = facility.robot_position(&RobotId::from("r1")).await.unwrap();
        assert!(at.x < 1.0);
        assert_eq!(
            facility.location(&LocationId::from("stock-1")).unwrap().current_item,
            Some(ItemId::from("c1"))
        );
        assert!(robots.dispatch(load("j2", "c2", "stock-2", "tool-2"), sink).await.is_err());

        handle.shutdown().await;
    }
}

// ── Report routing ────────────────────────────────────────────────────────────

#[cfg(test)]
mod sink {
    use mh_core::JobId;
    use mh_plan::JobStatus;
    use tokio::sync::mpsc;

    use crate::{JobReport, ReportSink};

    #[test]
    fn routes_until_terminal() {
        let sink = ReportSink::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        sink.register(JobId::from("j1"), tx);
        assert_eq!(sink.pending(), 1);

        assert!(sink.report(JobReport::new(JobId::from("j1"), JobStatus::InProgress)));
        assert!(sink.report(JobReport::failed(JobId::from("j1"), "jammed")));
        assert_eq!(sink.pending(), 0);
        assert!(!sink.report(JobReport::new(JobId::from("j1"), JobStatus::Completed)));

        assert_eq!(rx.try_recv().unwrap().status, JobStatus::InProgress);
        let failed = rx.try_recv().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.detail.as_deref(), Some("jammed"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_driver_drops_route() {
        let sink = ReportSink::new();
        let (tx, rx) = mpsc::unbounded_channel();
        sink.register(JobId::from("j1"), tx);
        drop(rx);
        assert!(!sink.report(JobReport::new(JobId::from("j1"), JobStatus::InProgress)));
        assert_eq!(sink.pending(), 0);
    }
}

// ── Runtime ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod runtime {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use mh_core::{Carrier, ItemId, ItemKind, LocationId, LotId, Position, RobotId};
    use mh_events::{EventKind, MemoryPublisher};
    use mh_plan::{
        CassetteMove, ExecutionStrategy, FlowDirection, JobStatus, LotStatus, LotStep, Plan, ProcessParams,
        StepAction, WorkOrder,
    };
    use mh_store::{FacilityStore, MemoryStore};
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio_util::sync::CancellationToken;

    use super::helpers::{builder, config, inbound, layout, robot, tray_port};
    use crate::{
        DispatchMode, Dispatcher, FacilityBuilder, FacilityError, FacilityResult, JobOrder, JobReport,
        ReportSink,
    };

    #[tokio::test(start_paused = true)]
    async fn inbound_lot_completes_with_robot() {
        let facility = builder(Arc::new(MemoryStore::new())).build().unwrap();
        let handle = facility.start(CancellationToken::new()).await.unwrap();

        let lot = facility
            .submit_work_order(inbound("lot-1", &[("c1", "tool-1")], ExecutionStrategy::Sequential))
            .await
            .unwrap();
        assert_eq!(facility.wait_for_lot(&lot).await, Some(LotStatus::Completed));

        let tool = facility.location(&LocationId::from("tool-1")).unwrap();
        assert_eq!(tool.current_item, Some(ItemId::from("c1")));
        assert!(!facility.location(&LocationId::from("stock-1")).unwrap().is_occupied());
        assert!(!facility.location(&LocationId::from("r1")).unwrap().is_occupied());
        assert_eq!(facility.carrier_location(&ItemId::from("c1")).unwrap(), LocationId::from("tool-1"));
        assert_eq!(
            facility.robot_position(&RobotId::from("r1")).await.unwrap(),
            Position::planar(4.0, 0.0)
        );
        assert_eq!(facility.store().get_location(&LocationId::from("tool-1")).await.unwrap().unwrap(), tool);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn carrier_moves_reach_the_store() {
        let store = Arc::new(MemoryStore::new());
        let facility = builder(store.clone()).build().unwrap();
        let handle = facility.start(CancellationToken::new()).await.unwrap();

        let lot = facility
            .submit_work_order(inbound("lot-1", &[("c1", "tool-1")], ExecutionStrategy::Sequential))
            .await
            .unwrap();
        assert_eq!(facility.wait_for_lot(&lot).await, Some(LotStatus::Completed));

        let c1 = store.get_item(&ItemId::from("c1")).await.unwrap().unwrap();
        assert_eq!(c1.location, Some(LocationId::from("tool-1")));
        assert_eq!(c1, facility.transport().get(&ItemId::from("c1")).unwrap());
        let c2 = store.get_item(&ItemId::from("c2")).await.unwrap().unwrap();
        assert_eq!(c2.location, Some(LocationId::from("stock-2")));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn carrier_write_failure_fails_job() {
        let store = Arc::new(MemoryStore::new());
        let facility = builder(store.clone()).build().unwrap();
        let handle = facility.start(CancellationToken::new()).await.unwrap();

        store.inject_fault("item/c1");
        let lot = facility
            .submit_work_order(inbound("lot-1", &[("c1", "tool-1")], ExecutionStrategy::Sequential))
            .await
            .unwrap();
        assert_eq!(facility.wait_for_lot(&lot).await, Some(LotStatus::Completed));

        let group = facility.group(&facility.groups_of(&lot)[0]).await.unwrap();
        let job = group.plans[0].jobs().next().unwrap().clone();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(!facility.location(&LocationId::from("tool-1")).unwrap().is_occupied());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn trays_visit_the_tray_port_and_return() {
        let store = Arc::new(MemoryStore::new());
        let facility = FacilityBuilder::new(config(), store.clone(), layout().location(tray_port("tray-1", 4.5)))
            .robots(vec![robot("r1", 0.0)])
            .carriers(vec![
                Carrier::cassette("c1", "stock-1"),
                Carrier::stowed("t1", ItemKind::Tray, "c1"),
                Carrier::stowed("m1", ItemKind::Memory, "t1"),
            ])
            .build()
            .unwrap();
        let handle = facility.start(CancellationToken::new()).await.unwrap();
        let mut rx = facility.events().subscribe();

        let order = WorkOrder {
            lot:      LotId::from("lot-1"),
            priority: 0,
            steps:    vec![LotStep::new(
                1,
                FlowDirection::Inbound,
                vec![CassetteMove::new("c1", "tool-1").with_tray_port("tray-1")],
            )
            .with_params(ProcessParams { cover: false, start: true })],
        };
        let lot = facility.submit_work_order(order).await.unwrap();
        assert_eq!(facility.wait_for_lot(&lot).await, Some(LotStatus::Completed));

        let group = facility.group(&facility.groups_of(&lot)[0]).await.unwrap();
        let jobs: Vec<(StepAction, JobStatus)> =
            group.plans[0].jobs().map(|j| (j.action, j.status)).collect();
        assert_eq!(
            jobs,
            vec![
                (StepAction::CassetteLoad, JobStatus::Completed),
                (StepAction::TrayLoad, JobStatus::Completed),
                (StepAction::Start, JobStatus::Completed),
                (StepAction::TrayUnload, JobStatus::Completed),
            ]
        );

        let mut visited = false;
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    visited |= event.kind == EventKind::CarrierRelocated
                        && event.entity_id == "t1"
                        && event.new["location"] == "tray-1";
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        assert!(visited);

        // Back in its cassette: no own location, follows c1.
        assert_eq!(facility.transport().get(&ItemId::from("t1")).unwrap().location, None);
        assert_eq!(facility.carrier_location(&ItemId::from("t1")).unwrap(), LocationId::from("tool-1"));
        assert_eq!(facility.carrier_location(&ItemId::from("m1")).unwrap(), LocationId::from("tool-1"));
        assert!(!facility.location(&LocationId::from("tray-1")).unwrap().is_occupied());
        assert!(!facility.location(&LocationId::from("r1")).unwrap().is_occupied());
        assert_eq!(
            facility.location(&LocationId::from("tool-1")).unwrap().current_item,
            Some(ItemId::from("c1"))
        );

        assert_eq!(store.get_item(&ItemId::from("t1")).await.unwrap().unwrap().location, None);
        assert!(store.get_location(&LocationId::from("tray-1")).await.unwrap().unwrap().current_item.is_none());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_moves_share_robots() {
        let facility = builder(Arc::new(MemoryStore::new()))
            .robots(vec![robot("r2", 6.0)])
            .build()
            .unwrap();
        let handle = facility.start(CancellationToken::new()).await.unwrap();

        let lot = facility
            .submit_work_order(inbound(
                "lot-1",
                &[("c1", "tool-1"), ("c2", "tool-2")],
                ExecutionStrategy::Parallel,
            ))
            .await
            .unwrap();
        assert_eq!(facility.wait_for_lot(&lot).await, Some(LotStatus::Completed));
        assert_eq!(facility.carrier_location(&ItemId::from("c1")).unwrap(), LocationId::from("tool-1"));
        assert_eq!(facility.carrier_location(&ItemId::from("c2")).unwrap(), LocationId::from("tool-2"));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn lots_wait_for_start() {
        let facility = builder(Arc::new(MemoryStore::new())).build().unwrap();
        let lot = facility
            .submit_work_order(inbound("lot-1", &[("c1", "tool-1")], ExecutionStrategy::Sequential))
            .await
            .unwrap();
        assert_eq!(facility.lot_status(&lot), Some(LotStatus::Waiting));

        let handle = facility.start(CancellationToken::new()).await.unwrap();
        assert_eq!(facility.wait_for_lot(&lot).await, Some(LotStatus::Completed));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_destination_fails_job_only() {
        let facility = builder(Arc::new(MemoryStore::new()))
            .carriers(vec![Carrier::cassette("c9", "tool-1")])
            .build()
            .unwrap();
        let handle = facility.start(CancellationToken::new()).await.unwrap();

        let lot = facility
            .submit_work_order(inbound("lot-1", &[("c1", "tool-1")], ExecutionStrategy::Sequential))
            .await
            .unwrap();
        assert_eq!(facility.wait_for_lot(&lot).await, Some(LotStatus::Completed));

        let group = facility.group(&facility.groups_of(&lot)[0]).await.unwrap();
        let statuses: Vec<JobStatus> = group.plans.iter().flat_map(Plan::jobs).map(|j| j.status).collect();
        assert_eq!(statuses, vec![JobStatus::Failed]);

        // No compensation: the cassette stays on the robot.
        let deck = facility.location(&LocationId::from("r1")).unwrap();
        assert_eq!(deck.current_item, Some(ItemId::from("c1")));
        assert_eq!(facility.carrier_location(&ItemId::from("c1")).unwrap(), LocationId::from("r1"));
        let stored = facility.store().get_item(&ItemId::from("c1")).await.unwrap().unwrap();
        assert_eq!(stored.location, Some(LocationId::from("r1")));
        assert_eq!(
            facility.location(&LocationId::from("tool-1")).unwrap().current_item,
            Some(ItemId::from("c9"))
        );

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn publishing_dispatch_waits_for_reports() {
        let publisher = Arc::new(MemoryPublisher::new());
        let facility = builder(Arc::new(MemoryStore::new()))
            .publisher(publisher.clone())
            .dispatch(DispatchMode::Publish)
            .build()
            .unwrap();
        let handle = facility.start(CancellationToken::new()).await.unwrap();
        let lot = facility
            .submit_work_order(inbound("lot-1", &[("c1", "tool-1")], ExecutionStrategy::Sequential))
            .await
            .unwrap();

        let mut order = None;
        for _ in 0..50 {
            order = publisher
                .published()
                .into_iter()
                .find(|(topic, _)| topic == EventKind::DispatchCommand.topic())
                .map(|(_, payload)| serde_json::from_slice::<JobOrder>(&payload).unwrap());
            if order.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let order = order.expect("dispatch command published");
        assert_eq!(order.lot, lot);
        assert_eq!(order.item, Some(ItemId::from("c1")));
        assert_eq!(order.to, LocationId::from("tool-1"));

        assert!(facility.report_job(JobReport::new(order.job.clone(), JobStatus::InProgress)));
        assert!(facility.report_job(JobReport::new(order.job.clone(), JobStatus::Completed)));
        assert_eq!(facility.wait_for_lot(&lot).await, Some(LotStatus::Completed));
        assert!(!facility.report_job(JobReport::new(order.job.clone(), JobStatus::Completed)));
        assert_eq!(facility.job(&order.job).await.unwrap().status, JobStatus::Completed);

        handle.shutdown().await;
    }

    /// Refuses the first `refusals` orders, then completes each at once.
    struct Flaky {
        refusals: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Dispatcher for Flaky {
        async fn dispatch(&self, order: JobOrder, sink: ReportSink) -> FacilityResult<()> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) < self.refusals {
                return Err(FacilityError::JobAborted { job: order.job, reason: "busy".into() });
            }
            sink.report(JobReport::new(order.job, JobStatus::Completed));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refused_dispatch_is_retried() {
        let flaky = Arc::new(Flaky { refusals: 2, attempts: AtomicUsize::new(0) });
        let facility = builder(Arc::new(MemoryStore::new()))
            .dispatch(DispatchMode::Custom(flaky.clone()))
            .build()
            .unwrap();
        let handle = facility.start(CancellationToken::new()).await.unwrap();
        let lot = facility
            .submit_work_order(inbound("lot-1", &[("c1", "tool-1")], ExecutionStrategy::Sequential))
            .await
            .unwrap();

        assert_eq!(facility.wait_for_lot(&lot).await, Some(LotStatus::Completed));
        assert_eq!(flaky.attempts.load(Ordering::SeqCst), 3);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_rejected() {
        let facility = builder(Arc::new(MemoryStore::new())).build().unwrap();
        let handle = facility.start(CancellationToken::new()).await.unwrap();
        assert!(matches!(
            facility.start(CancellationToken::new()).await,
            Err(FacilityError::AlreadyRunning)
        ));
        handle.shutdown().await;

        // Stopped facilities can be started again.
        let handle = facility.start(CancellationToken::new()).await.unwrap();
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_waiting_drivers() {
        let facility = builder(Arc::new(MemoryStore::new()))
            .dispatch(DispatchMode::Publish)
            .build()
            .unwrap();
        let handle = facility.start(CancellationToken::new()).await.unwrap();
        let lot = facility
            .submit_work_order(inbound("lot-1", &[("c1", "tool-1")], ExecutionStrategy::Sequential))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        handle.shutdown().await;
        assert_eq!(facility.lot_status(&lot), Some(LotStatus::Processing));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_move_then_resume() {
        let facility = builder(Arc::new(MemoryStore::new())).build().unwrap();
        let handle = facility.start(CancellationToken::new()).await.unwrap();
        let lot = facility
            .submit_work_order(inbound(
                "lot-1",
                &[("c1", "tool-1"), ("c2", "tool-2")],
                ExecutionStrategy::Sequential,
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let group = facility.groups_of(&lot)[0].clone();
        let first = facility.group(&group).await.unwrap().plans[0].jobs().next().unwrap().id.clone();
        assert_eq!(facility.job(&first).await.unwrap().status, JobStatus::InProgress);

        handle.shutdown().await;
        assert_eq!(facility.job(&first).await.unwrap().status, JobStatus::Failed);
        assert_eq!(facility.lot_status(&lot), Some(LotStatus::Processing));
        assert_eq!(facility.carrier_location(&ItemId::from("c1")).unwrap(), LocationId::from("stock-1"));

        // The only robot is free again and the lot picks up where it stopped.
        let handle = facility.start(CancellationToken::new()).await.unwrap();
        assert_eq!(facility.wait_for_lot(&lot).await, Some(LotStatus::Completed));
        assert_eq!(facility.groups_of(&lot), vec![group]);
        assert_eq!(facility.carrier_location(&ItemId::from("c2")).unwrap(), LocationId::from("tool-2"));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn instructed_job_resumes_after_restart() {
        let publisher = Arc::new(MemoryPublisher::new());
        let facility = builder(Arc::new(MemoryStore::new()))
            .publisher(publisher.clone())
            .dispatch(DispatchMode::Publish)
            .build()
            .unwrap();
        let handle = facility.start(CancellationToken::new()).await.unwrap();
        let lot = facility
            .submit_work_order(inbound("lot-1", &[("c1", "tool-1")], ExecutionStrategy::Sequential))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let job = facility.group(&facility.groups_of(&lot)[0]).await.unwrap().plans[0]
            .jobs()
            .next()
            .unwrap()
            .id
            .clone();
        assert_eq!(facility.job(&job).await.unwrap().status, JobStatus::Instructed);

        handle.shutdown().await;
        assert!(!facility.report_job(JobReport::new(job.clone(), JobStatus::InProgress)));

        let handle = facility.start(CancellationToken::new()).await.unwrap();
        let mut routed = false;
        for _ in 0..50 {
            if facility.report_job(JobReport::new(job.clone(), JobStatus::InProgress)) {
                routed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(routed);
        assert!(facility.report_job(JobReport::new(job.clone(), JobStatus::Completed)));
        assert_eq!(facility.wait_for_lot(&lot).await, Some(LotStatus::Completed));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_lot_and_job() {
        let facility = builder(Arc::new(MemoryStore::new())).build().unwrap();
        assert_eq!(facility.wait_for_lot(&LotId::from("nope")).await, None);
        assert!(!facility.report_job(JobReport::new("nope".into(), JobStatus::Completed)));
    }
}
