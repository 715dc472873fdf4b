//! Unit tests for mh-motion.

#[cfg(test)]
mod helpers {
    use std::sync::Arc;

    use mh_core::{FacilityConfig, Position, Robot};
    use mh_events::EventRelay;
    use mh_store::{FacilityStore, MemoryStore};

    use crate::MotionSimulator;

    pub struct Fixture {
        pub sim:    Arc<MotionSimulator>,
        pub store:  Arc<MemoryStore>,
        pub events: EventRelay,
    }

    /// 100 ms ticks, robots `r1` at the origin and `r2` at (5, 5, 2).
    pub async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store.put_robot(&Robot::new("r1", Position::planar(0.0, 0.0))).await.unwrap();
        store.put_robot(&Robot::new("r2", Position::new(5.0, 5.0, 2.0))).await.unwrap();
        let events = EventRelay::new(1024);
        let sim = MotionSimulator::new(store.clone(), events.clone(), &FacilityConfig::default()).unwrap();
        Fixture { sim: Arc::new(sim), store, events }
    }
}

// ── Step rule ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod step_rule {
    use mh_core::{Position, RobotId};

    use crate::{RobotMotionState, Step};

    fn toward(x: f64, y: f64, speed: f64) -> RobotMotionState {
        RobotMotionState { robot: RobotId::from("r"), target_x: x, target_y: y, speed }
    }

    #[test]
    fn advances_along_unit_vector() {
        let step = toward(3.0, 4.0, 1.0).advance(Position::planar(0.0, 0.0), 1.0, 1e-4);
        match step {
            Step::Advanced(p) => {
                assert!((p.x - 0.6).abs() < 1e-12);
                assert!((p.y - 0.8).abs() < 1e-12);
            }
            other => panic!("expected advance, got {other:?}"),
        }
    }

    #[test]
    fn snaps_within_epsilon() {
        let step = toward(1.0, 0.0, 1.0).advance(Position::planar(0.00005, 0.0), 1.0, 1e-4);
        assert_eq!(step, Step::Arrived(Position::planar(1.0, 0.0)));
    }

    #[test]
    fn keeps_height() {
        let step = toward(10.0, 0.0, 1.0).advance(Position::new(0.0, 0.0, 3.5), 0.1, 1e-4);
        assert_eq!(step.position().z, 3.5);
    }

    #[test]
    fn already_there_arrives() {
        let step = toward(2.0, 2.0, 1.0).advance(Position::planar(2.0, 2.0), 0.1, 1e-4);
        assert!(matches!(step, Step::Arrived(_)));
    }
}

// ── Simulator ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod simulator {
    use mh_core::{FacilityConfig, Position, RobotId};
    use mh_events::EventRelay;
    use mh_store::{FacilityStore, MemoryStore};

    use super::helpers::fixture;
    use crate::{MotionError, MotionSimulator, MoveOutcome};

    fn r(s: &str) -> RobotId {
        RobotId::from(s)
    }

    #[tokio::test]
    async fn ten_units_at_five_per_second_takes_twenty_ticks() {
        let f = fixture().await;
        let ticket = f.sim.schedule_move(&r("r1"), Position::planar(10.0, 0.0), 5.0).await.unwrap();

        for tick in 1..=19 {
            let summary = f.sim.tick().await;
            assert_eq!(summary.advanced, 1, "tick {tick}");
            assert!(f.sim.motion_state(&r("r1")).is_some(), "entry gone early at tick {tick}");
        }
        let p = f.sim.position(&r("r1")).await.unwrap();
        assert!((p.x - 9.5).abs() < 1e-9);

        let summary = f.sim.tick().await;
        assert_eq!(summary.arrived, 1);
        assert_eq!(f.sim.position(&r("r1")).await.unwrap(), Position::planar(10.0, 0.0));
        assert!(f.sim.motion_state(&r("r1")).is_none());
        assert_eq!(ticket.await, MoveOutcome::Arrived(Position::planar(10.0, 0.0)));
    }

    #[tokio::test]
    async fn height_is_preserved() {
        let f = fixture().await;
        let ticket = f.sim.schedule_move(&r("r2"), Position::planar(5.0, 5.3), 1.0).await.unwrap();
        for _ in 0..5 {
            f.sim.tick().await;
        }
        assert_eq!(ticket.await, MoveOutcome::Arrived(Position::new(5.0, 5.3, 2.0)));
    }

    #[tokio::test]
    async fn new_move_supersedes_old() {
        let f = fixture().await;
        let first = f.sim.schedule_move(&r("r1"), Position::planar(10.0, 0.0), 5.0).await.unwrap();
        f.sim.tick().await;
        let second = f.sim.schedule_move(&r("r1"), Position::planar(0.5, 1.0), 10.0).await.unwrap();
        assert_eq!(first.await, MoveOutcome::Superseded);
        assert_eq!(f.sim.active_moves(), 1);

        for _ in 0..3 {
            f.sim.tick().await;
        }
        assert_eq!(second.await, MoveOutcome::Arrived(Position::planar(0.5, 1.0)));
    }

    #[tokio::test]
    async fn cancel_stops_the_robot() {
        let f = fixture().await;
        let ticket = f.sim.schedule_move(&r("r1"), Position::planar(10.0, 0.0), 5.0).await.unwrap();
        f.sim.tick().await;
        assert!(f.sim.cancel_move(&r("r1")));
        assert!(!f.sim.cancel_move(&r("r1")));
        assert_eq!(ticket.await, MoveOutcome::Cancelled);

        let before = f.sim.position(&r("r1")).await.unwrap();
        assert_eq!(f.sim.tick().await, crate::TickSummary::default());
        assert_eq!(f.sim.position(&r("r1")).await.unwrap(), before);
    }

    #[tokio::test]
    async fn bad_arguments_rejected() {
        let f = fixture().await;
        for speed in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                f.sim.schedule_move(&r("r1"), Position::planar(1.0, 1.0), speed).await,
                Err(MotionError::InvalidSpeed(_))
            ));
        }
        assert!(matches!(
            f.sim.schedule_move(&r("r1"), Position::planar(-1.0, 0.0), 1.0).await,
            Err(MotionError::InvalidTarget(_))
        ));
        assert!(matches!(
            f.sim.schedule_move(&r("ghost"), Position::planar(1.0, 1.0), 1.0).await,
            Err(MotionError::UnknownRobot(_))
        ));
        assert_eq!(f.sim.active_moves(), 0);
    }

    #[test]
    fn zero_tick_interval_rejected() {
        let config = FacilityConfig { tick_interval_ms: 0, ..FacilityConfig::default() };
        let store = std::sync::Arc::new(MemoryStore::new());
        assert!(matches!(
            MotionSimulator::new(store, EventRelay::new(4), &config),
            Err(MotionError::Config(_))
        ));
    }

    #[tokio::test]
    async fn store_fault_skips_only_that_robot() {
        let f = fixture().await;
        f.sim.schedule_move(&r("r1"), Position::planar(10.0, 0.0), 5.0).await.unwrap();
        f.sim.schedule_move(&r("r2"), Position::planar(10.0, 5.0), 5.0).await.unwrap();
        f.store.inject_fault("robot/r1");

        let summary = f.sim.tick().await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.advanced, 1);
        assert!(f.sim.motion_state(&r("r1")).is_some());

        f.store.clear_fault("robot/r1");
        f.sim.tick().await;
        let p = f.store.get_robot(&r("r1")).await.unwrap().unwrap().position;
        assert!((p.x - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn every_tick_emits_one_event_per_robot() {
        let f = fixture().await;
        f.sim.schedule_move(&r("r1"), Position::planar(1.0, 0.0), 5.0).await.unwrap();
        f.sim.schedule_move(&r("r2"), Position::planar(6.0, 5.0), 5.0).await.unwrap();
        f.sim.tick().await;
        assert_eq!(f.events.emitted(), 2);
    }

    #[tokio::test]
    async fn set_position_writes_through() {
        let f = fixture().await;
        f.sim.set_position(&r("r1"), Position::new(3.0, 4.0, 0.0)).await.unwrap();
        assert_eq!(f.sim.position(&r("r1")).await.unwrap(), Position::new(3.0, 4.0, 0.0));
        assert_eq!(f.events.emitted(), 1);
        assert!(matches!(
            f.sim.set_position(&r("ghost"), Position::default()).await,
            Err(MotionError::UnknownRobot(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_delivers_arrival_and_stops() {
        let f = fixture().await;
        let cancel = tokio_util::sync::CancellationToken::new();
        let handle = {
            let sim = f.sim.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { sim.run(cancel).await })
        };

        let ticket = f.sim.schedule_move(&r("r1"), Position::planar(1.0, 0.0), 5.0).await.unwrap();
        assert_eq!(ticket.await, MoveOutcome::Arrived(Position::planar(1.0, 0.0)));

        cancel.cancel();
        handle.await.unwrap();
    }
}
