//! `MotionSimulator` — outstanding moves, the tick, and the run loop.
//!
//! # Locking
//!
//! * `motions` (robot → outstanding move) is a `parking_lot::Mutex` held
//!   only for map operations, never across an await.  Replacing a move is a
//!   single insert, so the last `schedule_move` wins.
//! * Each robot has an async gate.  A tick for that robot and a direct
//!   `set_position` hold it across their store read and write, so the two
//!   never interleave on one robot.  Different robots tick concurrently.
//! * Every move carries a generation.  A tick that finishes a move removes
//!   the map entry only if the generation still matches, so a move scheduled
//!   while the tick was in flight survives.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mh_core::{FacilityConfig, Position, Robot, RobotId};
use mh_events::{EventKind, EventRelay};
use mh_store::FacilityStore;

use crate::{MotionError, MotionResult, MoveOutcome, MoveTicket, RobotMotionState, Step};

struct Motion {
    state:      RobotMotionState,
    generation: u64,
    notify:     Option<oneshot::Sender<MoveOutcome>>,
}

impl Motion {
    fn resolve(mut self, outcome: MoveOutcome) {
        if let Some(tx) = self.notify.take() {
            // The ticket holder may have stopped listening.
            let _ = tx.send(outcome);
        }
    }
}

/// Counts from one [`MotionSimulator::tick`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub advanced: usize,
    pub arrived:  usize,
    /// Robots whose store read or write failed; retried next tick.
    pub skipped:  usize,
}

enum RobotTick {
    Advanced,
    Arrived,
    Skipped,
    Idle,
}

pub struct MotionSimulator {
    store:      Arc<dyn FacilityStore>,
    events:     EventRelay,
    interval:   Duration,
    epsilon:    f64,
    motions:    Mutex<HashMap<RobotId, Motion>>,
    gates:      Mutex<HashMap<RobotId, Arc<AsyncMutex<()>>>>,
    generation: AtomicU64,
}

impl MotionSimulator {
    /// Build from validated configuration (`tick_interval_ms`, `arrival_epsilon`).
    pub fn new(store: Arc<dyn FacilityStore>, events: EventRelay, config: &FacilityConfig) -> MotionResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            events,
            interval:   config.tick_interval(),
            epsilon:    config.arrival_epsilon,
            motions:    Mutex::new(HashMap::new()),
            gates:      Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    // ── Commands ──────────────────────────────────────────────────────────

    /// Send `robot` toward `target` (x/y only) at `speed` units per second.
    ///
    /// Replaces any outstanding move for the robot; that move's ticket
    /// resolves `Superseded`.  The returned ticket resolves when this move
    /// arrives, is cancelled, or is itself superseded.
    pub async fn schedule_move(&self, robot: &RobotId, target: Position, speed: f64) -> MotionResult<MoveTicket> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(MotionError::InvalidSpeed(speed));
        }
        if !(target.x.is_finite() && target.y.is_finite() && target.x >= 0.0 && target.y >= 0.0) {
            return Err(MotionError::InvalidTarget(target));
        }
        if self.store.get_robot(robot).await?.is_none() {
            return Err(MotionError::UnknownRobot(robot.clone()));
        }

        let (tx, ticket) = MoveTicket::pair();
        let motion = Motion {
            state: RobotMotionState {
                robot:    robot.clone(),
                target_x: target.x,
                target_y: target.y,
                speed,
            },
            generation: self.generation.fetch_add(1, Ordering::Relaxed) + 1,
            notify: Some(tx),
        };
        let replaced = self.motions.lock().insert(robot.clone(), motion);
        if let Some(old) = replaced {
            debug!(robot = %robot, "outstanding move superseded");
            old.resolve(MoveOutcome::Superseded);
        }
        debug!(robot = %robot, x = target.x, y = target.y, speed, "move scheduled");
        Ok(ticket)
    }

    /// Drop the outstanding move for `robot`.  `false` if there was none.
    pub fn cancel_move(&self, robot: &RobotId) -> bool {
        let removed = self.motions.lock().remove(robot);
        match removed {
            Some(motion) => {
                debug!(robot = %robot, "move cancelled");
                motion.resolve(MoveOutcome::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Write a robot's position directly, serialized with its ticks.
    pub async fn set_position(&self, robot: &RobotId, position: Position) -> MotionResult<()> {
        if !position.is_finite() {
            return Err(MotionError::InvalidTarget(position));
        }
        let gate = self.gate(robot);
        let _held = gate.lock().await;
        let old = self
            .store
            .get_robot(robot)
            .await?
            .ok_or_else(|| MotionError::UnknownRobot(robot.clone()))?;
        self.store.put_robot(&Robot::new(robot.clone(), position)).await?;
        self.emit_position(robot, old.position, position);
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub async fn position(&self, robot: &RobotId) -> MotionResult<Position> {
        self.store
            .get_robot(robot)
            .await?
            .map(|r| r.position)
            .ok_or_else(|| MotionError::UnknownRobot(robot.clone()))
    }

    pub fn motion_state(&self, robot: &RobotId) -> Option<RobotMotionState> {
        self.motions.lock().get(robot).map(|m| m.state.clone())
    }

    pub fn active_moves(&self) -> usize {
        self.motions.lock().len()
    }

    // ── Ticking ───────────────────────────────────────────────────────────

    /// Apply one tick to every robot with an outstanding move, concurrently.
    pub async fn tick(&self) -> TickSummary {
        let robots: Vec<RobotId> = self.motions.lock().keys().cloned().collect();
        let dt = self.interval.as_secs_f64();
        let results = join_all(robots.iter().map(|r| self.tick_robot(r, dt))).await;

        let mut summary = TickSummary::default();
        for result in results {
            match result {
                RobotTick::Advanced => summary.advanced += 1,
                RobotTick::Arrived  => summary.arrived += 1,
                RobotTick::Skipped  => summary.skipped += 1,
                RobotTick::Idle     => {}
            }
        }
        summary
    }

    async fn tick_robot(&self, robot: &RobotId, dt: f64) -> RobotTick {
        let gate = self.gate(robot);
        let _held = gate.lock().await;

        let Some((state, generation)) = self
            .motions
            .lock()
            .get(robot)
            .map(|m| (m.state.clone(), m.generation))
        else {
            return RobotTick::Idle;
        };

        let record = match self.store.get_robot(robot).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(robot = %robot, "robot record missing; move skipped");
                return RobotTick::Skipped;
            }
            Err(e) => {
                warn!(robot = %robot, error = %e, "robot read failed; retrying next tick");
                return RobotTick::Skipped;
            }
        };

        let step = state.advance(record.position, dt, self.epsilon);
        let next = step.position();
        if let Err(e) = self.store.put_robot(&Robot::new(robot.clone(), next)).await {
            warn!(robot = %robot, error = %e, "robot write failed; retrying next tick");
            return RobotTick::Skipped;
        }
        self.emit_position(robot, record.position, next);

        match step {
            Step::Advanced(_) => RobotTick::Advanced,
            Step::Arrived(at) => {
                let finished = {
                    let mut motions = self.motions.lock();
                    if motions.get(robot).is_some_and(|m| m.generation == generation) {
                        motions.remove(robot)
                    } else {
                        None
                    }
                };
                if let Some(motion) = finished {
                    debug!(robot = %robot, position = %at, "robot arrived");
                    motion.resolve(MoveOutcome::Arrived(at));
                }
                RobotTick::Arrived
            }
        }
    }

    /// Tick every `interval` until `cancel` fires.
    ///
    /// Cancellation is observed between ticks only; a tick in progress
    /// always completes.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.interval.as_millis() as u64, "motion simulator running");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let summary = self.tick().await;
            if summary.skipped > 0 {
                debug!(skipped = summary.skipped, "motion tick skipped robots");
            }
        }
        info!("motion simulator stopped");
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn gate(&self, robot: &RobotId) -> Arc<AsyncMutex<()>> {
        self.gates.lock().entry(robot.clone()).or_default().clone()
    }

    fn emit_position(&self, robot: &RobotId, old: Position, new: Position) {
        self.events.emit(EventKind::RobotPositionChanged, robot.as_str(), json!(old), json!(new));
    }
}
