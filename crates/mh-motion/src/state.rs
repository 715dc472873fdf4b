//! Per-robot motion state and the step rule.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use mh_core::{Position, RobotId};

/// An outstanding move.  Exists only until the robot arrives, the move is
/// cancelled, or a newer move replaces it.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RobotMotionState {
    pub robot:    RobotId,
    pub target_x: f64,
    pub target_y: f64,
    /// Facility units per second.
    pub speed:    f64,
}

/// Result of applying one tick to one robot.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Step {
    /// Still travelling; the new position.
    Advanced(Position),
    /// On target; the move is complete.
    Arrived(Position),
}

impl Step {
    pub fn position(self) -> Position {
        match self {
            Step::Advanced(p) | Step::Arrived(p) => p,
        }
    }
}

impl RobotMotionState {
    /// Apply one tick of `dt_secs` to a robot at `current`.
    ///
    /// Snaps to the target when `distance ≤ step + epsilon`; otherwise moves
    /// `step` along the unit vector and clamps x/y at zero.  `z` is kept.
    pub fn advance(&self, current: Position, dt_secs: f64, epsilon: f64) -> Step {
        let dx = self.target_x - current.x;
        let dy = self.target_y - current.y;
        let distance = dx.hypot(dy);
        let step = self.speed * dt_secs;

        if distance <= step + epsilon {
            return Step::Arrived(current.with_xy(self.target_x, self.target_y));
        }
        let x = (current.x + dx / distance * step).max(0.0);
        let y = (current.y + dy / distance * step).max(0.0);
        Step::Advanced(current.with_xy(x, y))
    }
}

// ── Move tickets ──────────────────────────────────────────────────────────────

/// How a scheduled move ended.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MoveOutcome {
    Arrived(Position),
    /// A newer move for the same robot replaced this one.
    Superseded,
    Cancelled,
}

/// Resolves when its move ends.  Dropping the ticket does not cancel the move.
#[derive(Debug)]
pub struct MoveTicket {
    rx: oneshot::Receiver<MoveOutcome>,
}

impl MoveTicket {
    pub(crate) fn pair() -> (oneshot::Sender<MoveOutcome>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl Future for MoveTicket {
    type Output = MoveOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the simulator went away mid-move.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(MoveOutcome::Cancelled))
    }
}
