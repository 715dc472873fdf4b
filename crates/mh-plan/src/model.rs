//! The plan hierarchy: work order → lot → plan group → plan → plan step → job.
//!
//! All records are plain data.  Only [`crate::PlanEngine`] mutates them after
//! expansion, and it owns each plan group behind that group's gate.

use std::fmt;

use mh_core::{ItemId, JobId, LocationId, LotId, PlanGroupId, PlanId};

use crate::ExecutionStrategy;

/// Declares a `snake_case` status enum with `as_str` and `Display`.
macro_rules! status_enum {
    ($(#[$attr:meta])* $name:ident { $($(#[$vattr:meta])* $variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vattr])* $variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ── Statuses ──────────────────────────────────────────────────────────────────

status_enum! {
    /// `Waiting → Assigned → Processing → Completed`; `Error` when a step
    /// cannot be expanded.
    LotStatus {
        Waiting    => "waiting",
        Assigned   => "assigned",
        Processing => "processing",
        Completed  => "completed",
        Error      => "error",
    }
}

status_enum! {
    PlanGroupStatus {
        NotStarted => "not_started",
        Running    => "running",
        Completed  => "completed",
    }
}

status_enum! {
    PlanStatus {
        Pending   => "pending",
        Running   => "running",
        Completed => "completed",
    }
}

status_enum! {
    JobStatus {
        Pending    => "pending",
        Instructed => "instructed",
        InProgress => "in_progress",
        Completed  => "completed",
        Failed     => "failed",
    }
}

impl JobStatus {
    /// `Pending → Instructed → InProgress → Completed | Failed`.
    /// `Instructed` may also finish directly when no progress report arrives.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Instructed)
                | (Pending, Failed)
                | (Instructed, InProgress)
                | (Instructed, Completed)
                | (Instructed, Failed)
                | (InProgress, Completed)
                | (InProgress, Failed)
        )
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

status_enum! {
    FlowDirection {
        /// Cassettes travel to a processing station.
        Inbound  => "inbound",
        /// Cassettes leave a processing station.
        Outbound => "outbound",
    }
}

status_enum! {
    StepAction {
        CassetteLoad       => "cassette_load",
        CassetteUnload     => "cassette_unload",
        TrayLoad           => "tray_load",
        TrayUnload         => "tray_unload",
        MemoryPickAndPlace => "memory_pick_and_place",
        OpenSetCover       => "open_set_cover",
        CloseSetCover      => "close_set_cover",
        Start              => "start",
    }
}

impl StepAction {
    /// `true` for actions that carry items; the rest act on a station in place.
    pub fn is_movement(self) -> bool {
        matches!(
            self,
            StepAction::CassetteLoad
                | StepAction::CassetteUnload
                | StepAction::TrayLoad
                | StepAction::TrayUnload
                | StepAction::MemoryPickAndPlace
        )
    }
}

// ── Work order and lot ────────────────────────────────────────────────────────

/// Processing switches that shape a plan's step template.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProcessParams {
    /// Open the station's set cover before and close it after the work.
    pub cover: bool,
    /// Start processing once the cassette is loaded (inbound only).
    pub start: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CassetteMove {
    pub cassette:    ItemId,
    pub destination: LocationId,
    /// Inbound only: tray port each stowed tray visits once the cassette
    /// is loaded.
    #[serde(default)]
    pub tray_port:   Option<LocationId>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LotStep {
    pub step_no:  u32,
    pub flow:     FlowDirection,
    pub moves:    Vec<CassetteMove>,
    #[serde(default)]
    pub params:   ProcessParams,
    #[serde(default)]
    pub strategy: ExecutionStrategy,
    /// Set once the step has been scheduled.
    #[serde(default)]
    pub group:     Option<PlanGroupId>,
    /// Set once that group has completed.
    #[serde(default)]
    pub completed: bool,
}

impl LotStep {
    /// A sequential step with default parameters.
    pub fn new(step_no: u32, flow: FlowDirection, moves: Vec<CassetteMove>) -> Self {
        Self {
            step_no,
            flow,
            moves,
            params: ProcessParams::default(),
            strategy: ExecutionStrategy::default(),
            group: None,
            completed: false,
        }
    }

    pub fn with_params(mut self, params: ProcessParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

impl CassetteMove {
    pub fn new(cassette: impl Into<ItemId>, destination: impl Into<LocationId>) -> Self {
        Self { cassette: cassette.into(), destination: destination.into(), tray_port: None }
    }

    pub fn with_tray_port(mut self, port: impl Into<LocationId>) -> Self {
        self.tray_port = Some(port.into());
        self
    }
}

/// What a client submits: a lot and its ordered steps.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorkOrder {
    pub lot:      LotId,
    #[serde(default)]
    pub priority: i32,
    pub steps:    Vec<LotStep>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Lot {
    pub id:       LotId,
    pub status:   LotStatus,
    pub priority: i32,
    pub steps:    Vec<LotStep>,
}

impl Lot {
    pub fn step(&self, step_no: u32) -> Option<&LotStep> {
        self.steps.iter().find(|s| s.step_no == step_no)
    }

    /// The first step that has not been scheduled yet.
    pub fn next_unscheduled(&self) -> Option<&LotStep> {
        self.steps.iter().find(|s| s.group.is_none())
    }

    pub fn all_steps_completed(&self) -> bool {
        self.steps.iter().all(|s| s.completed)
    }
}

// ── Plan group, plan, step, job ───────────────────────────────────────────────

/// One unit of robot work.  `from == to` for station actions.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Job {
    pub id:      JobId,
    pub plan:    PlanId,
    pub step_no: u32,
    pub from:    LocationId,
    pub to:      LocationId,
    pub item:    Option<ItemId>,
    pub action:  StepAction,
    pub status:  JobStatus,
}

impl Job {
    #[inline]
    pub fn is_in_place(&self) -> bool {
        self.from == self.to
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlanStep {
    pub step_no:  u32,
    pub action:   StepAction,
    pub carriers: Vec<ItemId>,
    pub station:  LocationId,
    pub jobs:     Vec<Job>,
}

impl PlanStep {
    /// Every job has reached Completed or Failed.
    pub fn is_finished(&self) -> bool {
        self.jobs.iter().all(|j| j.status.is_terminal())
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Plan {
    pub id:           PlanId,
    pub cassette:     ItemId,
    pub steps:        Vec<PlanStep>,
    /// Index into `steps` of the step being worked on.
    pub current_step: usize,
    pub status:       PlanStatus,
}

impl Plan {
    pub fn current(&self) -> Option<&PlanStep> {
        self.steps.get(self.current_step)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> + '_ {
        self.steps.iter().flat_map(|s| s.jobs.iter())
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlanGroup {
    pub id:       PlanGroupId,
    pub lot:      LotId,
    pub step_no:  u32,
    pub flow:     FlowDirection,
    pub plans:    Vec<Plan>,
    pub strategy: ExecutionStrategy,
    pub status:   PlanGroupStatus,
}

impl PlanGroup {
    pub fn plan(&self, id: &PlanId) -> Option<&Plan> {
        self.plans.iter().find(|p| &p.id == id)
    }

    pub fn plan_ids(&self) -> Vec<PlanId> {
        self.plans.iter().map(|p| p.id.clone()).collect()
    }

    pub fn all_plans_completed(&self) -> bool {
        self.plans.iter().all(|p| p.status == PlanStatus::Completed)
    }
}
