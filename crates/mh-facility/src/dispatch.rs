//! The dispatch collaborator: commands out, job reports back.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mh_core::{ItemId, JobId, LocationId, LotId, PlanGroupId};
use mh_events::{EventKind, Publisher};
use mh_plan::{Job, JobStatus, StepAction};

use crate::FacilityResult;

// ── Wire types ────────────────────────────────────────────────────────────────

/// One command sent to whatever executes jobs.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JobOrder {
    pub job:    JobId,
    pub lot:    LotId,
    pub group:  PlanGroupId,
    pub action: StepAction,
    pub from:   LocationId,
    pub to:     LocationId,
    pub item:   Option<ItemId>,
}

impl JobOrder {
    pub fn new(job: &Job, lot: &LotId, group: &PlanGroupId) -> Self {
        Self {
            job:    job.id.clone(),
            lot:    lot.clone(),
            group:  group.clone(),
            action: job.action,
            from:   job.from.clone(),
            to:     job.to.clone(),
            item:   job.item.clone(),
        }
    }

    #[inline]
    pub fn is_in_place(&self) -> bool {
        self.from == self.to
    }
}

/// A progress or completion notice for one job.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JobReport {
    pub job:    JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JobReport {
    pub fn new(job: JobId, status: JobStatus) -> Self {
        Self { job, status, detail: None }
    }

    pub fn failed(job: JobId, detail: impl Into<String>) -> Self {
        Self { job, status: JobStatus::Failed, detail: Some(detail.into()) }
    }
}

// ── ReportSink ────────────────────────────────────────────────────────────────

/// Routes job reports to the driver that owns the job.
///
/// Cheap to clone.  A driver registers each job before dispatching it; the
/// route is dropped once a terminal status passes through.
#[derive(Clone, Default)]
pub struct ReportSink {
    routes: Arc<Mutex<HashMap<JobId, mpsc::UnboundedSender<JobReport>>>>,
}

impl ReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, job: JobId, tx: mpsc::UnboundedSender<JobReport>) {
        self.routes.lock().insert(job, tx);
    }

    /// Deliver `report`.  `false` when no driver owns the job (unknown,
    /// already finished, or its driver stopped).
    pub fn report(&self, report: JobReport) -> bool {
        let mut routes = self.routes.lock();
        let terminal = report.status.is_terminal();
        let Some(tx) = routes.get(&report.job) else {
            debug!(job = %report.job, status = %report.status, "report for unrouted job dropped");
            return false;
        };
        let job = report.job.clone();
        let delivered = tx.send(report).is_ok();
        if terminal || !delivered {
            routes.remove(&job);
        }
        delivered
    }

    /// Number of jobs currently awaiting reports.
    pub fn pending(&self) -> usize {
        self.routes.lock().len()
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Sends job orders to an executor.
///
/// `Ok` means the order was accepted; the driver then marks the job
/// `Instructed`.  Progress and completion arrive later through `sink`.  An
/// `Err` leaves the job `Pending` and the driver retries it.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn dispatch(&self, order: JobOrder, sink: ReportSink) -> FacilityResult<()>;

    /// Bind in-process work to one run of the facility.  `cancel` fires
    /// when that run shuts down.
    fn attach(&self, _cancel: CancellationToken) {}

    /// Stop in-process work and wait for it.  Anything still running must
    /// have reported a terminal status before this returns.
    async fn drain(&self) {}
}

/// Publishes each order as a `dispatch.command` message and expects an
/// external executor to answer through [`Facility::report_job`][crate::Facility::report_job].
pub struct PublishingDispatcher {
    publisher: Arc<dyn Publisher>,
}

impl PublishingDispatcher {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl Dispatcher for PublishingDispatcher {
    async fn dispatch(&self, order: JobOrder, _sink: ReportSink) -> FacilityResult<()> {
        let payload = serde_json::to_vec(&order).map_err(mh_events::EventError::from)?;
        self.publisher
            .publish(EventKind::DispatchCommand.topic(), &payload)
            .await?;
        debug!(job = %order.job, action = %order.action, "job order published");
        Ok(())
    }
}
