//! Lot drivers: one task per lot, stepping its plan groups in order.
//!
//! ```text
//!  schedule_next ─► start_group ─► dispatch ─┐
//!        ▲                                   ▼
//!        │  group_completed        JobReport channel ─► report_job ─► dispatch
//!        └───────────────────────────────────┘
//! ```
//!
//! A driver is the only writer of its lot's groups, so each group applies
//! its reports one at a time.  Distinct lots run in independent tasks.
//!
//! A cancelled driver applies the reports already queued for it and
//! leaves the rest of its lot for the next run, which resumes the running
//! group before scheduling anything new.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mh_core::{LotId, PlanGroupId};
use mh_plan::{Advance, Job, JobStatus, PlanEngine, PlanGroupStatus};
use mh_transport::TransportDirectory;

use crate::{Dispatcher, JobOrder, JobReport, ReportSink};

/// Shared handles a driver needs, built once per lot.
pub(crate) struct DriverContext {
    pub plans:      Arc<PlanEngine>,
    pub transport:  Arc<TransportDirectory>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub sink:       ReportSink,
    pub retry:      Duration,
}

/// Why a driver returned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum DriverExit {
    Finished,
    Failed,
    Cancelled,
}

pub(crate) async fn drive_lot(ctx: DriverContext, lot: LotId, cancel: CancellationToken) -> DriverExit {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut resumed = resume(&ctx, &lot, &tx).await;
    loop {
        let (group, started) = match resumed.take() {
            Some(found) => found,
            None => {
                let group = match ctx.plans.schedule_next(&lot, &*ctx.transport) {
                    Ok(Some(group)) => group,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(lot = %lot, error = %e, "lot scheduling failed");
                        return DriverExit::Failed;
                    }
                };
                let started = ctx.plans.start_group(&group).await;
                (group, started)
            }
        };

        let mut waiting = started.dispatch;
        let mut done = started.group_completed;
        while !done {
            waiting = dispatch_all(&ctx, &lot, &group, waiting, &tx).await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let mut applied = 0usize;
                    while let Ok(report) = rx.try_recv() {
                        apply(&ctx, report).await;
                        applied += 1;
                    }
                    debug!(lot = %lot, group = %group, applied, "lot driver cancelled");
                    return DriverExit::Cancelled;
                }
                Some(report) = rx.recv() => {
                    if let Some(advance) = apply(&ctx, report).await {
                        waiting.extend(advance.dispatch);
                        done = advance.group_completed;
                    }
                }
                _ = tokio::time::sleep(ctx.retry), if !waiting.is_empty() => {
                    debug!(lot = %lot, jobs = waiting.len(), "retrying dispatch");
                }
            }
        }
        debug!(lot = %lot, group = %group, "plan group finished");
    }
    info!(lot = %lot, "lot driver finished");
    DriverExit::Finished
}

/// Pick up the group an earlier driver left running.
///
/// Jobs still out with an executor get their report routes back; pending
/// jobs are returned for dispatch.  `None` when no group is in flight.
async fn resume(
    ctx: &DriverContext,
    lot: &LotId,
    tx:  &mpsc::UnboundedSender<JobReport>,
) -> Option<(PlanGroupId, Advance)> {
    for group in ctx.plans.groups_of(lot) {
        match ctx.plans.group_status(&group).await {
            Some(PlanGroupStatus::Running) => {}
            Some(PlanGroupStatus::NotStarted) => {
                let started = ctx.plans.start_group(&group).await;
                return Some((group, started));
            }
            _ => continue,
        }
        let active = ctx.plans.active_jobs(&group).await;
        for job in &active {
            ctx.sink.register(job.id.clone(), tx.clone());
        }
        let ready = ctx.plans.ready_jobs(&group).await;
        info!(lot = %lot, group = %group, active = active.len(), ready = ready.len(), "resuming plan group");
        return Some((group, Advance { dispatch: ready, ..Advance::default() }));
    }
    None
}

/// Dispatch `jobs`; return the ones the dispatcher refused.
async fn dispatch_all(
    ctx:   &DriverContext,
    lot:   &LotId,
    group: &PlanGroupId,
    jobs:  Vec<Job>,
    tx:    &mpsc::UnboundedSender<JobReport>,
) -> Vec<Job> {
    let mut refused = Vec::new();
    for job in jobs {
        ctx.sink.register(job.id.clone(), tx.clone());
        let order = JobOrder::new(&job, lot, group);
        match ctx.dispatcher.dispatch(order, ctx.sink.clone()).await {
            Ok(()) => {
                if let Err(e) = ctx.plans.report_job(&job.id, JobStatus::Instructed).await {
                    warn!(job = %job.id, error = %e, "could not mark job instructed");
                }
            }
            Err(e) => {
                warn!(job = %job.id, error = %e, "dispatch failed; will retry");
                refused.push(job);
            }
        }
    }
    refused
}

async fn apply(ctx: &DriverContext, report: JobReport) -> Option<Advance> {
    if let Some(detail) = &report.detail {
        debug!(job = %report.job, status = %report.status, detail, "job report");
    }
    match ctx.plans.report_job(&report.job, report.status).await {
        Ok(advance) => Some(advance),
        Err(e) => {
            warn!(job = %report.job, status = %report.status, error = %e, "job report rejected");
            None
        }
    }
}
