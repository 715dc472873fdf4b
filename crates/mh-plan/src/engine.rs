//! `PlanEngine` — registry of lots and plan groups, and the state machine
//! that advances them as jobs report back.
//!
//! # Locking
//!
//! Each plan group lives behind its own `tokio::sync::Mutex`, the group's
//! gate.  Job reports for one group are processed one at a time; reports
//! for different groups never contend.  Lots sit in a `parking_lot` map
//! that is only touched for short, non-awaiting updates (possibly while a
//! group gate is held, never the other way round).
//!
//! # Driving a group
//!
//! ```text
//! schedule_step ─► start_group ─► Advance{dispatch} ─► report_job ─► Advance ─► …
//! ```
//!
//! Every call that moves the hierarchy forward returns an [`Advance`]
//! listing the jobs that just became ready.  The caller dispatches them and
//! feeds the outcomes back through [`PlanEngine::report_job`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use mh_core::{JobId, LotId, PlanGroupId, PlanId};
use mh_events::{EventKind, EventRelay, json_value};

use crate::expand::{CarrierLookup, PlanIds, build_group};
use crate::{
    Job, JobStatus, Lot, LotStatus, Plan, PlanError, PlanGroup, PlanGroupStatus, PlanResult,
    PlanStatus, WorkOrder,
};

/// Follow-up work produced by one engine call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Advance {
    /// Jobs that became ready and must be dispatched.
    pub dispatch:        Vec<Job>,
    pub started:         Vec<PlanId>,
    pub completed:       Vec<PlanId>,
    pub group_completed: bool,
}

pub struct PlanEngine {
    lots:   RwLock<HashMap<LotId, Lot>>,
    groups: RwLock<HashMap<PlanGroupId, Arc<Mutex<PlanGroup>>>>,
    jobs:   RwLock<HashMap<JobId, PlanGroupId>>,
    ids:    PlanIds,
    events: EventRelay,
}

impl PlanEngine {
    pub fn new(events: EventRelay) -> Self {
        Self {
            lots:   RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            jobs:   RwLock::new(HashMap::new()),
            ids:    PlanIds::new(),
            events,
        }
    }

    // ── Lots ──────────────────────────────────────────────────────────────

    /// Accept a work order as a new `Waiting` lot.
    pub fn accept_work_order(&self, order: WorkOrder) -> PlanResult<Lot> {
        validate_order(&order)?;
        let lot = Lot {
            id:       order.lot,
            status:   LotStatus::Waiting,
            priority: order.priority,
            steps:    order.steps,
        };
        {
            let mut lots = self.lots.write();
            if lots.contains_key(&lot.id) {
                return Err(PlanError::DuplicateLot(lot.id));
            }
            lots.insert(lot.id.clone(), lot.clone());
        }
        info!(lot = %lot.id, steps = lot.steps.len(), "work order accepted");
        self.events.emit(EventKind::LotCreated, lot.id.as_str(), Value::Null, json_value(&lot));
        Ok(lot)
    }

    pub fn lot(&self, id: &LotId) -> Option<Lot> {
        self.lots.read().get(id).cloned()
    }

    /// All lots, highest priority first, then by id.
    pub fn lots(&self) -> Vec<Lot> {
        let mut all: Vec<Lot> = self.lots.read().values().cloned().collect();
        all.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Groups scheduled so far for `lot`, in step order.
    pub fn groups_of(&self, lot: &LotId) -> Vec<PlanGroupId> {
        self.lots
            .read()
            .get(lot)
            .map(|l| l.steps.iter().filter_map(|s| s.group.clone()).collect())
            .unwrap_or_default()
    }

    /// Force a lot into `Error` (e.g. after an unrecoverable dispatch fault).
    pub fn fail_lot(&self, lot: &LotId, reason: &str) {
        warn!(lot = %lot, reason, "lot failed");
        self.set_lot_status(lot, LotStatus::Error);
    }

    // ── Scheduling ────────────────────────────────────────────────────────

    /// Expand one lot step into a plan group.
    ///
    /// Carrier positions are read from `lookup` now; jobs carry fixed
    /// from/to locations afterwards.  If expansion fails the lot moves to
    /// `Error` and nothing is registered.
    pub fn schedule_step(&self, lot_id: &LotId, step_no: u32, lookup: &dyn CarrierLookup) -> PlanResult<PlanGroupId> {
        let step = {
            let lots = self.lots.read();
            let lot = lots.get(lot_id).ok_or_else(|| PlanError::UnknownLot(lot_id.clone()))?;
            let step = lot
                .step(step_no)
                .ok_or_else(|| PlanError::UnknownStep { lot: lot_id.clone(), step_no })?;
            if let Some(group) = &step.group {
                return Err(PlanError::AlreadyScheduled { lot: lot_id.clone(), step_no, group: group.clone() });
            }
            step.clone()
        };

        let group = match build_group(&self.ids, lot_id, &step, lookup) {
            Ok(group) => group,
            Err(e) => {
                warn!(lot = %lot_id, step_no, error = %e, "lot step expansion failed");
                self.set_lot_status(lot_id, LotStatus::Error);
                return Err(e);
            }
        };

        let group_id = group.id.clone();
        {
            let mut jobs = self.jobs.write();
            for job in group.plans.iter().flat_map(Plan::jobs) {
                jobs.insert(job.id.clone(), group_id.clone());
            }
        }
        debug!(
            lot = %lot_id,
            step_no,
            group = %group_id,
            plans = group.plans.len(),
            strategy = group.strategy.as_str(),
            "plan group scheduled"
        );
        self.events.emit(
            EventKind::PlanGroupStatusChanged,
            group_id.as_str(),
            Value::Null,
            json!({ "status": group.status, "lot": lot_id, "step_no": step_no }),
        );
        self.groups.write().insert(group_id.clone(), Arc::new(Mutex::new(group)));

        {
            let mut lots = self.lots.write();
            if let Some(lot) = lots.get_mut(lot_id)
                && let Some(s) = lot.steps.iter_mut().find(|s| s.step_no == step_no)
            {
                s.group = Some(group_id.clone());
            }
        }
        self.transition_lot(lot_id, LotStatus::Waiting, LotStatus::Assigned);
        Ok(group_id)
    }

    /// Schedule the first unscheduled step of `lot`, if any.
    pub fn schedule_next(&self, lot: &LotId, lookup: &dyn CarrierLookup) -> PlanResult<Option<PlanGroupId>> {
        let next = self
            .lot(lot)
            .ok_or_else(|| PlanError::UnknownLot(lot.clone()))?
            .next_unscheduled()
            .map(|s| s.step_no);
        match next {
            Some(step_no) => self.schedule_step(lot, step_no, lookup).map(Some),
            None => Ok(None),
        }
    }

    // ── Group state machine ───────────────────────────────────────────────

    /// `NotStarted → Running`, then release the strategy's initial plans.
    ///
    /// Unknown, running, or completed groups yield an empty `Advance`.
    pub async fn start_group(&self, id: &PlanGroupId) -> Advance {
        let mut out = Advance::default();
        let Some(cell) = self.group_cell(id) else {
            return out;
        };
        let mut group = cell.lock().await;
        if group.status != PlanGroupStatus::NotStarted {
            return out;
        }
        self.set_group_status(&mut group, PlanGroupStatus::Running);
        self.transition_lot(&group.lot, LotStatus::Assigned, LotStatus::Processing);
        self.advance_locked(&mut group, None, &mut out);
        out
    }

    /// Ask the group's strategy which plans to start and start them.
    ///
    /// `completed` names a plan that just finished; it is marked `Completed`
    /// first.  The group completes once all its plans are complete and the
    /// strategy has nothing further.  Unknown or completed groups yield an
    /// empty list.
    pub async fn next_plans_to_start(&self, id: &PlanGroupId, completed: Option<&PlanId>) -> Vec<PlanId> {
        let mut out = Advance::default();
        let Some(cell) = self.group_cell(id) else {
            return Vec::new();
        };
        let mut group = cell.lock().await;
        match group.status {
            PlanGroupStatus::Completed => return Vec::new(),
            PlanGroupStatus::NotStarted => {
                self.set_group_status(&mut group, PlanGroupStatus::Running);
                self.transition_lot(&group.lot, LotStatus::Assigned, LotStatus::Processing);
            }
            PlanGroupStatus::Running => {}
        }
        if let Some(plan) = completed
            && let Some(i) = group.plans.iter().position(|p| &p.id == plan)
        {
            self.complete_plan(&mut group, i, &mut out);
        }
        self.advance_locked(&mut group, completed, &mut out);
        out.started
    }

    /// Apply a job status report.
    ///
    /// Re-reporting the current status is a no-op.  When the job finishes
    /// its step, the plan moves on; when it finishes its plan, the group's
    /// strategy is consulted.  A `Failed` job counts as finished and does not
    /// fail its plan.
    pub async fn report_job(&self, job_id: &JobId, status: JobStatus) -> PlanResult<Advance> {
        let mut out = Advance::default();
        let group_id = self
            .jobs
            .read()
            .get(job_id)
            .cloned()
            .ok_or_else(|| PlanError::UnknownJob(job_id.clone()))?;
        let cell = self.group_cell(&group_id).ok_or_else(|| PlanError::UnknownJob(job_id.clone()))?;
        let mut group = cell.lock().await;

        let (pi, si, ji) = locate(&group, job_id).ok_or_else(|| PlanError::UnknownJob(job_id.clone()))?;
        let job = &mut group.plans[pi].steps[si].jobs[ji];
        let old = job.status;
        if old == status {
            return Ok(out);
        }
        if !old.can_transition_to(status) {
            return Err(PlanError::IllegalTransition { job: job_id.clone(), from: old, to: status });
        }
        job.status = status;
        self.events.emit(
            EventKind::JobStatusChanged,
            job_id.as_str(),
            json!({ "status": old }),
            json!({ "status": status, "plan": job.plan, "action": job.action }),
        );
        if status == JobStatus::Failed {
            warn!(job = %job_id, "job failed");
        }

        if !status.is_terminal() {
            return Ok(out);
        }
        let plan = &mut group.plans[pi];
        if plan.current_step != si || !plan.steps[si].is_finished() {
            return Ok(out);
        }

        plan.current_step += 1;
        if let Some(next) = plan.steps.get(plan.current_step) {
            out.dispatch.extend(next.jobs.iter().filter(|j| j.status == JobStatus::Pending).cloned());
            return Ok(out);
        }

        let plan_id = plan.id.clone();
        self.complete_plan(&mut group, pi, &mut out);
        self.advance_locked(&mut group, Some(&plan_id), &mut out);
        Ok(out)
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub async fn group(&self, id: &PlanGroupId) -> Option<PlanGroup> {
        let cell = self.group_cell(id)?;
        let group = cell.lock().await;
        Some(group.clone())
    }

    pub async fn group_status(&self, id: &PlanGroupId) -> Option<PlanGroupStatus> {
        let cell = self.group_cell(id)?;
        let status = cell.lock().await.status;
        Some(status)
    }

    pub async fn plan(&self, group: &PlanGroupId, plan: &PlanId) -> Option<Plan> {
        let cell = self.group_cell(group)?;
        let group = cell.lock().await;
        group.plan(plan).cloned()
    }

    pub async fn job(&self, id: &JobId) -> Option<Job> {
        let group_id = self.jobs.read().get(id).cloned()?;
        let cell = self.group_cell(&group_id)?;
        let group = cell.lock().await;
        let (pi, si, ji) = locate(&group, id)?;
        Some(group.plans[pi].steps[si].jobs[ji].clone())
    }

    /// Pending jobs in the current step of every running plan of a group.
    pub async fn ready_jobs(&self, id: &PlanGroupId) -> Vec<Job> {
        self.current_jobs(id, |status| status == JobStatus::Pending).await
    }

    /// Jobs handed to an executor (`Instructed` or `InProgress`) that have
    /// not reported a terminal status yet.
    pub async fn active_jobs(&self, id: &PlanGroupId) -> Vec<Job> {
        self.current_jobs(id, |status| matches!(status, JobStatus::Instructed | JobStatus::InProgress))
            .await
    }

    async fn current_jobs(&self, id: &PlanGroupId, keep: impl Fn(JobStatus) -> bool) -> Vec<Job> {
        let Some(cell) = self.group_cell(id) else {
            return Vec::new();
        };
        let group = cell.lock().await;
        group
            .plans
            .iter()
            .filter(|p| p.status == PlanStatus::Running)
            .filter_map(Plan::current)
            .flat_map(|s| s.jobs.iter())
            .filter(|j| keep(j.status))
            .cloned()
            .collect()
    }

    pub fn events(&self) -> &EventRelay {
        &self.events
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn group_cell(&self, id: &PlanGroupId) -> Option<Arc<Mutex<PlanGroup>>> {
        self.groups.read().get(id).cloned()
    }

    /// Start whatever the strategy releases; complete the group when all
    /// plans are done and nothing more is released.
    fn advance_locked(&self, group: &mut PlanGroup, completed: Option<&PlanId>, out: &mut Advance) {
        if group.status != PlanGroupStatus::Running {
            return;
        }
        let next = group.strategy.next_plans_to_start(group, completed);
        for plan_id in &next {
            let Some(plan) = group.plans.iter_mut().find(|p| &p.id == plan_id) else {
                continue;
            };
            plan.status = PlanStatus::Running;
            self.events.emit(
                EventKind::PlanAssigned,
                plan_id.as_str(),
                json!({ "status": PlanStatus::Pending }),
                json!({ "status": PlanStatus::Running, "group": group.id, "cassette": plan.cassette }),
            );
            if let Some(step) = plan.current() {
                out.dispatch.extend(step.jobs.iter().filter(|j| j.status == JobStatus::Pending).cloned());
            }
            debug!(group = %group.id, plan = %plan_id, "plan started");
        }
        out.started.extend(next.iter().cloned());

        if next.is_empty() && group.all_plans_completed() {
            self.set_group_status(group, PlanGroupStatus::Completed);
            out.group_completed = true;
            self.finish_lot_step(&group.lot, group.step_no);
        }
    }

    fn complete_plan(&self, group: &mut PlanGroup, index: usize, out: &mut Advance) {
        let plan = &mut group.plans[index];
        if plan.status == PlanStatus::Completed {
            return;
        }
        let old = plan.status;
        plan.status = PlanStatus::Completed;
        plan.current_step = plan.steps.len();
        self.events.emit(
            EventKind::PlanStatusChanged,
            plan.id.as_str(),
            json!({ "status": old }),
            json!({ "status": PlanStatus::Completed, "group": group.id }),
        );
        debug!(group = %group.id, plan = %plan.id, "plan completed");
        out.completed.push(plan.id.clone());
    }

    fn set_group_status(&self, group: &mut PlanGroup, status: PlanGroupStatus) {
        let old = group.status;
        group.status = status;
        info!(group = %group.id, lot = %group.lot, from = %old, to = %status, "plan group status");
        self.events.emit(
            EventKind::PlanGroupStatusChanged,
            group.id.as_str(),
            json!({ "status": old }),
            json!({ "status": status, "lot": group.lot, "step_no": group.step_no }),
        );
    }

    fn finish_lot_step(&self, lot_id: &LotId, step_no: u32) {
        let done = {
            let mut lots = self.lots.write();
            let Some(lot) = lots.get_mut(lot_id) else {
                return;
            };
            if let Some(step) = lot.steps.iter_mut().find(|s| s.step_no == step_no) {
                step.completed = true;
            }
            lot.all_steps_completed()
        };
        if done {
            self.transition_lot(lot_id, LotStatus::Processing, LotStatus::Completed);
        }
    }

    /// Move a lot from `from` to `to`; no-op if it is in any other status.
    fn transition_lot(&self, id: &LotId, from: LotStatus, to: LotStatus) {
        let changed = {
            let mut lots = self.lots.write();
            match lots.get_mut(id) {
                Some(lot) if lot.status == from => {
                    lot.status = to;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.emit_lot_status(id, from, to);
        }
    }

    fn set_lot_status(&self, id: &LotId, to: LotStatus) {
        let old = {
            let mut lots = self.lots.write();
            match lots.get_mut(id) {
                Some(lot) if lot.status != to => Some(std::mem::replace(&mut lot.status, to)),
                _ => None,
            }
        };
        if let Some(old) = old {
            self.emit_lot_status(id, old, to);
        }
    }

    fn emit_lot_status(&self, id: &LotId, old: LotStatus, new: LotStatus) {
        info!(lot = %id, from = %old, to = %new, "lot status");
        self.events.emit(
            EventKind::LotStatusChanged,
            id.as_str(),
            json!({ "status": old }),
            json!({ "status": new }),
        );
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn locate(group: &PlanGroup, job: &JobId) -> Option<(usize, usize, usize)> {
    for (pi, plan) in group.plans.iter().enumerate() {
        for (si, step) in plan.steps.iter().enumerate() {
            if let Some(ji) = step.jobs.iter().position(|j| &j.id == job) {
                return Some((pi, si, ji));
            }
        }
    }
    None
}

fn validate_order(order: &WorkOrder) -> PlanResult<()> {
    if order.steps.is_empty() {
        return Err(PlanError::InvalidWorkOrder(format!("lot {} has no steps", order.lot)));
    }
    let mut seen = std::collections::HashSet::new();
    for step in &order.steps {
        if !seen.insert(step.step_no) {
            return Err(PlanError::InvalidWorkOrder(format!(
                "lot {} repeats step {}",
                order.lot, step.step_no
            )));
        }
        if step.moves.is_empty() {
            return Err(PlanError::InvalidWorkOrder(format!(
                "lot {} step {} moves no cassettes",
                order.lot, step.step_no
            )));
        }
        if step.group.is_some() || step.completed {
            return Err(PlanError::InvalidWorkOrder(format!(
                "lot {} step {} is already scheduled",
                order.lot, step.step_no
            )));
        }
    }
    Ok(())
}
