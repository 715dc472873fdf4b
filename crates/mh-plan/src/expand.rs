//! Work-order expansion: lot step → plan group → plans → steps → jobs.
//!
//! # Step templates
//!
//! ```text
//! inbound : CassetteLoad, [OpenSetCover], [Start], [CloseSetCover]
//! outbound: [OpenSetCover], CassetteUnload, [CloseSetCover]
//! ```
//!
//! Bracketed steps appear only when the matching [`ProcessParams`] flag is
//! set (`cover` for the set-cover pair, `start` for `Start`).  Inbound
//! station actions run at the cassette's destination; outbound ones run
//! where the cassette sits when the step is scheduled.
//!
//! An inbound move with a tray port replaces `Start` with a tour of every
//! tray stowed in the cassette, placed before `CloseSetCover`:
//!
//! ```text
//! per tray: TrayLoad (station → port), [Start at port], TrayUnload (port → station)
//! ```
//!
//! # Jobs
//!
//! A movement step yields one job per carrier, from wherever that carrier
//! is at that point of the plan to the step's station.  A station step
//! yields exactly one in-place job (`from == to == station`).

use std::collections::HashMap;

use mh_core::{IdSequence, ItemId, JobId, LocationId, LotId, PlanGroupId, PlanId};
use mh_transport::TransportDirectory;

use crate::{
    CassetteMove, FlowDirection, Job, JobStatus, LotStep, Plan, PlanError, PlanGroup,
    PlanGroupStatus, PlanResult, PlanStatus, PlanStep, ProcessParams, StepAction,
};

// ── Carrier lookup ────────────────────────────────────────────────────────────

/// Where a carrier currently is.  Consulted once, at expansion time.
pub trait CarrierLookup {
    fn location_of(&self, item: &ItemId) -> Option<LocationId>;

    /// Direct children stowed inside `item`, in order.  They travel with it.
    fn contents(&self, _item: &ItemId) -> Vec<ItemId> {
        Vec::new()
    }
}

impl CarrierLookup for TransportDirectory {
    fn location_of(&self, item: &ItemId) -> Option<LocationId> {
        TransportDirectory::location_of(self, item).ok()
    }

    fn contents(&self, item: &ItemId) -> Vec<ItemId> {
        self.children(item)
            .unwrap_or_default()
            .into_iter()
            .filter(|child| self.get(child).is_ok_and(|c| c.location.is_none()))
            .collect()
    }
}

impl CarrierLookup for HashMap<ItemId, LocationId> {
    fn location_of(&self, item: &ItemId) -> Option<LocationId> {
        self.get(item).cloned()
    }
}

// ── Id allocation ─────────────────────────────────────────────────────────────

/// Id sequences for everything expansion creates.
#[derive(Debug, Default)]
pub struct PlanIds {
    groups: IdSequence,
    plans:  IdSequence,
    jobs:   IdSequence,
}

impl PlanIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self) -> PlanGroupId {
        PlanGroupId::new(self.groups.next_with("group"))
    }

    pub fn plan(&self) -> PlanId {
        PlanId::new(self.plans.next_with("plan"))
    }

    pub fn job(&self) -> JobId {
        JobId::new(self.jobs.next_with("job"))
    }
}

// ── Templates ─────────────────────────────────────────────────────────────────

/// Ordered actions of one plan.
pub fn step_template(flow: FlowDirection, params: ProcessParams) -> Vec<StepAction> {
    let mut actions = Vec::with_capacity(4);
    match flow {
        FlowDirection::Inbound => {
            actions.push(StepAction::CassetteLoad);
            if params.cover {
                actions.push(StepAction::OpenSetCover);
            }
            if params.start {
                actions.push(StepAction::Start);
            }
            if params.cover {
                actions.push(StepAction::CloseSetCover);
            }
        }
        FlowDirection::Outbound => {
            if params.cover {
                actions.push(StepAction::OpenSetCover);
            }
            actions.push(StepAction::CassetteUnload);
            if params.cover {
                actions.push(StepAction::CloseSetCover);
            }
        }
    }
    actions
}

// ── Expansion ─────────────────────────────────────────────────────────────────

/// Tracks where each carrier will be as a plan's steps are laid out.
struct Tracker<'a> {
    lookup:  &'a dyn CarrierLookup,
    overlay: HashMap<ItemId, LocationId>,
}

impl Tracker<'_> {
    fn position(&self, item: &ItemId) -> PlanResult<LocationId> {
        self.overlay
            .get(item)
            .cloned()
            .or_else(|| self.lookup.location_of(item))
            .ok_or_else(|| PlanError::UnknownCarrier(item.clone()))
    }

    /// Record that `item` and everything stowed in it will be at `to`.
    fn moved(&mut self, item: &ItemId, to: &LocationId) {
        let mut pending = vec![item.clone()];
        while let Some(next) = pending.pop() {
            pending.extend(self.lookup.contents(&next));
            self.overlay.insert(next, to.clone());
        }
    }
}

/// Build one step and its jobs.
///
/// Movement actions take every carrier in `carriers` to `station`; station
/// actions yield a single in-place job at `station`.
pub fn expand_step(
    ids:      &PlanIds,
    plan:     &PlanId,
    step_no:  u32,
    action:   StepAction,
    carriers: Vec<ItemId>,
    station:  LocationId,
    lookup:   &dyn CarrierLookup,
) -> PlanResult<PlanStep> {
    let mut tracker = Tracker { lookup, overlay: HashMap::new() };
    build_step(&mut tracker, ids, plan, step_no, action, carriers, station)
}

fn build_step(
    tracker:  &mut Tracker<'_>,
    ids:      &PlanIds,
    plan:     &PlanId,
    step_no:  u32,
    action:   StepAction,
    carriers: Vec<ItemId>,
    station:  LocationId,
) -> PlanResult<PlanStep> {
    let jobs = if action.is_movement() {
        let mut jobs = Vec::with_capacity(carriers.len());
        for item in &carriers {
            let from = tracker.position(item)?;
            tracker.moved(item, &station);
            jobs.push(new_job(ids, plan, step_no, from, station.clone(), Some(item.clone()), action));
        }
        jobs
    } else {
        vec![new_job(ids, plan, step_no, station.clone(), station.clone(), None, action)]
    };
    Ok(PlanStep { step_no, action, carriers, station, jobs })
}

fn new_job(
    ids:     &PlanIds,
    plan:    &PlanId,
    step_no: u32,
    from:    LocationId,
    to:      LocationId,
    item:    Option<ItemId>,
    action:  StepAction,
) -> Job {
    Job {
        id: ids.job(),
        plan: plan.clone(),
        step_no,
        from,
        to,
        item,
        action,
        status: JobStatus::Pending,
    }
}

/// One plan for one cassette move.
pub fn build_plan(
    ids:    &PlanIds,
    mv:     &CassetteMove,
    flow:   FlowDirection,
    params: ProcessParams,
    lookup: &dyn CarrierLookup,
) -> PlanResult<Plan> {
    let id = ids.plan();
    let mut tracker = Tracker { lookup, overlay: HashMap::new() };
    let origin = tracker.position(&mv.cassette)?;
    let station = match flow {
        FlowDirection::Inbound  => mv.destination.clone(),
        FlowDirection::Outbound => origin,
    };

    let mut layout: Vec<(StepAction, Vec<ItemId>, LocationId)> = step_template(flow, params)
        .into_iter()
        .map(|action| match action {
            StepAction::CassetteLoad | StepAction::CassetteUnload => {
                (action, vec![mv.cassette.clone()], mv.destination.clone())
            }
            _ => (action, Vec::new(), station.clone()),
        })
        .collect();

    if let (Some(port), FlowDirection::Inbound) = (&mv.tray_port, flow) {
        layout.retain(|(action, ..)| *action != StepAction::Start);
        let at = layout
            .iter()
            .position(|(action, ..)| *action == StepAction::CloseSetCover)
            .unwrap_or(layout.len());
        let tour: Vec<_> = lookup
            .contents(&mv.cassette)
            .into_iter()
            .flat_map(|tray| tray_tour(tray, port, &station, params.start))
            .collect();
        let tail = layout.split_off(at);
        layout.extend(tour);
        layout.extend(tail);
    }

    let mut steps = Vec::with_capacity(layout.len());
    for (i, (action, carriers, at)) in layout.into_iter().enumerate() {
        steps.push(build_step(&mut tracker, ids, &id, i as u32 + 1, action, carriers, at)?);
    }

    Ok(Plan {
        id,
        cassette: mv.cassette.clone(),
        steps,
        current_step: 0,
        status: PlanStatus::Pending,
    })
}

/// Take `tray` out to `port`, optionally start it there, and stow it back
/// into its cassette at `station`.
fn tray_tour(
    tray:    ItemId,
    port:    &LocationId,
    station: &LocationId,
    start:   bool,
) -> Vec<(StepAction, Vec<ItemId>, LocationId)> {
    let mut tour = vec![(StepAction::TrayLoad, vec![tray.clone()], port.clone())];
    if start {
        tour.push((StepAction::Start, Vec::new(), port.clone()));
    }
    tour.push((StepAction::TrayUnload, vec![tray], station.clone()));
    tour
}

/// One plan group for one lot step: a plan per cassette move, in order.
pub fn build_group(
    ids:    &PlanIds,
    lot:    &LotId,
    step:   &LotStep,
    lookup: &dyn CarrierLookup,
) -> PlanResult<PlanGroup> {
    if step.moves.is_empty() {
        return Err(PlanError::InvalidWorkOrder(format!("lot {lot} step {} moves no cassettes", step.step_no)));
    }
    let plans = step
        .moves
        .iter()
        .map(|mv| build_plan(ids, mv, step.flow, step.params, lookup))
        .collect::<PlanResult<Vec<_>>>()?;

    Ok(PlanGroup {
        id: ids.group(),
        lot: lot.clone(),
        step_no: step.step_no,
        flow: step.flow,
        plans,
        strategy: step.strategy,
        status: PlanGroupStatus::NotStarted,
    })
}
