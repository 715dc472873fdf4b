//! The `Facility` registry and its runtime handle.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mh_assign::AssignmentEngine;
use mh_core::{
    FacilityConfig, ItemId, JobId, Location, LocationId, LotId, PlanGroupId, Position, Robot, RobotId,
};
use mh_events::{EventRelay, Publisher};
use mh_motion::MotionSimulator;
use mh_plan::{Job, Lot, LotStatus, PlanEngine, PlanGroup, WorkOrder};
use mh_store::FacilityStore;
use mh_topology::{LocationGraph, TopologyStore};
use mh_transport::TransportDirectory;

use crate::driver::{DriverContext, DriverExit, drive_lot};
use crate::{Dispatcher, FacilityError, FacilityResult, JobReport, ReportSink};

/// Every shared component of one facility, wired together.
///
/// Create via [`FacilityBuilder`][crate::FacilityBuilder].  Nothing here is
/// global: two facilities in one process share no state.
pub struct Facility {
    config:     FacilityConfig,
    store:      Arc<dyn FacilityStore>,
    events:     EventRelay,
    topology:   Arc<TopologyStore>,
    transport:  Arc<TransportDirectory>,
    assign:     Arc<AssignmentEngine>,
    plans:      Arc<PlanEngine>,
    motion:     Arc<MotionSimulator>,
    dispatcher: Arc<dyn Dispatcher>,
    publisher:  Arc<dyn Publisher>,
    robots:     Vec<Robot>,
    sink:       ReportSink,
    initialized: OnceCell<()>,
    runtime:    Mutex<Runtime>,
    /// Serializes graph edits so each persisted snapshot matches the graph
    /// it is committed to.
    graph_gate: AsyncMutex<()>,
}

/// Driver bookkeeping.  `cancel` is set while the facility is running;
/// lots submitted before that wait in `queued`.
#[derive(Default)]
struct Runtime {
    cancel:  Option<CancellationToken>,
    queued:  Vec<LotId>,
    drivers: Vec<JoinHandle<DriverExit>>,
}

pub(crate) struct FacilityParts {
    pub config:     FacilityConfig,
    pub store:      Arc<dyn FacilityStore>,
    pub events:     EventRelay,
    pub topology:   Arc<TopologyStore>,
    pub transport:  Arc<TransportDirectory>,
    pub assign:     Arc<AssignmentEngine>,
    pub plans:      Arc<PlanEngine>,
    pub motion:     Arc<MotionSimulator>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub publisher:  Arc<dyn Publisher>,
    pub robots:     Vec<Robot>,
}

impl Facility {
    pub(crate) fn from_parts(parts: FacilityParts) -> Self {
        Self {
            config:      parts.config,
            store:       parts.store,
            events:      parts.events,
            topology:    parts.topology,
            transport:   parts.transport,
            assign:      parts.assign,
            plans:       parts.plans,
            motion:      parts.motion,
            dispatcher:  parts.dispatcher,
            publisher:   parts.publisher,
            robots:      parts.robots,
            sink:        ReportSink::new(),
            initialized: OnceCell::new(),
            runtime:     Mutex::new(Runtime::default()),
            graph_gate:  AsyncMutex::new(()),
        }
    }

    // ── Initialization ────────────────────────────────────────────────────

    /// Seed the persistence collaborator with the provisioned records.
    ///
    /// Runs once; concurrent callers all await the same in-flight seed.  A
    /// failed seed is not cached, so the next call tries again.  Robots the
    /// store already knows keep their stored position.
    pub async fn ensure_initialized(&self) -> FacilityResult<()> {
        self.initialized.get_or_try_init(|| self.seed_store()).await?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    async fn seed_store(&self) -> FacilityResult<()> {
        let locations = self.topology.locations();
        for location in &locations {
            self.store.put_location(location).await?;
        }
        let carriers = self.transport.carriers();
        for carrier in &carriers {
            self.store.put_item(carrier).await?;
        }
        let mut resumed = 0usize;
        for robot in &self.robots {
            if self.store.get_robot(&robot.id).await?.is_some() {
                resumed += 1;
            } else {
                self.store.put_robot(robot).await?;
            }
        }
        self.store.put_graph(&self.topology.graph_snapshot()).await?;
        info!(
            locations = locations.len(),
            carriers = carriers.len(),
            robots = self.robots.len(),
            resumed,
            "facility store seeded"
        );
        Ok(())
    }

    // ── Graph edits ───────────────────────────────────────────────────────

    /// Register a routing node and persist the resulting graph.
    ///
    /// The snapshot is written before the live graph changes, so a store
    /// failure leaves both as they were.  `false` for a known node.
    pub async fn add_node(&self, id: LocationId) -> FacilityResult<bool> {
        self.ensure_initialized().await?;
        let _gate = self.graph_gate.lock().await;
        let mut next = self.topology.with_graph(LocationGraph::clone);
        if !next.add_node(id.clone()) {
            return Ok(false);
        }
        self.persist_graph(&next).await?;
        Ok(self.topology.add_node(id))
    }

    /// Add a routing edge and persist the resulting graph.  Validation runs
    /// first; a rejected edge touches neither the store nor the graph.
    pub async fn add_edge(
        &self,
        from:          LocationId,
        to:            LocationId,
        cost:          f64,
        bidirectional: bool,
    ) -> FacilityResult<()> {
        self.ensure_initialized().await?;
        let _gate = self.graph_gate.lock().await;
        let mut next = self.topology.with_graph(LocationGraph::clone);
        next.add_edge(from.clone(), to.clone(), cost, bidirectional)?;
        self.persist_graph(&next).await?;
        self.topology.add_edge(from, to, cost, bidirectional)?;
        Ok(())
    }

    async fn persist_graph(&self, graph: &LocationGraph) -> FacilityResult<()> {
        if let Err(e) = self.store.put_graph(&graph.snapshot()).await {
            warn!(error = %e, "graph edit not persisted");
            return Err(e.into());
        }
        Ok(())
    }

    // ── Runtime ───────────────────────────────────────────────────────────

    /// Start the background loops: the event publisher pump, the motion
    /// tick loop, and one driver per submitted lot.
    ///
    /// Every loop stops between iterations once `cancel` fires.  Lots left
    /// unfinished by an earlier run resume their running plan group.
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> FacilityResult<FacilityHandle> {
        self.ensure_initialized().await?;

        let queued = {
            let mut runtime = self.runtime.lock();
            if runtime.cancel.is_some() {
                return Err(FacilityError::AlreadyRunning);
            }
            runtime.cancel = Some(cancel.clone());
            std::mem::take(&mut runtime.queued)
        };

        self.dispatcher.attach(cancel.child_token());
        let mut tasks = Vec::with_capacity(2);
        tasks.push(
            self.events
                .spawn_publisher(Arc::clone(&self.publisher), cancel.child_token()),
        );
        let motion = Arc::clone(&self.motion);
        let token = cancel.child_token();
        tasks.push(tokio::spawn(async move { motion.run(token).await }));

        info!(robots = self.robots.len(), queued = queued.len(), "facility started");
        {
            let mut runtime = self.runtime.lock();
            for lot in queued {
                let handle = self.spawn_driver(lot, &cancel);
                runtime.drivers.push(handle);
            }
        }

        Ok(FacilityHandle { cancel, tasks, facility: Arc::clone(self) })
    }

    fn spawn_driver(&self, lot: LotId, cancel: &CancellationToken) -> JoinHandle<DriverExit> {
        let ctx = DriverContext {
            plans:      Arc::clone(&self.plans),
            transport:  Arc::clone(&self.transport),
            dispatcher: Arc::clone(&self.dispatcher),
            sink:       self.sink.clone(),
            retry:      self.config.dispatch_retry(),
        };
        debug!(lot = %lot, "lot driver spawned");
        tokio::spawn(drive_lot(ctx, lot, cancel.child_token()))
    }

    // ── Work intake ───────────────────────────────────────────────────────

    /// Register a work order as a new lot and, if the facility is running,
    /// start driving it.  Otherwise the lot waits for [`Facility::start`].
    pub async fn submit_work_order(&self, order: WorkOrder) -> FacilityResult<LotId> {
        self.ensure_initialized().await?;
        let lot = self.plans.accept_work_order(order)?;

        let mut runtime = self.runtime.lock();
        match runtime.cancel.clone() {
            Some(cancel) => {
                let handle = self.spawn_driver(lot.id.clone(), &cancel);
                runtime.drivers.push(handle);
            }
            None => runtime.queued.push(lot.id.clone()),
        }
        Ok(lot.id)
    }

    /// Hand a job report from an external executor to the driver owning
    /// the job.  `false` when no driver is waiting on it.
    pub fn report_job(&self, report: JobReport) -> bool {
        self.sink.report(report)
    }

    /// Wait until `lot` reaches `Completed` or `Error`.  `None` for an
    /// unknown lot.
    pub async fn wait_for_lot(&self, lot: &LotId) -> Option<LotStatus> {
        let mut rx = self.events.subscribe();
        loop {
            match self.plans.lot(lot).map(|l| l.status) {
                None => return None,
                Some(status @ (LotStatus::Completed | LotStatus::Error)) => return Some(status),
                Some(_) => {}
            }
            match rx.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return self.plans.lot(lot).map(|l| l.status),
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn lot(&self, id: &LotId) -> Option<Lot> {
        self.plans.lot(id)
    }

    pub fn lot_status(&self, id: &LotId) -> Option<LotStatus> {
        self.plans.lot(id).map(|l| l.status)
    }

    /// Lots ordered by descending priority.
    pub fn lots(&self) -> Vec<Lot> {
        self.plans.lots()
    }

    pub fn groups_of(&self, lot: &LotId) -> Vec<PlanGroupId> {
        self.plans.groups_of(lot)
    }

    pub async fn group(&self, id: &PlanGroupId) -> Option<PlanGroup> {
        self.plans.group(id).await
    }

    pub async fn job(&self, id: &JobId) -> Option<Job> {
        self.plans.job(id).await
    }

    pub fn location(&self, id: &LocationId) -> FacilityResult<Location> {
        Ok(self.topology.get_location(id)?)
    }

    pub fn carrier_location(&self, item: &ItemId) -> FacilityResult<LocationId> {
        Ok(self.transport.location_of(item)?)
    }

    pub async fn robot_position(&self, robot: &RobotId) -> FacilityResult<Position> {
        Ok(self.motion.position(robot).await?)
    }

    pub fn robot_ids(&self) -> Vec<RobotId> {
        self.robots.iter().map(|r| r.id.clone()).collect()
    }

    // ── Components ────────────────────────────────────────────────────────

    pub fn config(&self) -> &FacilityConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn FacilityStore> {
        &self.store
    }

    pub fn events(&self) -> &EventRelay {
        &self.events
    }

    pub fn topology(&self) -> &Arc<TopologyStore> {
        &self.topology
    }

    pub fn transport(&self) -> &Arc<TransportDirectory> {
        &self.transport
    }

    pub fn assignment(&self) -> &Arc<AssignmentEngine> {
        &self.assign
    }

    pub fn plans(&self) -> &Arc<PlanEngine> {
        &self.plans
    }

    pub fn motion(&self) -> &Arc<MotionSimulator> {
        &self.motion
    }

    pub fn report_sink(&self) -> &ReportSink {
        &self.sink
    }
}

// ── FacilityHandle ────────────────────────────────────────────────────────────

/// Returned by [`Facility::start`]; owns the background tasks.
pub struct FacilityHandle {
    cancel:   CancellationToken,
    tasks:    Vec<JoinHandle<()>>,
    facility: Arc<Facility>,
}

impl FacilityHandle {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop the facility and wait for every loop.
    ///
    /// In-process dispatch work is drained first, while the lot drivers can
    /// still record its `Failed` reports; then every loop is cancelled.
    /// Unfinished lots, and lots submitted meanwhile, queue until the
    /// facility is started again.
    pub async fn shutdown(self) {
        let drivers = {
            let mut runtime = self.facility.runtime.lock();
            runtime.cancel = None;
            std::mem::take(&mut runtime.drivers)
        };
        self.facility.dispatcher.drain().await;
        self.cancel.cancel();
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "facility task ended abnormally");
            }
        }
        for result in join_all(drivers).await {
            match result {
                Ok(exit) => debug!(?exit, "lot driver stopped"),
                Err(e) => warn!(error = %e, "lot driver ended abnormally"),
            }
        }

        let unfinished: Vec<LotId> = self
            .facility
            .plans
            .lots()
            .into_iter()
            .filter(|lot| !matches!(lot.status, LotStatus::Completed | LotStatus::Error))
            .map(|lot| lot.id)
            .collect();
        let requeued = unfinished.len();
        self.facility.runtime.lock().queued = unfinished;
        info!(requeued, "facility stopped");
    }
}
