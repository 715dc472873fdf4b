//! In-process dispatcher that carries jobs out with simulated robots.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mh_assign::AssignmentEngine;
use mh_core::{Carrier, ItemId, JobId, LocationId, RobotId};
use mh_motion::{MotionSimulator, MoveOutcome};
use mh_plan::JobStatus;
use mh_store::FacilityStore;
use mh_transport::TransportDirectory;

use crate::{Dispatcher, FacilityError, FacilityResult, JobOrder, JobReport, ReportSink};

/// Executes each order on the first free robot.
///
/// A movement job drives the robot to the source, picks the item onto the
/// robot's deck, drives to the destination, and places it there.  An
/// in-place job drives to the station and completes on arrival.  Any
/// refusal along the way fails the job where it stands; nothing is rolled
/// back.
///
/// Every carrier move is written to the store as it happens.  Workers are
/// tracked per job; [`Dispatcher::drain`] cancels them and waits until each
/// has returned its robot and reported `Failed`.
pub struct RobotDispatcher {
    inner:   Arc<Worker>,
    cancel:  Mutex<CancellationToken>,
    workers: Mutex<HashMap<JobId, JoinHandle<()>>>,
}

struct Worker {
    free:      Mutex<VecDeque<RobotId>>,
    permits:   Arc<Semaphore>,
    motion:    Arc<MotionSimulator>,
    assign:    Arc<AssignmentEngine>,
    transport: Arc<TransportDirectory>,
    store:     Arc<dyn FacilityStore>,
    speed:     f64,
}

impl RobotDispatcher {
    pub fn new(
        robots:    Vec<RobotId>,
        motion:    Arc<MotionSimulator>,
        assign:    Arc<AssignmentEngine>,
        transport: Arc<TransportDirectory>,
        store:     Arc<dyn FacilityStore>,
        speed:     f64,
    ) -> FacilityResult<Self> {
        if robots.is_empty() {
            return Err(FacilityError::NoRobots);
        }
        Ok(Self {
            inner: Arc::new(Worker {
                permits: Arc::new(Semaphore::new(robots.len())),
                free: Mutex::new(robots.into()),
                motion,
                assign,
                transport,
                store,
                speed,
            }),
            cancel:  Mutex::new(CancellationToken::new()),
            workers: Mutex::new(HashMap::new()),
        })
    }

    /// Robots not currently carrying out a job.
    pub fn idle_robots(&self) -> usize {
        self.inner.free.lock().len()
    }

    /// Jobs whose worker has not returned yet.
    pub fn active_jobs(&self) -> usize {
        let mut workers = self.workers.lock();
        workers.retain(|_, task| !task.is_finished());
        workers.len()
    }
}

#[async_trait]
impl Dispatcher for RobotDispatcher {
    async fn dispatch(&self, order: JobOrder, sink: ReportSink) -> FacilityResult<()> {
        let cancel = self.cancel.lock().clone();
        if cancel.is_cancelled() {
            return Err(abort(&order.job, "robot dispatcher is stopping".into()));
        }
        let worker = Arc::clone(&self.inner);
        let job = order.job.clone();
        let task = tokio::spawn(async move { worker.run(order, sink, cancel).await });

        let mut workers = self.workers.lock();
        workers.retain(|_, task| !task.is_finished());
        workers.insert(job, task);
        Ok(())
    }

    fn attach(&self, cancel: CancellationToken) {
        *self.cancel.lock() = cancel;
    }

    async fn drain(&self) {
        self.cancel.lock().cancel();
        let workers: Vec<(JobId, JoinHandle<()>)> = self.workers.lock().drain().collect();
        let (jobs, tasks): (Vec<_>, Vec<_>) = workers.into_iter().unzip();
        for (job, result) in jobs.iter().zip(join_all(tasks).await) {
            if let Err(e) = result {
                warn!(job = %job, error = %e, "robot worker ended abnormally");
            }
        }
        debug!(workers = jobs.len(), "robot dispatcher drained");
    }
}

impl Worker {
    async fn run(&self, order: JobOrder, sink: ReportSink, cancel: CancellationToken) {
        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        };
        let Some(permit) = acquired else {
            sink.report(JobReport::failed(order.job, "no robot before shutdown"));
            return;
        };
        let Some(robot) = self.free.lock().pop_front() else {
            sink.report(JobReport::failed(order.job, "no idle robot"));
            return;
        };

        debug!(job = %order.job, robot = %robot, action = %order.action, "job started");
        sink.report(JobReport::new(order.job.clone(), JobStatus::InProgress));

        let report = match self.execute(&robot, &order, &cancel).await {
            Ok(()) => {
                info!(job = %order.job, robot = %robot, "job completed");
                JobReport::new(order.job.clone(), JobStatus::Completed)
            }
            Err(e) => {
                warn!(job = %order.job, robot = %robot, error = %e, "job failed");
                JobReport::failed(order.job.clone(), e.to_string())
            }
        };

        self.free.lock().push_back(robot);
        drop(permit);
        sink.report(report);
    }

    async fn execute(&self, robot: &RobotId, order: &JobOrder, cancel: &CancellationToken) -> FacilityResult<()> {
        let item = match &order.item {
            Some(item) if !order.is_in_place() => item,
            _ => return self.drive(robot, &order.job, &order.to, cancel).await,
        };
        let deck = robot.deck();

        self.drive(robot, &order.job, &order.from, cancel).await?;
        self.pick(&order.job, &order.from, &deck, item).await?;
        self.drive(robot, &order.job, &order.to, cancel).await?;
        self.place(&order.job, &deck, &order.to, item).await
    }

    /// Move the item from `from` onto `deck`.  A stowed item (its carrier
    /// holds the location) goes straight onto the deck.
    async fn pick(&self, job: &JobId, from: &LocationId, deck: &LocationId, item: &ItemId) -> FacilityResult<()> {
        let holder = self.assign.topology().get_location(from)?.current_item;
        let picked = if holder.as_ref() == Some(item) {
            self.assign.transfer(from, deck, item).await?
        } else if self.transport.location_of(item)? == *from {
            self.assign.try_assign_item(deck, item.clone()).await?
        } else {
            return Err(abort(job, format!("{item} is not at {from}")));
        };
        if !picked {
            return Err(abort(job, format!("could not pick {item} from {from}")));
        }
        let record = self.transport.relocate(item, deck.clone())?;
        self.persist(&record).await
    }

    /// Put the item down at `to`.  When `to` holds the item's own carrier
    /// the item is stowed back into it instead of occupying the location.
    async fn place(&self, job: &JobId, deck: &LocationId, to: &LocationId, item: &ItemId) -> FacilityResult<()> {
        let holder = self.assign.topology().get_location(to)?.current_item;
        let parent = self.transport.parent(item)?;
        let record = if holder.is_some() && holder == parent {
            if !self.assign.try_clear_specific(deck, item).await? {
                return Err(abort(job, format!("{item} is not on {deck}")));
            }
            self.transport.stow(item)?
        } else {
            if !self.assign.transfer(deck, to, item).await? {
                return Err(abort(job, format!("{to} refused {item}")));
            }
            self.transport.relocate(item, to.clone())?
        };
        self.persist(&record).await
    }

    async fn persist(&self, record: &Carrier) -> FacilityResult<()> {
        if let Err(e) = self.store.put_item(record).await {
            warn!(item = %record.id, error = %e, "carrier move not persisted");
            return Err(e.into());
        }
        Ok(())
    }

    /// Drive to `to`.  Cancellation stops the robot where it stands and
    /// fails the job.
    async fn drive(&self, robot: &RobotId, job: &JobId, to: &LocationId, cancel: &CancellationToken) -> FacilityResult<()> {
        let target = self.assign.topology().get_location(to)?.position;
        let ticket = self.motion.schedule_move(robot, target, self.speed).await?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.motion.cancel_move(robot);
                Err(abort(job, format!("move to {to} cancelled by shutdown")))
            }
            outcome = ticket => match outcome {
                MoveOutcome::Arrived(_) => Ok(()),
                other => Err(abort(job, format!("move to {to} ended {other:?}"))),
            },
        }
    }
}

fn abort(job: &JobId, reason: String) -> FacilityError {
    FacilityError::JobAborted { job: job.clone(), reason }
}
