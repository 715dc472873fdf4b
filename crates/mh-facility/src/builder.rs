//! Fluent builder for [`Facility`].

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use mh_assign::AssignmentEngine;
use mh_core::{Carrier, FacilityConfig, Location, LocationKind, Robot};
use mh_events::{EventRelay, NoopPublisher, Publisher};
use mh_motion::MotionSimulator;
use mh_plan::PlanEngine;
use mh_store::FacilityStore;
use mh_topology::{FacilityLayout, TopologyError};
use mh_transport::TransportDirectory;

use crate::facility::FacilityParts;
use crate::{Dispatcher, Facility, FacilityError, FacilityResult, PublishingDispatcher, RobotDispatcher};

/// Which executor receives job orders.
#[derive(Clone, Default)]
pub enum DispatchMode {
    /// The in-process [`RobotDispatcher`] over the facility's own robots.
    #[default]
    Robots,
    /// [`PublishingDispatcher`] on the facility's publisher.
    Publish,
    /// A caller-supplied executor.
    Custom(Arc<dyn Dispatcher>),
}

/// Fluent builder for [`Facility`].
///
/// # Required inputs
///
/// - [`FacilityConfig`]: tick interval, arrival epsilon, robot speed, …
/// - A persistence collaborator ([`FacilityStore`]).
/// - A [`FacilityLayout`]: the one bulk-load step for locations and graph.
///
/// # Optional inputs (have defaults)
///
/// | Method          | Default                 |
/// |-----------------|-------------------------|
/// | `.robots(…)`    | none                    |
/// | `.carriers(…)`  | none                    |
/// | `.publisher(…)` | [`NoopPublisher`]       |
/// | `.dispatch(…)`  | [`DispatchMode::Robots`] |
///
/// Each robot gets a `Robot`-kind deck location under its own id, placed at
/// its starting position.  Each carrier with a location of its own is placed
/// there, making that location Occupied.
///
/// # Example
///
/// ```rust,ignore
/// let facility = FacilityBuilder::new(FacilityConfig::default(), store, layout)
///     .robots(vec![Robot::new("r1", Position::planar(0.0, 0.0))])
///     .carriers(vec![Carrier::cassette("c1", "p1")])
///     .build()?;
/// let handle = facility.start(CancellationToken::new()).await?;
/// ```
pub struct FacilityBuilder {
    config:    FacilityConfig,
    store:     Arc<dyn FacilityStore>,
    layout:    FacilityLayout,
    robots:    Vec<Robot>,
    carriers:  Vec<Carrier>,
    publisher: Arc<dyn Publisher>,
    dispatch:  DispatchMode,
}

impl FacilityBuilder {
    pub fn new(config: FacilityConfig, store: Arc<dyn FacilityStore>, layout: FacilityLayout) -> Self {
        Self {
            config,
            store,
            layout,
            robots:    Vec::new(),
            carriers:  Vec::new(),
            publisher: Arc::new(NoopPublisher),
            dispatch:  DispatchMode::default(),
        }
    }

    pub fn robots(mut self, robots: impl IntoIterator<Item = Robot>) -> Self {
        self.robots.extend(robots);
        self
    }

    pub fn carriers(mut self, carriers: impl IntoIterator<Item = Carrier>) -> Self {
        self.carriers.extend(carriers);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn dispatch(mut self, mode: DispatchMode) -> Self {
        self.dispatch = mode;
        self
    }

    /// Validate inputs and wire every component.
    ///
    /// Provisioning emits no events; the relay starts counting from the
    /// first runtime mutation.
    pub fn build(self) -> FacilityResult<Arc<Facility>> {
        self.config.validate()?;
        let events = EventRelay::new(self.config.event_buffer);

        let mut layout = self.layout;
        let mut seen = HashSet::with_capacity(self.robots.len());
        for robot in &self.robots {
            if !seen.insert(robot.id.clone()) {
                return Err(FacilityError::DuplicateRobot(robot.id.clone()));
            }
            layout = layout.location(Location::new(
                robot.id.deck(),
                format!("{} deck", robot.id),
                LocationKind::Robot,
                robot.position,
            ));
        }
        place_carriers(&mut layout.locations, &self.carriers)?;

        let topology = Arc::new(layout.into_store(events.clone())?);
        let transport = Arc::new(TransportDirectory::from_carriers(self.carriers, events.clone())?);
        let assign = Arc::new(AssignmentEngine::new(Arc::clone(&topology), Arc::clone(&self.store)));
        let plans = Arc::new(PlanEngine::new(events.clone()));
        let motion = Arc::new(MotionSimulator::new(Arc::clone(&self.store), events.clone(), &self.config)?);

        let dispatcher: Arc<dyn Dispatcher> = match self.dispatch {
            DispatchMode::Robots => Arc::new(RobotDispatcher::new(
                self.robots.iter().map(|r| r.id.clone()).collect(),
                Arc::clone(&motion),
                Arc::clone(&assign),
                Arc::clone(&transport),
                Arc::clone(&self.store),
                self.config.robot_speed,
            )?),
            DispatchMode::Publish => Arc::new(PublishingDispatcher::new(Arc::clone(&self.publisher))),
            DispatchMode::Custom(dispatcher) => dispatcher,
        };

        info!(
            locations = topology.len(),
            carriers = transport.len(),
            robots = self.robots.len(),
            "facility built"
        );

        Ok(Arc::new(Facility::from_parts(FacilityParts {
            config: self.config,
            store: self.store,
            events,
            topology,
            transport,
            assign,
            plans,
            motion,
            dispatcher,
            publisher: self.publisher,
            robots: self.robots,
        })))
    }
}

/// Mark each carrier's own location as holding it.
fn place_carriers(locations: &mut [Location], carriers: &[Carrier]) -> FacilityResult<()> {
    for carrier in carriers {
        let Some(at) = &carrier.location else { continue };
        let location = locations
            .iter_mut()
            .find(|l| &l.id == at)
            .ok_or_else(|| TopologyError::NotFound(at.clone()))?;
        match &location.current_item {
            Some(holder) if holder != &carrier.id => {
                return Err(FacilityError::PlacementConflict {
                    item:     carrier.id.clone(),
                    location: at.clone(),
                    holder:   holder.clone(),
                });
            }
            Some(_) => {}
            None => *location = location.clone().holding(carrier.id.clone()),
        }
    }
    Ok(())
}
