//! Facility runtime configuration.
//!
//! Typically loaded from a JSON file by the application and handed to the
//! facility builder.  Every field has a default; [`FacilityConfig::validate`]
//! rejects non-positive dimensions instead of clamping them.

use std::time::Duration;

use crate::{CoreError, CoreResult};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FacilityConfig {
    /// Motion tick period in milliseconds.  Default: 100.
    pub tick_interval_ms: u64,

    /// Distance under which a robot snaps onto its target.  Default: 1e-4.
    pub arrival_epsilon: f64,

    /// Robot speed in facility units per second for dispatcher moves.
    pub robot_speed: f64,

    /// Capacity of the in-process event broadcast ring.
    pub event_buffer: usize,

    /// How long a plan-group driver waits before re-dispatching jobs whose
    /// dispatch call failed.
    pub dispatch_retry_ms: u64,
}

impl Default for FacilityConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms:  100,
            arrival_epsilon:   1e-4,
            robot_speed:       1.0,
            event_buffer:      1024,
            dispatch_retry_ms: 500,
        }
    }
}

impl FacilityConfig {
    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[inline]
    pub fn dispatch_retry(&self) -> Duration {
        Duration::from_millis(self.dispatch_retry_ms)
    }

    /// Reject non-positive or non-finite dimensions.
    pub fn validate(&self) -> CoreResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(CoreError::InvalidDimension { what: "tick_interval_ms", value: 0.0 });
        }
        if !(self.arrival_epsilon.is_finite() && self.arrival_epsilon >= 0.0) {
            return Err(CoreError::InvalidDimension {
                what:  "arrival_epsilon",
                value: self.arrival_epsilon,
            });
        }
        if !(self.robot_speed.is_finite() && self.robot_speed > 0.0) {
            return Err(CoreError::InvalidDimension { what: "robot_speed", value: self.robot_speed });
        }
        if self.event_buffer == 0 {
            return Err(CoreError::Config("event_buffer must be at least 1".into()));
        }
        if self.dispatch_retry_ms == 0 {
            return Err(CoreError::InvalidDimension { what: "dispatch_retry_ms", value: 0.0 });
        }
        Ok(())
    }
}
