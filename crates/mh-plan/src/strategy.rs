//! Execution strategies: which plans of a group may start next.

use mh_core::PlanId;

use crate::{PlanGroup, PlanStatus};

/// How the plans of one group are released.
///
/// A closed set; adding a strategy means adding a variant and a match arm.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// One plan at a time, in declaration order.
    #[default]
    Sequential,
    /// Every plan at once.
    Parallel,
}

impl ExecutionStrategy {
    /// Plans to start now.
    ///
    /// `completed` is `None` for the initial call when the group starts and
    /// the id of the plan that just completed otherwise.  Only plans still
    /// `Pending` are returned, so repeated calls never start a plan twice.
    pub fn next_plans_to_start(self, group: &PlanGroup, completed: Option<&PlanId>) -> Vec<PlanId> {
        let candidates: Vec<&PlanId> = match (self, completed) {
            (ExecutionStrategy::Sequential, None) => group.plans.first().map(|p| &p.id).into_iter().collect(),
            (ExecutionStrategy::Sequential, Some(done)) => group
                .plans
                .iter()
                .position(|p| &p.id == done)
                .and_then(|i| group.plans.get(i + 1))
                .map(|p| &p.id)
                .into_iter()
                .collect(),
            (ExecutionStrategy::Parallel, None) => group.plans.iter().map(|p| &p.id).collect(),
            (ExecutionStrategy::Parallel, Some(_)) => Vec::new(),
        };
        candidates
            .into_iter()
            .filter(|id| group.plan(id).is_some_and(|p| p.status == PlanStatus::Pending))
            .cloned()
            .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStrategy::Sequential => "sequential",
            ExecutionStrategy::Parallel   => "parallel",
        }
    }
}

impl std::str::FromStr for ExecutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sequential" => Ok(ExecutionStrategy::Sequential),
            "parallel"   => Ok(ExecutionStrategy::Parallel),
            other        => Err(format!("unknown strategy {other:?}")),
        }
    }
}
