//! Common traits defining interfaces between planning components

use crate::common::error::SwarmResult;
use crate::common::types::{AgentId, Point3D};
use crate::path_planning::{PathResult, PlanningContext};

/// Trait for planners that search in space-time against a shared reservation table
///
/// A successful call commits the returned trajectory to the context's
/// reservation table under `agent`, replacing any earlier reservation.
pub trait SpaceTimePlanner {
    fn find_path(
        &self,
        ctx: &PlanningContext,
        start: Point3D,
        goal: Point3D,
        agent: AgentId,
        speed: f64,
    ) -> SwarmResult<PathResult>;
}

/// Source of monotonic session time in seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}
