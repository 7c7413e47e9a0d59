//! Session-wide configuration
//!
//! Gathers the per-component configs so a whole planning session can be
//! built (or deserialized with the `serde` feature) in one place.

use std::sync::Arc;

use crate::common::{Clock, SwarmError, SwarmResult};
use crate::mapping::{GridMap, GridMapConfig};
use crate::mission_planning::SwarmCoordinator;
use crate::path_planning::{AStarConfig, PlanningContext, ReservationConfig, ReservationTable, SmootherConfig, SpaceTimeAStar};
use crate::path_tracking::PathModifierConfig;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SwarmConfig {
    pub grid: GridMapConfig,
    pub reservations: ReservationConfig,
    pub astar: AStarConfig,
    pub smoother: SmootherConfig,
    pub modifier: PathModifierConfig,
    /// Cruise speed given to agents created by callers without their own
    pub default_speed: f64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            grid: GridMapConfig::default(),
            reservations: ReservationConfig::default(),
            astar: AStarConfig::default(),
            smoother: SmootherConfig::default(),
            modifier: PathModifierConfig::default(),
            default_speed: 1.0,
        }
    }
}

impl SwarmConfig {
    pub fn validate(&self) -> SwarmResult<()> {
        if !(self.default_speed.is_finite() && self.default_speed > 0.0) {
            return Err(SwarmError::InvalidParameter(format!(
                "default speed must be positive, got {}",
                self.default_speed
            )));
        }
        if self.reservations.conflict_radius < 0.0 || self.reservations.time_window < 0.0 {
            return Err(SwarmError::InvalidParameter(
                "reservation radius and time window must be non-negative".to_string(),
            ));
        }
        if self.astar.goal_tolerance < 0.0 || self.astar.heuristic_weight < 0.0 {
            return Err(SwarmError::InvalidParameter(
                "goal tolerance and heuristic weight must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Initialized grid, empty reservation table and the given clock
    pub fn build_context(&self, clock: Arc<dyn Clock>) -> SwarmResult<PlanningContext> {
        self.validate()?;
        let grid = GridMap::from_config(&self.grid)?;
        let reservations = ReservationTable::new(self.reservations.clone());
        Ok(PlanningContext::with_clock(grid, reservations, clock))
    }

    pub fn build_planner(&self) -> SpaceTimeAStar {
        SpaceTimeAStar::with_smoother(self.astar.clone(), self.smoother.clone())
    }

    pub fn build_coordinator(&self, clock: Arc<dyn Clock>) -> SwarmResult<SwarmCoordinator> {
        let ctx = self.build_context(clock)?;
        Ok(SwarmCoordinator::new(ctx, self.build_planner(), self.modifier.clone()))
    }
}
