//! Shared planning state
//!
//! Every planner call receives the grid, the reservation table and the
//! session clock through a [`PlanningContext`]. Clones share the same state.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::Clock;
use crate::mapping::GridMap;
use crate::path_planning::reservation_table::ReservationTable;
use crate::utils::MonotonicClock;

/// Handles to the grid map, reservation table and clock of one session
///
/// Lock order is reservations before grid.
#[derive(Clone)]
pub struct PlanningContext {
    grid: Arc<RwLock<GridMap>>,
    reservations: Arc<RwLock<ReservationTable>>,
    clock: Arc<dyn Clock>,
}

impl PlanningContext {
    /// Wrap a grid and table, timing the session with a [`MonotonicClock`]
    pub fn new(grid: GridMap, reservations: ReservationTable) -> Self {
        Self::with_clock(grid, reservations, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(grid: GridMap, reservations: ReservationTable, clock: Arc<dyn Clock>) -> Self {
        Self::from_shared(
            Arc::new(RwLock::new(grid)),
            Arc::new(RwLock::new(reservations)),
            clock,
        )
    }

    pub fn from_shared(
        grid: Arc<RwLock<GridMap>>,
        reservations: Arc<RwLock<ReservationTable>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            grid,
            reservations,
            clock,
        }
    }

    pub fn grid(&self) -> &Arc<RwLock<GridMap>> {
        &self.grid
    }

    pub fn reservations(&self) -> &Arc<RwLock<ReservationTable>> {
        &self.reservations
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current session time in seconds
    pub fn now(&self) -> f64 {
        self.clock.now()
    }
}
