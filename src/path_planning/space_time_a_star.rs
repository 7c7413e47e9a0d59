//! Time-windowed 3D A* path planning
//!
//! Searches a 26-connected voxel grid while treating the committed
//! trajectories of other agents as moving obstacles. A neighbour is only
//! admitted if no other agent is reserved near it at the time this agent
//! would arrive there.
//!
//! On success the path is smoothed, timestamped and committed to the
//! reservation table under the planning agent.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use itertools::iproduct;
use log::{debug, info, trace, warn};
use ordered_float::OrderedFloat;
use parking_lot::RwLockUpgradableReadGuard;

use crate::common::{
    AgentId, Endpoint, GridIndex, Path3D, Point3D, SpaceTimePlanner, SpaceTimePoint, SwarmError, SwarmResult,
};
use crate::mapping::GridMap;
use crate::path_planning::context::PlanningContext;
use crate::path_planning::heuristic::HeuristicKind;
use crate::path_planning::path_smoother::{PathSmoother, SmootherConfig};
use crate::path_planning::reservation_table::{Reservation, ReservationTable};

/// Configuration for the space-time A* planner
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AStarConfig {
    pub heuristic: HeuristicKind,
    /// Heuristic weight (1.0 = optimal, >1.0 = faster but suboptimal)
    pub heuristic_weight: f64,
    /// A node within this many grid units of the goal counts as reaching it
    pub goal_tolerance: f64,
    /// Maximum number of node expansions per search
    pub max_expansions: usize,
    /// Wall-clock budget per search
    pub timeout: Duration,
}

impl Default for AStarConfig {
    fn default() -> Self {
        Self {
            heuristic: HeuristicKind::Diagonal,
            heuristic_weight: 1.0,
            goal_tolerance: 1.0,
            max_expansions: 100_000,
            timeout: Duration::from_secs(1),
        }
    }
}

/// Raw grid path produced by [`SpaceTimeAStar::search`]
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub path: Path3D,
    /// Cost-from-start of the goal node in world units
    pub cost: f64,
    pub expansions: usize,
}

/// Result of a committed plan
#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    pub path: Path3D,
    /// Cost-from-start of the goal node in world units
    pub cost: f64,
    pub expansions: usize,
    /// Samples committed to the reservation table
    pub reservation: Vec<SpaceTimePoint>,
}

/// Arena node; lives only for one search call
#[derive(Debug, Clone)]
struct SearchNode {
    index: GridIndex,
    g: f64,
    f: f64,
    parent: Option<usize>,
    closed: bool,
}

/// Open-set entry (min-heap on f, then insertion order)
#[derive(Debug, PartialEq, Eq)]
struct PriorityNode {
    priority: OrderedFloat<f64>,
    sequence: usize,
    node: usize,
}

impl Ord for PriorityNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for PriorityNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Time-windowed 3D A* planner
#[derive(Debug, Clone)]
pub struct SpaceTimeAStar {
    config: AStarConfig,
    smoother: PathSmoother,
    motion: Vec<(i32, i32, i32, f64)>,
}

impl Default for SpaceTimeAStar {
    fn default() -> Self {
        Self::new(AStarConfig::default())
    }
}

impl SpaceTimeAStar {
    pub fn new(config: AStarConfig) -> Self {
        Self::with_smoother(config, SmootherConfig::default())
    }

    pub fn with_smoother(config: AStarConfig, smoother: SmootherConfig) -> Self {
        Self {
            config,
            smoother: PathSmoother::new(smoother),
            motion: Self::get_motion_model(),
        }
    }

    pub fn config(&self) -> &AStarConfig {
        &self.config
    }

    pub fn smoother(&self) -> &PathSmoother {
        &self.smoother
    }

    fn get_motion_model() -> Vec<(i32, i32, i32, f64)> {
        // dx, dy, dz, cost in grid units (26-connected)
        iproduct!(-1..=1, -1..=1, -1..=1)
            .filter(|&(dx, dy, dz)| (dx, dy, dz) != (0, 0, 0))
            .map(|(dx, dy, dz)| (dx, dy, dz, ((dx * dx + dy * dy + dz * dz) as f64).sqrt()))
            .collect()
    }

    fn calc_heuristic(&self, from: GridIndex, to: GridIndex, resolution: f64) -> f64 {
        self.config.heuristic_weight * self.config.heuristic.estimate(from, to, resolution)
    }

    fn validate_endpoint(grid: &GridMap, position: Point3D, endpoint: Endpoint) -> SwarmResult<GridIndex> {
        let index = grid.world_to_grid(&position).ok_or_else(|| {
            debug!("[AStar] {} {} is outside the grid", endpoint, position);
            SwarmError::OutOfBounds { endpoint, position }
        })?;
        if grid.is_cell_occupied(index) {
            debug!("[AStar] {} {} is occupied", endpoint, position);
            return Err(SwarmError::Occupied { endpoint, position });
        }
        Ok(index)
    }

    /// Search for a path without smoothing or committing it
    pub fn search(
        &self,
        ctx: &PlanningContext,
        start: Point3D,
        goal: Point3D,
        agent: AgentId,
        speed: f64,
    ) -> SwarmResult<SearchOutcome> {
        let reservations = ctx.reservations().read();
        let grid = ctx.grid().read();
        let epoch = ctx.now();
        self.search_locked(&grid, &reservations, start, goal, agent, speed, epoch)
    }

    #[allow(clippy::too_many_arguments)]
    fn search_locked(
        &self,
        grid: &GridMap,
        reservations: &ReservationTable,
        start: Point3D,
        goal: Point3D,
        agent: AgentId,
        speed: f64,
        epoch: f64,
    ) -> SwarmResult<SearchOutcome> {
        if !grid.is_initialized() {
            return Err(SwarmError::NotInitialized);
        }
        if !(speed.is_finite() && speed > 0.0) {
            return Err(SwarmError::InvalidParameter(format!("speed must be positive, got {}", speed)));
        }
        let start_index = Self::validate_endpoint(grid, start, Endpoint::Start)?;
        let goal_index = Self::validate_endpoint(grid, goal, Endpoint::Goal)?;

        let resolution = grid.resolution();
        let deadline = Instant::now() + self.config.timeout;

        let mut node_storage: Vec<SearchNode> = Vec::new();
        let mut lookup: HashMap<GridIndex, usize> = HashMap::new();
        let mut open_set = BinaryHeap::new();
        let mut sequence = 0;
        let mut expansions = 0;

        let start_f = self.calc_heuristic(start_index, goal_index, resolution);
        node_storage.push(SearchNode {
            index: start_index,
            g: 0.0,
            f: start_f,
            parent: None,
            closed: false,
        });
        lookup.insert(start_index, 0);
        open_set.push(PriorityNode {
            priority: OrderedFloat(start_f),
            sequence,
            node: 0,
        });

        while let Some(entry) = open_set.pop() {
            // Skip stale heap entries
            if node_storage[entry.node].closed {
                continue;
            }

            if expansions >= self.config.max_expansions {
                warn!("[AStar] agent {} hit the expansion limit of {}", agent, self.config.max_expansions);
                return Err(SwarmError::ExpansionLimit {
                    limit: self.config.max_expansions,
                });
            }
            if Instant::now() >= deadline {
                warn!("[AStar] agent {} timed out after {} expansions", agent, expansions);
                return Err(SwarmError::Timeout { expansions });
            }
            expansions += 1;

            let current = entry.node;
            node_storage[current].closed = true;
            let current_index = node_storage[current].index;
            let current_g = node_storage[current].g;

            trace!(
                "[AStar] expand {} g={:.3} f={:.3}",
                current_index,
                current_g,
                node_storage[current].f
            );

            let goal_distance = current_index.distance(&goal_index);
            if goal_distance <= self.config.goal_tolerance {
                // Snap onto the exact goal cell unless another agent holds it at that time
                let goal_node = if current_index == goal_index {
                    Some(current)
                } else {
                    let g = current_g + goal_distance * resolution;
                    if reservations.conflict(&grid.grid_to_world(goal_index), epoch + g / speed, agent) {
                        trace!("[AStar] goal reserved when snapping from {}, expanding on", current_index);
                        None
                    } else {
                        node_storage.push(SearchNode {
                            index: goal_index,
                            g,
                            f: g,
                            parent: Some(current),
                            closed: true,
                        });
                        Some(node_storage.len() - 1)
                    }
                };
                if let Some(goal_node) = goal_node {
                    let cost = node_storage[goal_node].g;
                    let path = Self::build_path(grid, goal_node, &node_storage);
                    debug!(
                        "[AStar] agent {} reached goal: {} waypoints, cost {:.3}, {} expansions",
                        agent,
                        path.len(),
                        cost,
                        expansions
                    );
                    return Ok(SearchOutcome { path, cost, expansions });
                }
            }

            for &(dx, dy, dz, step) in &self.motion {
                let neighbor = current_index.offset(dx, dy, dz);
                if !grid.is_in_bounds(neighbor) || grid.is_cell_occupied(neighbor) {
                    continue;
                }

                let segment = step * resolution;
                let arrival = epoch + current_g / speed + segment / speed;
                if reservations.conflict(&grid.grid_to_world(neighbor), arrival, agent) {
                    continue;
                }

                let tentative_g = current_g + segment;
                match lookup.get(&neighbor) {
                    Some(&existing) => {
                        let node = &mut node_storage[existing];
                        if node.closed || tentative_g >= node.g {
                            continue;
                        }
                        node.g = tentative_g;
                        node.f = tentative_g + self.calc_heuristic(neighbor, goal_index, resolution);
                        node.parent = Some(current);
                        sequence += 1;
                        open_set.push(PriorityNode {
                            priority: OrderedFloat(node.f),
                            sequence,
                            node: existing,
                        });
                    }
                    None => {
                        let f = tentative_g + self.calc_heuristic(neighbor, goal_index, resolution);
                        node_storage.push(SearchNode {
                            index: neighbor,
                            g: tentative_g,
                            f,
                            parent: Some(current),
                            closed: false,
                        });
                        let new_node = node_storage.len() - 1;
                        lookup.insert(neighbor, new_node);
                        sequence += 1;
                        open_set.push(PriorityNode {
                            priority: OrderedFloat(f),
                            sequence,
                            node: new_node,
                        });
                    }
                }
            }
        }

        debug!("[AStar] agent {} exhausted the open set after {} expansions", agent, expansions);
        Err(SwarmError::NoPath { expansions })
    }

    fn build_path(grid: &GridMap, goal_node: usize, node_storage: &[SearchNode]) -> Path3D {
        let mut points = Vec::new();
        let mut current = Some(goal_node);

        while let Some(node) = current {
            points.push(grid.grid_to_world(node_storage[node].index));
            current = node_storage[node].parent;
        }

        points.reverse();
        Path3D::from_points(points)
    }

    /// Plan, smooth, verify and commit a trajectory for `agent`
    ///
    /// The reservation table stays upgradably read-locked from the search
    /// through the commit, so concurrent planners are serialized while plain
    /// readers proceed.
    pub fn find_path(
        &self,
        ctx: &PlanningContext,
        start: Point3D,
        goal: Point3D,
        agent: AgentId,
        speed: f64,
    ) -> SwarmResult<PathResult> {
        let reservations = ctx.reservations().upgradable_read();
        // read only once the lock is held, so time spent waiting is not planned in the past
        let epoch = ctx.now();

        let (outcome, smoothed) = {
            let grid = ctx.grid().read();
            let outcome = self.search_locked(&grid, &reservations, start, goal, agent, speed, epoch)?;
            let smoothed = self.smoother.smooth(&grid, &outcome.path);
            (outcome, smoothed)
        };

        let reservation = Self::select_trajectory(&reservations, &outcome.path, &smoothed, agent, speed, epoch)?;
        let path = Path3D::from_points(reservation.points().iter().map(|p| p.position).collect());
        let points = reservation.points().to_vec();

        let mut table = RwLockUpgradableReadGuard::upgrade(reservations);
        table.add(agent, reservation);

        info!(
            "[AStar] agent {} planned {} waypoints, length {:.3}, {} expansions",
            agent,
            path.len(),
            path.total_length(),
            outcome.expansions
        );

        Ok(PathResult {
            path,
            cost: outcome.cost,
            expansions: outcome.expansions,
            reservation: points,
        })
    }

    /// Prefer the smoothed trajectory, fall back to the raw one
    ///
    /// The start sample is not checked: the agent is already there.
    fn select_trajectory(
        reservations: &ReservationTable,
        raw: &Path3D,
        smoothed: &Path3D,
        agent: AgentId,
        speed: f64,
        epoch: f64,
    ) -> SwarmResult<Reservation> {
        let first_conflict = |reservation: &Reservation| {
            reservation
                .points()
                .get(1..)
                .and_then(|rest| reservations.first_conflict(rest, agent))
                .map(|i| i + 1)
        };

        let candidate = Reservation::from_path(smoothed, speed, epoch);
        if first_conflict(&candidate).is_none() {
            return Ok(candidate);
        }
        warn!("[AStar] smoothed path of agent {} conflicts, falling back to grid path", agent);

        let fallback = Reservation::from_path(raw, speed, epoch);
        match first_conflict(&fallback) {
            None => Ok(fallback),
            Some(sample) => {
                warn!("[AStar] grid path of agent {} conflicts at sample {}", agent, sample);
                Err(SwarmError::ReservationConflict { agent, sample })
            }
        }
    }
}

impl SpaceTimePlanner for SpaceTimeAStar {
    fn find_path(
        &self,
        ctx: &PlanningContext,
        start: Point3D,
        goal: Point3D,
        agent: AgentId,
        speed: f64,
    ) -> SwarmResult<PathResult> {
        SpaceTimeAStar::find_path(self, ctx, start, goal, agent, speed)
    }
}
