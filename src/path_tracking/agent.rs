//! Mobile agent state
//!
//! An agent records its live position (reported by the locomotion layer),
//! its goal, its current path and how far along it has progressed. Moving
//! along the path is left to the caller.

use log::{info, warn};
use nalgebra::Vector3;

use crate::common::{AgentId, Endpoint, Path3D, Point3D, SpaceTimePlanner, SwarmError, SwarmResult};
use crate::path_planning::PlanningContext;

/// Points closer than this are treated as the same waypoint when merging
const MERGE_EPSILON: f64 = 0.01;

/// Read-only view of an agent used by its neighbours
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub position: Point3D,
    /// Unit direction of travel, if the agent has a waypoint ahead
    pub heading: Option<Vector3<f64>>,
    pub moving: bool,
}

#[derive(Debug, Clone)]
pub struct Agent {
    id: AgentId,
    position: Point3D,
    goal: Option<Point3D>,
    speed: f64,
    path: Path3D,
    path_index: usize,
    moving: bool,
}

impl Agent {
    pub fn new(id: AgentId, position: Point3D, speed: f64) -> Self {
        Self {
            id,
            position,
            goal: None,
            speed,
            path: Path3D::new(),
            path_index: 0,
            moving: false,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn position(&self) -> Point3D {
        self.position
    }

    pub fn goal(&self) -> Option<Point3D> {
        self.goal
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn path(&self) -> &Path3D {
        &self.path
    }

    pub fn path_index(&self) -> usize {
        self.path_index
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// Waypoints from the current index to the end of the path
    pub fn remaining_waypoints(&self) -> &[Point3D] {
        self.path.points.get(self.path_index..).unwrap_or(&[])
    }

    /// Record a position update from the locomotion layer
    pub fn set_position(&mut self, position: Point3D) {
        self.position = position;
    }

    pub(crate) fn set_goal_position(&mut self, goal: Point3D) {
        self.goal = Some(goal);
    }

    /// Install a path and continue from the waypoint closest to the agent
    pub fn set_path(&mut self, path: Path3D) {
        self.path = path;
        self.path_index = self.closest_waypoint(0);
    }

    /// Begin following the path from its first waypoint
    ///
    /// Returns false when there is no path to follow.
    pub fn start(&mut self) -> bool {
        if self.path.is_empty() {
            warn!("[Agent] agent {} has no path to start", self.id);
            return false;
        }
        self.path_index = 0;
        self.moving = true;
        true
    }

    pub fn stop(&mut self) {
        self.moving = false;
    }

    /// Continue from the closest waypoint at or after the current index
    pub fn resume(&mut self) -> bool {
        if self.path.is_empty() {
            return false;
        }
        self.path_index = self.closest_waypoint(self.path_index);
        self.moving = true;
        true
    }

    /// Step to the next waypoint; stops the agent after the last one
    pub fn advance_waypoint(&mut self) {
        if self.path_index + 1 < self.path.len() {
            self.path_index += 1;
        } else {
            self.moving = false;
        }
    }

    fn closest_waypoint(&self, from: usize) -> usize {
        self.path
            .points
            .iter()
            .enumerate()
            .skip(from)
            .min_by(|(_, a), (_, b)| a.distance(&self.position).total_cmp(&b.distance(&self.position)))
            .map(|(i, _)| i)
            .unwrap_or(from.min(self.path.len().saturating_sub(1)))
    }

    /// Unit direction toward the first remaining waypoint farther than `lookahead`
    pub fn heading(&self, lookahead: f64) -> Option<Vector3<f64>> {
        self.remaining_waypoints()
            .iter()
            .find(|p| p.distance(&self.position) > lookahead)
            .map(|p| (p.to_vector() - self.position.to_vector()).normalize())
    }

    pub fn snapshot(&self, heading_lookahead: f64) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            position: self.position,
            heading: self.heading(heading_lookahead),
            moving: self.moving,
        }
    }

    /// Set a new goal and plan to it from the live position
    ///
    /// A goal outside the map bounds is rejected without side effects. A
    /// planning failure stops the agent and keeps its previous path.
    pub fn set_goal<P>(&mut self, goal: Point3D, planner: &P, ctx: &PlanningContext) -> SwarmResult<()>
    where
        P: SpaceTimePlanner + ?Sized,
    {
        if !ctx.grid().read().contains_point(&goal) {
            warn!("[Agent] agent {} rejected goal {} outside the map", self.id, goal);
            return Err(SwarmError::OutOfBounds {
                endpoint: Endpoint::Goal,
                position: goal,
            });
        }

        self.goal = Some(goal);
        match planner.find_path(ctx, self.position, goal, self.id, self.speed) {
            Ok(result) => {
                info!(
                    "[Agent] agent {} heading to {} along {} waypoints",
                    self.id,
                    goal,
                    result.path.len()
                );
                self.set_path(result.path);
                Ok(())
            }
            Err(err) => {
                warn!("[Agent] agent {} failed to plan to {}: {}", self.id, goal, err);
                self.stop();
                Err(err)
            }
        }
    }

    /// Splice a replanned path onto the traversed part of the current one
    ///
    /// The result is the traversed prefix, then the live position, then the
    /// new path with near-duplicate points dropped.
    pub fn apply_modified_path(&mut self, new_path: &Path3D) {
        let prefix_len = self.path_index.min(self.path.len());
        let mut merged: Vec<Point3D> = self.path.points[..prefix_len].to_vec();

        let push_distinct = |merged: &mut Vec<Point3D>, point: Point3D| {
            if merged.last().map_or(true, |last| !last.approx_eq(&point, MERGE_EPSILON)) {
                merged.push(point);
            }
        };

        push_distinct(&mut merged, self.position);
        let live_index = merged.len() - 1;

        let skip_first = new_path
            .first()
            .map_or(false, |first| first.distance(&self.position) <= 1.0);
        for point in new_path.points.iter().skip(usize::from(skip_first)) {
            push_distinct(&mut merged, *point);
        }

        self.path = Path3D::from_points(merged);
        self.path_index = live_index;
    }
}
