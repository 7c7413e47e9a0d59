//! Reactive path modification
//!
//! One modifier runs per agent. It replans when the map reports new
//! obstacles on the agent's remaining route, and it pauses an agent that is
//! trailing a nearby peer, delaying its reservation to match.

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};

use crate::common::{AgentId, Path3D, SpaceTimePlanner, SwarmResult};
use crate::mapping::MapEvent;
use crate::path_planning::PlanningContext;
use crate::path_tracking::agent::{Agent, AgentSnapshot};

/// Configuration for the path modifier
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathModifierConfig {
    /// Peers closer than this are checked for yielding
    pub proximity_threshold: f64,
    /// Headings aim at the first waypoint farther than this
    pub heading_lookahead: f64,
    /// How long a yielding agent stays stopped
    pub pause_duration: f64,
    /// Peer heading dot product below which the peer is moving away
    pub yield_threshold: f64,
}

impl Default for PathModifierConfig {
    fn default() -> Self {
        Self {
            proximity_threshold: 1.1,
            heading_lookahead: 0.5,
            pause_duration: 0.5,
            yield_threshold: -0.1,
        }
    }
}

/// Emitted whenever an agent's path was replaced by a replanned one
#[derive(Debug, Clone, PartialEq)]
pub struct PathModified {
    pub agent: AgentId,
    pub path: Path3D,
}

/// What a [`PathModifier::tick`] did to its agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    None,
    /// The agent is trailing a peer and was stopped
    Yielded { to: AgentId },
    /// A pending pause expired and the agent moves again
    Resumed,
}

pub struct PathModifier {
    agent: AgentId,
    config: PathModifierConfig,
    map_events: Receiver<MapEvent>,
    path_events: Sender<PathModified>,
    resume_at: Option<f64>,
}

impl PathModifier {
    /// Create a modifier for `agent`, subscribing to the context's grid map
    pub fn new(
        agent: AgentId,
        ctx: &PlanningContext,
        path_events: Sender<PathModified>,
        config: PathModifierConfig,
    ) -> Self {
        let map_events = ctx.grid().write().subscribe();
        Self {
            agent,
            config,
            map_events,
            path_events,
            resume_at: None,
        }
    }

    pub fn agent(&self) -> AgentId {
        self.agent
    }

    pub fn config(&self) -> &PathModifierConfig {
        &self.config
    }

    /// Session time at which the current pause ends, if any
    pub fn pending_resume(&self) -> Option<f64> {
        self.resume_at
    }

    pub fn cancel_resume(&mut self) {
        self.resume_at = None;
    }

    /// Drain pending map events and revalidate the path if any arrived
    ///
    /// Returns true when the path was replaced. Replanning failures are
    /// logged and leave the current path in place.
    pub fn poll_map_events<P>(&mut self, agent: &mut Agent, planner: &P, ctx: &PlanningContext) -> bool
    where
        P: SpaceTimePlanner + ?Sized,
    {
        let pending = self.map_events.try_iter().count();
        if pending == 0 {
            return false;
        }
        debug!("[PathModifier] agent {} received {} map events", self.agent, pending);

        match self.check_and_modify(agent, planner, ctx) {
            Ok(modified) => modified,
            Err(err) => {
                warn!("[PathModifier] agent {} keeps its path, replanning failed: {}", self.agent, err);
                false
            }
        }
    }

    /// Replan if an obstacle now sits on one of the remaining waypoints
    pub fn check_and_modify<P>(&mut self, agent: &mut Agent, planner: &P, ctx: &PlanningContext) -> SwarmResult<bool>
    where
        P: SpaceTimePlanner + ?Sized,
    {
        if agent.path().len() < 2 {
            return Ok(false);
        }

        let blocked = {
            let grid = ctx.grid().read();
            agent.remaining_waypoints().iter().position(|p| grid.is_occupied(p))
        };
        let blocked = match blocked {
            Some(offset) => agent.path_index() + offset,
            None => return Ok(false),
        };

        let goal = match agent.goal().or_else(|| agent.path().last().copied()) {
            Some(goal) => goal,
            None => return Ok(false),
        };
        info!(
            "[PathModifier] agent {} waypoint {} is blocked, replanning from {}",
            self.agent,
            blocked,
            agent.position()
        );

        let result = planner.find_path(ctx, agent.position(), goal, self.agent, agent.speed())?;
        agent.apply_modified_path(&result.path);

        let event = PathModified {
            agent: self.agent,
            path: agent.path().clone(),
        };
        if self.path_events.send(event).is_err() {
            debug!("[PathModifier] no listener for path events");
        }
        Ok(true)
    }

    /// Per-tick yielding logic
    ///
    /// A due resume fires first. A moving agent then stops if it is trailing
    /// a moving peer within the proximity threshold: it heads toward the
    /// peer while the peer heads away from it.
    pub fn tick(&mut self, agent: &mut Agent, peers: &[AgentSnapshot], ctx: &PlanningContext, now: f64) -> TickAction {
        let mut action = TickAction::None;

        if let Some(deadline) = self.resume_at {
            if now >= deadline {
                self.resume_at = None;
                if agent.resume() {
                    debug!("[PathModifier] agent {} resumes at {:.3}", self.agent, now);
                    action = TickAction::Resumed;
                }
            }
        }

        if !agent.is_moving() || agent.path().len() < 2 {
            return action;
        }
        let heading = match agent.heading(self.config.heading_lookahead) {
            Some(heading) => heading,
            None => return action,
        };
        let position = agent.position().to_vector();

        for peer in peers.iter().filter(|p| p.id != self.agent && p.moving) {
            let offset = peer.position.to_vector() - position;
            let distance = offset.norm();
            if distance >= self.config.proximity_threshold || distance <= f64::EPSILON {
                continue;
            }
            let peer_heading = match peer.heading {
                Some(h) => h,
                None => continue,
            };

            let toward_peer = offset / distance;
            let our_dot = heading.dot(&toward_peer);
            let their_dot = peer_heading.dot(&-toward_peer);

            if our_dot > 0.0 && their_dot < self.config.yield_threshold {
                agent.stop();
                ctx.reservations()
                    .write()
                    .delay_agent(self.agent, now, self.config.pause_duration);
                self.resume_at = Some(now + self.config.pause_duration);
                info!(
                    "[PathModifier] agent {} yields to agent {} for {:.2}s",
                    self.agent, peer.id, self.config.pause_duration
                );
                return TickAction::Yielded { to: peer.id };
            }
        }

        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crossbeam_channel::unbounded;

    use crate::common::{Point3D, SpaceTimePoint};
    use crate::mapping::GridMap;
    use crate::path_planning::{Reservation, ReservationTable, SpaceTimeAStar};
    use crate::utils::ManualClock;

    fn context() -> PlanningContext {
        let grid = GridMap::with_bounds(Point3D::new(4.5, 4.5, 4.5), Point3D::new(10.0, 10.0, 10.0), 1.0).unwrap();
        PlanningContext::with_clock(grid, ReservationTable::default(), Arc::new(ManualClock::default()))
    }

    fn moving_agent(id: u32, from: Point3D, to: Point3D) -> Agent {
        let mut agent = Agent::new(AgentId(id), from, 1.0);
        agent.set_path(Path3D::from_points(vec![from, to]));
        agent.start();
        agent
    }

    fn modifier(id: u32, ctx: &PlanningContext) -> (PathModifier, Receiver<PathModified>) {
        let (tx, rx) = unbounded();
        (PathModifier::new(AgentId(id), ctx, tx, PathModifierConfig::default()), rx)
    }

    #[test]
    fn test_trailing_agent_yields_and_resumes() {
        let ctx = context();
        ctx.reservations().write().add(
            AgentId(1),
            Reservation::new(vec![
                SpaceTimePoint::new(Point3D::new(2.0, 5.0, 5.0), 0.0),
                SpaceTimePoint::new(Point3D::new(9.0, 5.0, 5.0), 7.0),
            ]),
        );
        let (mut follower_mod, _) = modifier(1, &ctx);
        let (mut leader_mod, _) = modifier(2, &ctx);

        let mut follower = moving_agent(1, Point3D::new(2.0, 5.0, 5.0), Point3D::new(9.0, 5.0, 5.0));
        let mut leader = moving_agent(2, Point3D::new(2.8, 5.0, 5.0), Point3D::new(9.0, 5.0, 5.0));
        let peers = vec![follower.snapshot(0.5), leader.snapshot(0.5)];

        assert_eq!(follower_mod.tick(&mut follower, &peers, &ctx, 1.0), TickAction::Yielded { to: AgentId(2) });
        assert_eq!(leader_mod.tick(&mut leader, &peers, &ctx, 1.0), TickAction::None);
        assert!(!follower.is_moving());
        assert!(leader.is_moving());
        assert_eq!(follower_mod.pending_resume(), Some(1.5));

        let times: Vec<f64> = ctx.reservations().read().get(AgentId(1)).unwrap().points().iter().map(|p| p.time).collect();
        assert_eq!(times, vec![0.0, 7.5]);

        let far_peers = vec![follower.snapshot(0.5)];
        assert_eq!(follower_mod.tick(&mut follower, &far_peers, &ctx, 1.2), TickAction::None);
        assert!(!follower.is_moving());
        assert_eq!(follower_mod.tick(&mut follower, &far_peers, &ctx, 1.5), TickAction::Resumed);
        assert!(follower.is_moving());
        assert_eq!(follower_mod.pending_resume(), None);
    }

    #[test]
    fn test_head_on_approach_yields_neither() {
        let ctx = context();
        let (mut a_mod, _) = modifier(1, &ctx);
        let (mut b_mod, _) = modifier(2, &ctx);
        let mut a = moving_agent(1, Point3D::new(4.5, 5.0, 5.0), Point3D::new(9.0, 5.0, 5.0));
        let mut b = moving_agent(2, Point3D::new(5.5, 5.0, 5.0), Point3D::new(0.0, 5.0, 5.0));
        let peers = vec![a.snapshot(0.5), b.snapshot(0.5)];

        assert_eq!(a_mod.tick(&mut a, &peers, &ctx, 0.0), TickAction::None);
        assert_eq!(b_mod.tick(&mut b, &peers, &ctx, 0.0), TickAction::None);
        assert!(a.is_moving() && b.is_moving());
    }

    #[test]
    fn test_perpendicular_approach_yields_neither() {
        let ctx = context();
        let (mut a_mod, _) = modifier(1, &ctx);
        let (mut b_mod, _) = modifier(2, &ctx);
        let mut a = moving_agent(1, Point3D::new(4.5, 5.0, 5.0), Point3D::new(9.0, 5.0, 5.0));
        let mut b = moving_agent(2, Point3D::new(5.0, 4.5, 5.0), Point3D::new(5.0, 9.0, 5.0));
        let peers = vec![a.snapshot(0.5), b.snapshot(0.5)];

        assert_eq!(a_mod.tick(&mut a, &peers, &ctx, 0.0), TickAction::None);
        assert_eq!(b_mod.tick(&mut b, &peers, &ctx, 0.0), TickAction::None);
    }

    #[test]
    fn test_stationary_peer_is_ignored() {
        let ctx = context();
        let (mut a_mod, _) = modifier(1, &ctx);
        let mut a = moving_agent(1, Point3D::new(2.0, 5.0, 5.0), Point3D::new(9.0, 5.0, 5.0));
        let mut b = moving_agent(2, Point3D::new(2.8, 5.0, 5.0), Point3D::new(9.0, 5.0, 5.0));
        b.stop();
        let peers = vec![b.snapshot(0.5)];
        assert_eq!(a_mod.tick(&mut a, &peers, &ctx, 0.0), TickAction::None);
    }

    #[test]
    fn test_newer_stop_replaces_pending_resume() {
        let ctx = context();
        let (mut a_mod, _) = modifier(1, &ctx);
        let mut a = moving_agent(1, Point3D::new(2.0, 5.0, 5.0), Point3D::new(9.0, 5.0, 5.0));
        let leader = moving_agent(2, Point3D::new(2.8, 5.0, 5.0), Point3D::new(9.0, 5.0, 5.0));
        let peers = vec![leader.snapshot(0.5)];

        a_mod.tick(&mut a, &peers, &ctx, 0.0);
        // resume fires at 0.5, the leader is still ahead, so the agent yields again
        assert_eq!(a_mod.tick(&mut a, &peers, &ctx, 0.5), TickAction::Yielded { to: AgentId(2) });
        assert_eq!(a_mod.pending_resume(), Some(1.0));
    }

    #[test]
    fn test_blocked_path_is_replanned() {
        let ctx = context();
        let planner = SpaceTimeAStar::default();
        let (mut agent_mod, path_events) = modifier(1, &ctx);

        let mut agent = Agent::new(AgentId(1), Point3D::new(0.0, 5.0, 5.0), 1.0);
        agent.set_goal(Point3D::new(9.0, 5.0, 5.0), &planner, &ctx).unwrap();
        agent.start();

        // no map change yet
        assert!(!agent_mod.poll_map_events(&mut agent, &planner, &ctx));

        ctx.grid().write().mark_occupied(&Point3D::new(5.0, 5.0, 5.0));
        assert!(agent_mod.poll_map_events(&mut agent, &planner, &ctx));

        let grid = ctx.grid().read();
        assert!(agent.path().points.iter().all(|p| !grid.is_occupied(p)));
        assert_eq!(agent.path().last(), Some(&Point3D::new(9.0, 5.0, 5.0)));

        let event = path_events.try_recv().unwrap();
        assert_eq!(event.agent, AgentId(1));
        assert_eq!(&event.path, agent.path());
    }

    #[test]
    fn test_unaffected_path_is_kept() {
        let ctx = context();
        let planner = SpaceTimeAStar::default();
        let (mut agent_mod, path_events) = modifier(1, &ctx);

        let mut agent = Agent::new(AgentId(1), Point3D::new(0.0, 5.0, 5.0), 1.0);
        agent.set_goal(Point3D::new(9.0, 5.0, 5.0), &planner, &ctx).unwrap();
        let before = agent.path().clone();

        ctx.grid().write().mark_occupied(&Point3D::new(5.0, 0.0, 0.0));
        assert!(!agent_mod.poll_map_events(&mut agent, &planner, &ctx));
        assert_eq!(agent.path(), &before);
        assert!(path_events.try_recv().is_err());
    }

    #[test]
    fn test_failed_replan_keeps_path() {
        let ctx = context();
        let planner = SpaceTimeAStar::default();
        let (mut agent_mod, _) = modifier(1, &ctx);

        let mut agent = Agent::new(AgentId(1), Point3D::new(0.0, 5.0, 5.0), 1.0);
        agent.set_goal(Point3D::new(9.0, 5.0, 5.0), &planner, &ctx).unwrap();
        let before = agent.path().clone();

        // occupying the goal makes every replan fail
        ctx.grid().write().mark_occupied(&Point3D::new(9.0, 5.0, 5.0));
        assert!(!agent_mod.poll_map_events(&mut agent, &planner, &ctx));
        assert_eq!(agent.path(), &before);
    }
}
