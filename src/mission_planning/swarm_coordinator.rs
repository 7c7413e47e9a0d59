//! Multi-agent mission coordination
//!
//! The coordinator owns the fleet, orders planning tasks by priority and
//! plans them one after another against the shared reservation table. Each
//! commit constrains every later search, which is what keeps the swarm
//! collision free.

use std::collections::BTreeMap;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, info, warn};

use crate::common::{AgentId, Path3D, Point3D, SpaceTimePlanner, SwarmError, SwarmResult};
use crate::path_planning::{PlanningContext, SpaceTimeAStar};
use crate::path_tracking::{Agent, AgentSnapshot, PathModified, PathModifier, PathModifierConfig, TickAction};

/// One agent's entry in a planning campaign
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningTask {
    pub agent: AgentId,
    pub start: Point3D,
    pub goal: Point3D,
    pub path: Option<Path3D>,
    /// Sum of the estimated durations of the tasks planned before this one
    pub start_time: f64,
    pub estimated_duration: f64,
    /// Whole units of straight-line distance; longer routes plan first
    pub priority: u32,
}

impl PlanningTask {
    fn new(agent: AgentId, start: Point3D, goal: Point3D) -> Self {
        Self {
            agent,
            start,
            goal,
            path: None,
            start_time: 0.0,
            estimated_duration: 0.0,
            priority: start.distance(&goal).floor() as u32,
        }
    }

    pub fn distance(&self) -> f64 {
        self.start.distance(&self.goal)
    }
}

/// Outcome of [`SwarmCoordinator::plan_all`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlanSummary {
    pub planned: usize,
    pub failed: Vec<AgentId>,
}

struct FleetMember {
    agent: Agent,
    modifier: PathModifier,
}

/// Priority-ordered sequential planner and fleet controller
pub struct SwarmCoordinator<P: SpaceTimePlanner = SpaceTimeAStar> {
    ctx: PlanningContext,
    planner: P,
    modifier_config: PathModifierConfig,
    fleet: BTreeMap<AgentId, FleetMember>,
    tasks: Vec<PlanningTask>,
    paused: bool,
    events_tx: Sender<PathModified>,
    events_rx: Receiver<PathModified>,
}

impl<P: SpaceTimePlanner> SwarmCoordinator<P> {
    pub fn new(ctx: PlanningContext, planner: P, modifier_config: PathModifierConfig) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            ctx,
            planner,
            modifier_config,
            fleet: BTreeMap::new(),
            tasks: Vec::new(),
            paused: false,
            events_tx,
            events_rx,
        }
    }

    pub fn context(&self) -> &PlanningContext {
        &self.ctx
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    pub fn tasks(&self) -> &[PlanningTask] {
        &self.tasks
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.fleet.get(&id).map(|m| &m.agent)
    }

    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.fleet.get_mut(&id).map(|m| &mut m.agent)
    }

    /// Agents ordered by id
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.fleet.values().map(|m| &m.agent)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Receiver for replanned-path notifications from every agent
    pub fn path_events(&self) -> Receiver<PathModified> {
        self.events_rx.clone()
    }

    /// Register `agent` with a start and goal for the next campaign
    ///
    /// Re-adding an agent replaces its previous task.
    pub fn add_task(&mut self, mut agent: Agent, start: Point3D, goal: Point3D) {
        let id = agent.id();
        agent.set_goal_position(goal);

        let modifier = PathModifier::new(id, &self.ctx, self.events_tx.clone(), self.modifier_config.clone());
        self.fleet.insert(id, FleetMember { agent, modifier });

        self.tasks.retain(|t| t.agent != id);
        let task = PlanningTask::new(id, start, goal);
        info!(
            "[Swarm] task for agent {}: {} -> {} (priority {})",
            id, start, goal, task.priority
        );
        self.tasks.push(task);
    }

    pub fn clear_tasks(&mut self) {
        self.tasks.clear();
    }

    /// Plan every task, longest first
    ///
    /// A failed task is logged and skipped; it never affects the others.
    pub fn plan_all(&mut self) -> PlanSummary {
        self.tasks.sort_by(|a, b| b.distance().total_cmp(&a.distance()));

        let mut summary = PlanSummary::default();
        let mut offset = 0.0;

        for task in &mut self.tasks {
            task.start_time = offset;
            task.path = None;
            task.estimated_duration = 0.0;

            let speed = match self.fleet.get(&task.agent) {
                Some(member) => member.agent.speed(),
                None => {
                    warn!("[Swarm] {}", SwarmError::UnknownAgent(task.agent));
                    summary.failed.push(task.agent);
                    continue;
                }
            };

            match self.planner.find_path(&self.ctx, task.start, task.goal, task.agent, speed) {
                Ok(result) => {
                    let duration = match (result.reservation.first(), result.reservation.last()) {
                        (Some(first), Some(last)) => last.time - first.time,
                        _ => 0.0,
                    };
                    task.estimated_duration = duration;
                    task.path = Some(result.path);
                    offset += duration;
                    summary.planned += 1;
                }
                Err(err) => {
                    if err.is_search_exhaustion() || matches!(err, SwarmError::ReservationConflict { .. }) {
                        warn!("[Swarm] no route for agent {}: {}", task.agent, err);
                    } else {
                        error!("[Swarm] invalid task for agent {}: {}", task.agent, err);
                    }
                    summary.failed.push(task.agent);
                }
            }
        }

        info!(
            "[Swarm] planned {} of {} tasks ({} failed)",
            summary.planned,
            self.tasks.len(),
            summary.failed.len()
        );
        summary
    }

    /// Hand every planned path to its agent and set it moving
    pub fn start_all(&mut self) -> usize {
        let mut started = 0;
        for task in &self.tasks {
            let member = match self.fleet.get_mut(&task.agent) {
                Some(member) => member,
                None => continue,
            };
            match &task.path {
                Some(path) => {
                    member.agent.set_path(path.clone());
                    if member.agent.start() {
                        started += 1;
                    }
                }
                None => warn!("[Swarm] agent {} has no plan, not starting", task.agent),
            }
        }
        self.paused = false;
        info!("[Swarm] started {} agents", started);
        started
    }

    pub fn stop_all(&mut self) {
        for member in self.fleet.values_mut() {
            member.agent.stop();
            member.modifier.cancel_resume();
        }
        self.paused = true;
        info!("[Swarm] all agents stopped");
    }

    /// Pause a running swarm or resume a paused one
    pub fn toggle_all(&mut self) {
        if self.paused {
            let mut resumed = 0;
            for member in self.fleet.values_mut() {
                if member.agent.resume() {
                    resumed += 1;
                }
            }
            self.paused = false;
            info!("[Swarm] resumed {} agents", resumed);
        } else {
            self.stop_all();
        }
    }

    /// Report a new live position for an agent
    pub fn set_agent_position(&mut self, id: AgentId, position: Point3D) -> SwarmResult<()> {
        let member = self.fleet.get_mut(&id).ok_or(SwarmError::UnknownAgent(id))?;
        member.agent.set_position(position);
        Ok(())
    }

    /// Retarget one agent and replan it from its live position
    pub fn set_goal(&mut self, id: AgentId, goal: Point3D) -> SwarmResult<()> {
        let member = self.fleet.get_mut(&id).ok_or(SwarmError::UnknownAgent(id))?;
        member.agent.set_goal(goal, &self.planner, &self.ctx)
    }

    /// Let every agent react to pending map changes; returns how many replanned
    pub fn process_map_updates(&mut self) -> usize {
        let mut modified = 0;
        for member in self.fleet.values_mut() {
            if member.modifier.poll_map_events(&mut member.agent, &self.planner, &self.ctx) {
                modified += 1;
            }
        }
        modified
    }

    /// Run the yielding logic of every agent at session time `now`
    pub fn tick(&mut self, now: f64) -> Vec<(AgentId, TickAction)> {
        let lookahead = self.modifier_config.heading_lookahead;
        let peers: Vec<AgentSnapshot> = self.fleet.values().map(|m| m.agent.snapshot(lookahead)).collect();

        self.fleet
            .iter_mut()
            .map(|(&id, member)| (id, member.modifier.tick(&mut member.agent, &peers, &self.ctx, now)))
            .filter(|(_, action)| *action != TickAction::None)
            .collect()
    }

    pub fn reservation_dump(&self) -> String {
        self.ctx.reservations().read().dump()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::mapping::GridMap;
    use crate::path_planning::{PathResult, ReservationTable};
    use crate::utils::ManualClock;

    fn context() -> PlanningContext {
        let grid = GridMap::with_bounds(Point3D::new(4.5, 4.5, 4.5), Point3D::new(10.0, 10.0, 10.0), 1.0).unwrap();
        PlanningContext::with_clock(grid, ReservationTable::default(), Arc::new(ManualClock::default()))
    }

    fn coordinator() -> SwarmCoordinator {
        SwarmCoordinator::new(context(), SpaceTimeAStar::default(), PathModifierConfig::default())
    }

    fn add(swarm: &mut SwarmCoordinator, id: u32, start: Point3D, goal: Point3D) {
        swarm.add_task(Agent::new(AgentId(id), start, 1.0), start, goal);
    }

    /// Refuses one agent and records the order of requests
    struct SelectivePlanner {
        refuse: AgentId,
        inner: SpaceTimeAStar,
        calls: parking_lot::Mutex<Vec<AgentId>>,
    }

    impl SpaceTimePlanner for SelectivePlanner {
        fn find_path(
            &self,
            ctx: &PlanningContext,
            start: Point3D,
            goal: Point3D,
            agent: AgentId,
            speed: f64,
        ) -> SwarmResult<PathResult> {
            self.calls.lock().push(agent);
            if agent == self.refuse {
                return Err(SwarmError::NoPath { expansions: 0 });
            }
            self.inner.find_path(ctx, start, goal, agent, speed)
        }
    }

    #[test]
    fn test_tasks_ordered_by_descending_distance() {
        let mut swarm = coordinator();
        add(&mut swarm, 1, Point3D::new(0.0, 0.0, 0.0), Point3D::new(2.0, 0.0, 0.0));
        add(&mut swarm, 2, Point3D::new(0.0, 9.0, 0.0), Point3D::new(9.0, 9.0, 0.0));
        add(&mut swarm, 3, Point3D::new(0.0, 0.0, 9.0), Point3D::new(2.0, 0.0, 9.0));
        add(&mut swarm, 4, Point3D::new(9.0, 0.0, 0.0), Point3D::new(9.0, 5.5, 0.0));

        let summary = swarm.plan_all();
        assert_eq!(summary.planned, 4);
        assert!(summary.failed.is_empty());

        let order: Vec<AgentId> = swarm.tasks().iter().map(|t| t.agent).collect();
        // equal distances keep insertion order
        assert_eq!(order, vec![AgentId(2), AgentId(4), AgentId(1), AgentId(3)]);
        let priorities: Vec<u32> = swarm.tasks().iter().map(|t| t.priority).collect();
        assert_eq!(priorities, vec![9, 5, 2, 2]);
    }

    #[test]
    fn test_start_times_accumulate_durations() {
        let mut swarm = coordinator();
        add(&mut swarm, 1, Point3D::new(0.0, 0.0, 0.0), Point3D::new(6.0, 0.0, 0.0));
        add(&mut swarm, 2, Point3D::new(0.0, 9.0, 9.0), Point3D::new(3.0, 9.0, 9.0));
        swarm.plan_all();

        let tasks = swarm.tasks();
        assert_eq!(tasks[0].start_time, 0.0);
        assert!((tasks[0].estimated_duration - 6.0).abs() < 1e-9);
        assert!((tasks[1].start_time - 6.0).abs() < 1e-9);
        assert!((tasks[1].estimated_duration - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_task_does_not_block_others() {
        let planner = SelectivePlanner {
            refuse: AgentId(2),
            inner: SpaceTimeAStar::default(),
            calls: parking_lot::Mutex::new(Vec::new()),
        };
        let mut swarm = SwarmCoordinator::new(context(), planner, PathModifierConfig::default());
        swarm.add_task(Agent::new(AgentId(1), Point3D::origin(), 1.0), Point3D::origin(), Point3D::new(3.0, 0.0, 0.0));
        swarm.add_task(
            Agent::new(AgentId(2), Point3D::new(0.0, 9.0, 0.0), 1.0),
            Point3D::new(0.0, 9.0, 0.0),
            Point3D::new(9.0, 9.0, 0.0),
        );

        let summary = swarm.plan_all();
        assert_eq!(summary.planned, 1);
        assert_eq!(summary.failed, vec![AgentId(2)]);
        assert_eq!(*swarm.planner().calls.lock(), vec![AgentId(2), AgentId(1)]);

        assert_eq!(swarm.start_all(), 1);
        assert!(swarm.agent(AgentId(1)).unwrap().is_moving());
        assert!(!swarm.agent(AgentId(2)).unwrap().is_moving());
        assert_eq!(swarm.context().reservations().read().agents(), vec![AgentId(1)]);
    }

    #[test]
    fn test_start_stop_toggle() {
        let mut swarm = coordinator();
        add(&mut swarm, 1, Point3D::new(0.0, 0.0, 0.0), Point3D::new(5.0, 0.0, 0.0));
        add(&mut swarm, 2, Point3D::new(0.0, 9.0, 0.0), Point3D::new(5.0, 9.0, 0.0));
        swarm.plan_all();

        assert_eq!(swarm.start_all(), 2);
        assert!(swarm.agents().all(|a| a.is_moving()));

        swarm.toggle_all();
        assert!(swarm.is_paused());
        assert!(swarm.agents().all(|a| !a.is_moving()));

        swarm.toggle_all();
        assert!(!swarm.is_paused());
        assert!(swarm.agents().all(|a| a.is_moving()));

        swarm.stop_all();
        assert!(swarm.agents().all(|a| !a.is_moving()));
    }

    #[test]
    fn test_crossing_swarm_has_no_conflicts() {
        let mut swarm = coordinator();
        add(&mut swarm, 1, Point3D::new(0.0, 5.0, 5.0), Point3D::new(9.0, 5.0, 5.0));
        add(&mut swarm, 2, Point3D::new(5.0, 0.0, 5.0), Point3D::new(5.0, 9.0, 5.0));
        assert_eq!(swarm.plan_all().planned, 2);

        let table = swarm.context().reservations().read();
        for agent in table.agents() {
            let points = table.get(agent).unwrap().points();
            assert_eq!(table.first_conflict(&points[1..], agent), None);
        }
    }

    #[test]
    fn test_map_update_triggers_replanning_event() {
        let mut swarm = coordinator();
        add(&mut swarm, 1, Point3D::new(0.0, 5.0, 5.0), Point3D::new(9.0, 5.0, 5.0));
        swarm.plan_all();
        swarm.start_all();
        let events = swarm.path_events();

        assert_eq!(swarm.process_map_updates(), 0);
        swarm.context().grid().write().mark_occupied(&Point3D::new(6.0, 5.0, 5.0));
        assert_eq!(swarm.process_map_updates(), 1);

        let event = events.try_recv().unwrap();
        assert_eq!(event.agent, AgentId(1));
        assert_eq!(Some(&event.path), swarm.agent(AgentId(1)).map(|a| a.path()));
    }

    #[test]
    fn test_unknown_agent() {
        let mut swarm = coordinator();
        assert_eq!(
            swarm.set_agent_position(AgentId(9), Point3D::origin()),
            Err(SwarmError::UnknownAgent(AgentId(9)))
        );
        assert_eq!(
            swarm.set_goal(AgentId(9), Point3D::origin()),
            Err(SwarmError::UnknownAgent(AgentId(9)))
        );
    }

    #[test]
    fn test_tick_reports_yield() {
        let mut swarm = coordinator();
        add(&mut swarm, 1, Point3D::new(0.0, 5.0, 5.0), Point3D::new(9.0, 5.0, 5.0));
        add(&mut swarm, 2, Point3D::new(0.0, 2.0, 5.0), Point3D::new(9.0, 2.0, 5.0));
        swarm.plan_all();
        swarm.start_all();

        // locomotion places agent 2 just behind agent 1 on the same lane
        swarm.set_agent_position(AgentId(1), Point3D::new(3.0, 5.0, 5.0)).unwrap();
        swarm.agent_mut(AgentId(1)).unwrap().resume();
        swarm.set_agent_position(AgentId(2), Point3D::new(2.2, 5.0, 5.0)).unwrap();
        swarm.agent_mut(AgentId(2)).unwrap().set_path(Path3D::from_points(vec![
            Point3D::new(2.0, 5.0, 5.0),
            Point3D::new(9.0, 5.0, 5.0),
        ]));

        let actions = swarm.tick(1.0);
        assert_eq!(actions, vec![(AgentId(2), TickAction::Yielded { to: AgentId(1) })]);
        assert!(!swarm.agent(AgentId(2)).unwrap().is_moving());

        swarm.set_agent_position(AgentId(1), Point3D::new(6.0, 5.0, 5.0)).unwrap();
        assert!(swarm.tick(1.2).is_empty());
        assert_eq!(swarm.tick(1.5), vec![(AgentId(2), TickAction::Resumed)]);
    }

    #[test]
    fn test_clear_tasks_and_dump() {
        let mut swarm = coordinator();
        add(&mut swarm, 1, Point3D::new(0.0, 0.0, 0.0), Point3D::new(2.0, 0.0, 0.0));
        swarm.plan_all();
        assert!(swarm.reservation_dump().contains("agent 1 (3 samples)"));

        swarm.clear_tasks();
        assert!(swarm.tasks().is_empty());
        assert_eq!(swarm.plan_all(), PlanSummary::default());
    }
}
