// Swarm crossing demo
// Random pillars, four agents crossing the map, reservation dump at the end.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use swarm_planning::common::{AgentId, Point3D};
use swarm_planning::mapping::GridMapConfig;
use swarm_planning::path_tracking::Agent;
use swarm_planning::utils::MonotonicClock;
use swarm_planning::SwarmConfig;

const PILLAR_COUNT: usize = 12;
const SEED: u64 = 42;

fn main() {
    env_logger::init();
    println!("Swarm demo start!!");

    let config = SwarmConfig {
        grid: GridMapConfig {
            origin: Point3D::new(15.0, 15.0, 5.0),
            size: Point3D::new(30.0, 30.0, 10.0),
            resolution: 1.0,
            inflation_radius: 0.5,
        },
        ..Default::default()
    };

    let mut swarm = match config.build_coordinator(Arc::new(MonotonicClock::new())) {
        Ok(swarm) => swarm,
        Err(err) => {
            eprintln!("Failed to build swarm: {}", err);
            return;
        }
    };

    // Keep pillars away from the start and goal columns along the border
    let mut rng = StdRng::seed_from_u64(SEED);
    let pillars: Vec<Point3D> = (0..PILLAR_COUNT)
        .map(|_| Point3D::new(rng.gen_range(6.0..24.0), rng.gen_range(6.0..24.0), 5.0))
        .collect();
    {
        let mut grid = swarm.context().grid().write();
        if let Err(err) = grid.add_cylindrical_obstacles(&pillars, 1.0, 10.0, config.grid.inflation_radius) {
            eprintln!("Failed to add pillars: {}", err);
            return;
        }
        println!("{} pillars, {} occupied cells", pillars.len(), grid.occupied_count());
    }

    let routes = [
        (Point3D::new(1.5, 15.5, 5.5), Point3D::new(28.5, 15.5, 5.5)),
        (Point3D::new(15.5, 1.5, 5.5), Point3D::new(15.5, 28.5, 5.5)),
        (Point3D::new(28.5, 15.5, 5.5), Point3D::new(1.5, 15.5, 5.5)),
        (Point3D::new(1.5, 1.5, 5.5), Point3D::new(28.5, 28.5, 5.5)),
    ];
    for (i, (start, goal)) in routes.iter().enumerate() {
        let agent = Agent::new(AgentId(i as u32 + 1), *start, config.default_speed);
        swarm.add_task(agent, *start, *goal);
    }

    let summary = swarm.plan_all();
    println!("Planned {} agents, failed: {:?}", summary.planned, summary.failed);
    for agent in swarm.tasks().iter().filter_map(|t| t.path.as_ref().map(|p| (t.agent, p))) {
        println!("  agent {}: {} waypoints, {:.2} long", agent.0, agent.1.len(), agent.1.total_length());
    }

    swarm.start_all();
    println!("\n{}", swarm.reservation_dump());
    println!("Swarm demo finish!!");
}
