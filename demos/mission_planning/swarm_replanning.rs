//! Swarm Replanning Example
//!
//! Plans a small swarm, starts it, then drops a new obstacle onto one
//! agent's route and lets the path modifiers repair the affected paths.

use std::sync::Arc;

use swarm_planning::common::{AgentId, Point3D};
use swarm_planning::mapping::GridMapConfig;
use swarm_planning::path_tracking::Agent;
use swarm_planning::utils::ManualClock;
use swarm_planning::{Clock, SwarmConfig};

fn main() {
    env_logger::init();
    println!("Swarm replanning start!!");

    let config = SwarmConfig {
        grid: GridMapConfig {
            origin: Point3D::new(10.0, 10.0, 5.0),
            size: Point3D::new(20.0, 20.0, 10.0),
            ..Default::default()
        },
        ..Default::default()
    };

    let clock = Arc::new(ManualClock::default());
    let mut swarm = match config.build_coordinator(clock.clone()) {
        Ok(swarm) => swarm,
        Err(err) => {
            eprintln!("Failed to build swarm: {}", err);
            return;
        }
    };

    let routes = [
        (Point3D::new(1.5, 10.5, 5.5), Point3D::new(18.5, 10.5, 5.5)),
        (Point3D::new(10.5, 1.5, 5.5), Point3D::new(10.5, 18.5, 5.5)),
        (Point3D::new(1.5, 1.5, 2.5), Point3D::new(18.5, 18.5, 7.5)),
        (Point3D::new(18.5, 1.5, 5.5), Point3D::new(1.5, 18.5, 5.5)),
    ];
    for (i, (start, goal)) in routes.iter().enumerate() {
        let agent = Agent::new(AgentId(i as u32 + 1), *start, config.default_speed);
        swarm.add_task(agent, *start, *goal);
    }

    let summary = swarm.plan_all();
    println!("Planned {} agents, failed: {:?}", summary.planned, summary.failed);
    for task in swarm.tasks() {
        println!(
            "  agent {} priority {} start {:.2}s duration {:.2}s",
            task.agent, task.priority, task.start_time, task.estimated_duration
        );
    }
    swarm.start_all();

    let events = swarm.path_events();
    clock.advance(1.0);

    // A newly perceived obstacle lands on the first agent's lane
    let scan: Vec<Point3D> = (9..12).map(|y| Point3D::new(12.5, y as f64 + 0.5, 5.5)).collect();
    let marked = swarm.context().grid().write().mark_occupied_batch(scan);
    println!("\nPerception marked {} cells", marked);

    let replanned = swarm.process_map_updates();
    println!("{} agents replanned", replanned);
    for event in events.try_iter() {
        println!("  agent {} now follows {} waypoints", event.agent, event.path.len());
    }

    for (agent, action) in swarm.tick(clock.now()) {
        println!("  agent {}: {:?}", agent, action);
    }

    println!("\n{}", swarm.reservation_dump());
    println!("Swarm replanning finish!!");
}
