//! Space-time A* Path Planning Example
//!
//! Plans a single agent through a voxel map with a cylindrical pillar on
//! the straight line between start and goal, then prints the committed
//! reservation.

use std::sync::Arc;

use swarm_planning::common::{AgentId, Point3D};
use swarm_planning::mapping::GridMap;
use swarm_planning::path_planning::{AStarConfig, PlanningContext, ReservationTable, SpaceTimeAStar};
use swarm_planning::utils::ManualClock;

fn main() {
    env_logger::init();
    println!("Space-time A* path planning start!!");

    // 20 x 20 x 6 volume, unit voxels
    let mut grid = match GridMap::with_bounds(Point3D::new(10.0, 10.0, 3.0), Point3D::new(20.0, 20.0, 6.0), 1.0) {
        Ok(grid) => grid,
        Err(err) => {
            eprintln!("Failed to create grid: {}", err);
            return;
        }
    };

    let pillar = Point3D::new(10.0, 10.0, 3.0);
    if let Err(err) = grid.add_cylindrical_obstacles(&[pillar], 3.0, 6.0, 0.5) {
        eprintln!("Failed to add obstacle: {}", err);
        return;
    }
    println!("Occupied cells: {}", grid.occupied_count());

    let ctx = PlanningContext::with_clock(grid, ReservationTable::default(), Arc::new(ManualClock::default()));
    let planner = SpaceTimeAStar::new(AStarConfig {
        heuristic_weight: 1.0,
        ..Default::default()
    });

    let start = Point3D::new(1.5, 10.5, 3.5);
    let goal = Point3D::new(18.5, 10.5, 3.5);

    match planner.find_path(&ctx, start, goal, AgentId(1), 2.0) {
        Ok(result) => {
            println!("\n=== Results ===");
            println!(
                "Path: {} waypoints, length: {:.2} (straight line {:.2})",
                result.path.len(),
                result.path.total_length(),
                start.distance(&goal)
            );
            println!("Search cost: {:.2}, expansions: {}", result.cost, result.expansions);
            for point in &result.path.points {
                println!("  {}", point);
            }
            println!("\n{}", ctx.reservations().read().dump());
        }
        Err(err) => {
            println!("Planning failed: {}", err);
        }
    }

    println!("Space-time A* path planning finish!!");
}
