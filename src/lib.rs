//! swarm_planning - collision-free route planning for agent swarms
//!
//! This crate plans routes for many mobile agents through a shared voxel
//! map. Agents are planned one at a time with a time-windowed 3D A* that
//! treats earlier agents' committed trajectories as moving obstacles, and
//! routes are repaired when the map changes.

// Core modules
pub mod common;
pub mod config;
pub mod utils;

// Algorithm modules
pub mod mapping;
pub mod path_planning;
pub mod path_tracking;
pub mod mission_planning;

// Re-export common types for convenience
pub use common::{AgentId, CylinderObstacle, GridIndex, Path3D, Point3D, SpaceTimePoint};
pub use common::{Clock, SpaceTimePlanner};
pub use common::{SwarmError, SwarmResult};
pub use config::SwarmConfig;
