// Mission Planning module: multi-agent coordination

pub mod swarm_coordinator;

pub use swarm_coordinator::*;
