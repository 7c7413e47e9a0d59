//! Utility modules for swarm_planning

pub mod clock;

pub use clock::{ManualClock, MonotonicClock};
