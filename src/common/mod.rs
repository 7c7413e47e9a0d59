//! Common types, traits, and error definitions for swarm_planning
//!
//! This module provides the foundational building blocks shared by the
//! map, the planners and the coordination layer.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
