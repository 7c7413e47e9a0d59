//! Error types for swarm_planning

use thiserror::Error;

use crate::common::types::{AgentId, Point3D};

/// Which end of a planning request a precondition failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Start,
    Goal,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Start => write!(f, "start"),
            Endpoint::Goal => write!(f, "goal"),
        }
    }
}

/// Main error type for planning, mapping and coordination
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SwarmError {
    /// The grid map has not been initialized
    #[error("grid map is not initialized")]
    NotInitialized,

    /// Invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Referenced agent is not registered
    #[error("unknown agent {0}")]
    UnknownAgent(AgentId),

    /// Start or goal lies outside the grid
    #[error("{endpoint} position {position} is outside the grid")]
    OutOfBounds { endpoint: Endpoint, position: Point3D },

    /// Start or goal lies in an occupied cell
    #[error("{endpoint} position {position} is occupied")]
    Occupied { endpoint: Endpoint, position: Point3D },

    /// Open set exhausted without reaching the goal
    #[error("no path found after {expansions} expansions")]
    NoPath { expansions: usize },

    /// Wall-clock search budget exceeded
    #[error("search timed out after {expansions} expansions")]
    Timeout { expansions: usize },

    /// Expansion-count budget exceeded
    #[error("search exceeded {limit} expansions")]
    ExpansionLimit { limit: usize },

    /// Found trajectory collides with another agent's reservation
    #[error("trajectory for agent {agent} conflicts with reservations at sample {sample}")]
    ReservationConflict { agent: AgentId, sample: usize },
}

impl SwarmError {
    /// Search exhaustion failures are ordinary outcomes rather than misuse
    pub fn is_search_exhaustion(&self) -> bool {
        matches!(
            self,
            SwarmError::NoPath { .. } | SwarmError::Timeout { .. } | SwarmError::ExpansionLimit { .. }
        )
    }
}

/// Result type alias for swarm planning operations
pub type SwarmResult<T> = Result<T, SwarmError>;
