// Path Tracking module: agent state and reactive path modification

pub mod agent;
pub mod path_modifier;

pub use agent::*;
pub use path_modifier::*;
