// Path Planning module: space-time search, reservations and smoothing

pub mod context;
pub mod heuristic;
pub mod path_smoother;
pub mod reservation_table;
pub mod space_time_a_star;

pub use context::*;
pub use heuristic::*;
pub use path_smoother::*;
pub use reservation_table::*;
pub use space_time_a_star::*;
