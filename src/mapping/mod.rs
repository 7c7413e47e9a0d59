// Mapping module: voxel occupancy and change notification

pub mod map_events;
pub mod voxel_grid_map;

pub use map_events::{MapEvent, MapEventBus};
pub use voxel_grid_map::{GridMap, GridMapConfig};
