//! Voxel occupancy grid map
//!
//! A dense 3D boolean lattice centered on a world-space origin. Obstacles are
//! rasterized as vertical cylinders and can be inflated by a safety margin.
//! Every mutation publishes a [`MapEvent`] after it has been applied.

use crossbeam_channel::Receiver;
use itertools::iproduct;
use log::{debug, info, warn};

use crate::common::{CylinderObstacle, GridIndex, Point3D, SwarmError, SwarmResult};
use crate::mapping::map_events::{MapEvent, MapEventBus};

/// Configuration for the voxel grid map
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridMapConfig {
    /// World-space center of the mapped volume
    pub origin: Point3D,
    /// Extent of the mapped volume along each axis
    pub size: Point3D,
    /// Edge length of one voxel
    pub resolution: f64,
    /// Default inflation applied by callers when adding obstacles
    pub inflation_radius: f64,
}

impl Default for GridMapConfig {
    fn default() -> Self {
        Self {
            origin: Point3D::origin(),
            size: Point3D::new(50.0, 50.0, 10.0),
            resolution: 1.0,
            inflation_radius: 0.3,
        }
    }
}

/// 3D voxel occupancy map
#[derive(Debug, Default)]
pub struct GridMap {
    /// Minimum corner of the grid
    origin: Point3D,
    size: Point3D,
    resolution: f64,
    dims: [usize; 3],
    cells: Vec<bool>,
    obstacles: Vec<CylinderObstacle>,
    events: MapEventBus,
}

impl GridMap {
    /// Create an uninitialized map; call [`GridMap::initialize`] before use
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and initialize a map in one step
    pub fn with_bounds(origin: Point3D, size: Point3D, resolution: f64) -> SwarmResult<Self> {
        let mut map = Self::new();
        map.initialize(origin, size, resolution)?;
        Ok(map)
    }

    pub fn from_config(config: &GridMapConfig) -> SwarmResult<Self> {
        Self::with_bounds(config.origin, config.size, config.resolution)
    }

    /// Allocate the lattice centered on `origin`; every cell starts free
    ///
    /// Existing subscribers stay registered. On error the map is left as it was.
    pub fn initialize(&mut self, origin: Point3D, size: Point3D, resolution: f64) -> SwarmResult<()> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(SwarmError::InvalidParameter(format!(
                "resolution must be positive, got {}",
                resolution
            )));
        }
        if !(size.x > 0.0 && size.y > 0.0 && size.z > 0.0) || !size.to_vector().iter().all(|v| v.is_finite()) {
            return Err(SwarmError::InvalidParameter(format!(
                "map size must be positive and finite on every axis, got {}",
                size
            )));
        }

        // grid indices are i32, so no axis may hold more cells than that
        let mut dims = [0usize; 3];
        for (dim, extent) in dims.iter_mut().zip([size.x, size.y, size.z]) {
            let count = (extent / resolution).ceil();
            if count > i32::MAX as f64 {
                return Err(SwarmError::InvalidParameter(format!(
                    "{} cells on one axis exceeds the index range",
                    count
                )));
            }
            *dim = count as usize;
        }
        let cell_count = dims[0]
            .checked_mul(dims[1])
            .and_then(|n| n.checked_mul(dims[2]))
            .ok_or_else(|| {
                SwarmError::InvalidParameter(format!(
                    "{} x {} x {} cells overflows the lattice size",
                    dims[0], dims[1], dims[2]
                ))
            })?;

        self.origin = Point3D::new(origin.x - size.x / 2.0, origin.y - size.y / 2.0, origin.z - size.z / 2.0);
        self.size = size;
        self.resolution = resolution;
        self.dims = dims;
        self.cells = vec![false; cell_count];
        self.obstacles.clear();

        info!(
            "[GridMap] initialized {} x {} x {} cells, min corner {}, size {}, resolution {}",
            dims[0], dims[1], dims[2], self.origin, size, resolution
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.dims.iter().all(|&d| d > 0)
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Minimum corner of the grid in world coordinates
    pub fn origin(&self) -> Point3D {
        self.origin
    }

    pub fn size(&self) -> Point3D {
        self.size
    }

    /// World-space center of the mapped volume
    pub fn center(&self) -> Point3D {
        Point3D::new(
            self.origin.x + self.size.x / 2.0,
            self.origin.y + self.size.y / 2.0,
            self.origin.z + self.size.z / 2.0,
        )
    }

    /// Whether `point` lies inside the continuous map bounds (inclusive)
    pub fn contains_point(&self, point: &Point3D) -> bool {
        self.is_initialized()
            && point.x >= self.origin.x
            && point.x <= self.origin.x + self.size.x
            && point.y >= self.origin.y
            && point.y <= self.origin.y + self.size.y
            && point.z >= self.origin.z
            && point.z <= self.origin.z + self.size.z
    }

    pub fn obstacles(&self) -> &[CylinderObstacle] {
        &self.obstacles
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Register an observer for map change events
    pub fn subscribe(&mut self) -> Receiver<MapEvent> {
        let rx = self.events.subscribe();
        debug!("[GridMap] {} map subscribers", self.events.subscriber_count());
        rx
    }

    /// Unchecked floor division into grid units; may lie outside the grid
    fn raw_grid_coords(&self, pos: &Point3D) -> (i64, i64, i64) {
        (
            ((pos.x - self.origin.x) / self.resolution).floor() as i64,
            ((pos.y - self.origin.y) / self.resolution).floor() as i64,
            ((pos.z - self.origin.z) / self.resolution).floor() as i64,
        )
    }

    fn raw_in_bounds(&self, (x, y, z): (i64, i64, i64)) -> bool {
        x >= 0
            && y >= 0
            && z >= 0
            && (x as u64) < self.dims[0] as u64
            && (y as u64) < self.dims[1] as u64
            && (z as u64) < self.dims[2] as u64
    }

    /// Convert a world position to the index of the cell containing it
    pub fn world_to_grid(&self, pos: &Point3D) -> Option<GridIndex> {
        if !self.is_initialized() {
            return None;
        }
        let raw = self.raw_grid_coords(pos);
        if self.raw_in_bounds(raw) {
            Some(GridIndex::new(raw.0 as i32, raw.1 as i32, raw.2 as i32))
        } else {
            None
        }
    }

    /// World position of the center of a cell
    pub fn grid_to_world(&self, index: GridIndex) -> Point3D {
        Point3D::new(
            self.origin.x + (index.x as f64 + 0.5) * self.resolution,
            self.origin.y + (index.y as f64 + 0.5) * self.resolution,
            self.origin.z + (index.z as f64 + 0.5) * self.resolution,
        )
    }

    pub fn is_in_bounds(&self, index: GridIndex) -> bool {
        self.raw_in_bounds((index.x as i64, index.y as i64, index.z as i64))
    }

    fn flat_index(&self, index: GridIndex) -> usize {
        (index.x as usize * self.dims[1] + index.y as usize) * self.dims[2] + index.z as usize
    }

    fn unflatten(&self, flat: usize) -> GridIndex {
        let z = flat % self.dims[2];
        let y = (flat / self.dims[2]) % self.dims[1];
        let x = flat / (self.dims[2] * self.dims[1]);
        GridIndex::new(x as i32, y as i32, z as i32)
    }

    /// Occupancy of a cell; out-of-bounds cells read as free
    pub fn is_cell_occupied(&self, index: GridIndex) -> bool {
        self.is_in_bounds(index) && self.cells[self.flat_index(index)]
    }

    /// Occupancy at a world position; out-of-bounds positions read as free
    pub fn is_occupied(&self, pos: &Point3D) -> bool {
        match self.world_to_grid(pos) {
            Some(index) => self.cells[self.flat_index(index)],
            None => false,
        }
    }

    fn set_cell(&mut self, index: GridIndex) {
        let flat = self.flat_index(index);
        self.cells[flat] = true;
    }

    /// Mark the cell containing `pos`; returns whether `pos` was inside the grid
    pub fn mark_occupied(&mut self, pos: &Point3D) -> bool {
        match self.world_to_grid(pos) {
            Some(index) => {
                self.set_cell(index);
                self.events.publish(MapEvent::CellMarked { position: *pos });
                true
            }
            None => false,
        }
    }

    /// Mark every in-bounds position of one perception scan, then notify once
    pub fn mark_occupied_batch<I>(&mut self, positions: I) -> usize
    where
        I: IntoIterator<Item = Point3D>,
    {
        let mut count = 0;
        for pos in positions {
            if let Some(index) = self.world_to_grid(&pos) {
                self.set_cell(index);
                count += 1;
            }
        }
        if count > 0 {
            debug!("[GridMap] perception batch marked {} cells", count);
            self.events.publish(MapEvent::CellsMarked { count });
        }
        count
    }

    /// Rasterize vertical cylinders, inflate, and raise one notification
    pub fn add_cylindrical_obstacles(
        &mut self,
        centers: &[Point3D],
        radius: f64,
        height: f64,
        inflation: f64,
    ) -> SwarmResult<()> {
        if !self.is_initialized() {
            warn!("[GridMap] cannot add obstacles: map not initialized");
            return Err(SwarmError::NotInitialized);
        }
        if radius < 0.0 || height < 0.0 {
            return Err(SwarmError::InvalidParameter(format!(
                "cylinder radius and height must be non-negative, got {} and {}",
                radius, height
            )));
        }

        for center in centers {
            self.obstacles.push(CylinderObstacle::new(*center, radius, height));
            self.rasterize_cylinder(center, radius, height);
        }

        debug!(
            "[GridMap] added {} cylindrical obstacles with radius {} and height {}",
            centers.len(),
            radius,
            height
        );

        self.inflate(inflation);
        self.events.publish(MapEvent::ObstaclesAdded { count: centers.len() });
        Ok(())
    }

    fn rasterize_cylinder(&mut self, center: &Point3D, radius: f64, height: f64) {
        let half = height / 2.0;
        let (min_x, min_y, min_z) =
            self.raw_grid_coords(&Point3D::new(center.x - radius, center.y - radius, center.z - half));
        let (max_x, max_y, max_z) =
            self.raw_grid_coords(&Point3D::new(center.x + radius, center.y + radius, center.z + half));

        let [dim_x, dim_y, dim_z] = self.dims.map(|d| d as i64);
        if max_x < 0 || max_y < 0 || max_z < 0 || min_x >= dim_x || min_y >= dim_y || min_z >= dim_z {
            debug!("[GridMap] cylinder at {} lies outside the grid", center);
            return;
        }

        let (min_x, max_x) = (min_x.max(0), max_x.min(dim_x - 1));
        let (min_y, max_y) = (min_y.max(0), max_y.min(dim_y - 1));
        let (min_z, max_z) = (min_z.max(0), max_z.min(dim_z - 1));

        let (cx, cy, _) = self.raw_grid_coords(center);
        let radius_cells_sq = (radius / self.resolution).powi(2);

        for (x, y) in iproduct!(min_x..=max_x, min_y..=max_y) {
            let dist_sq = ((x - cx).pow(2) + (y - cy).pow(2)) as f64;
            if dist_sq <= radius_cells_sq {
                for z in min_z..=max_z {
                    self.set_cell(GridIndex::new(x as i32, y as i32, z as i32));
                }
            }
        }
    }

    /// Grow occupied regions by `radius` world units
    ///
    /// Works from a snapshot of the current occupancy, so cells set by this
    /// call never seed further growth.
    pub fn inflate(&mut self, radius: f64) {
        if radius <= 0.0 || !self.is_initialized() {
            return;
        }

        let reach = (radius / self.resolution).ceil() as i32;
        let radius_cells_sq = (radius / self.resolution).powi(2) + 1e-9;
        let offsets: Vec<(i32, i32, i32)> = iproduct!(-reach..=reach, -reach..=reach, -reach..=reach)
            .filter(|&(dx, dy, dz)| ((dx * dx + dy * dy + dz * dz) as f64) <= radius_cells_sq)
            .collect();

        let snapshot = self.cells.clone();
        let seeds: Vec<GridIndex> = snapshot
            .iter()
            .enumerate()
            .filter(|(_, &occupied)| occupied)
            .map(|(flat, _)| self.unflatten(flat))
            .collect();

        for seed in &seeds {
            for &(dx, dy, dz) in &offsets {
                let neighbor = seed.offset(dx, dy, dz);
                if self.is_in_bounds(neighbor) {
                    self.set_cell(neighbor);
                }
            }
        }

        debug!(
            "[GridMap] inflated {} seed cells by {} ({} cells occupied)",
            seeds.len(),
            radius,
            self.occupied_count()
        );
    }

    /// Free every cell and forget registered obstacles
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = false);
        self.obstacles.clear();
        self.events.publish(MapEvent::Cleared);
    }
}
