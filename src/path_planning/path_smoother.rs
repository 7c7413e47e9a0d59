//! Path smoothing with obstacle repulsion and safety rollback
//!
//! Interior waypoints are relaxed toward the midpoint of their neighbours
//! while a short-range repulsion pushes them away from occupied cells. Any
//! step that would bring the path near an obstacle abandons smoothing and
//! returns the input path unchanged.

use log::{trace, warn};
use nalgebra::Vector3;

use crate::common::{Path3D, Point3D};
use crate::mapping::GridMap;

/// Configuration for the path smoother
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmootherConfig {
    /// Skip smoothing entirely when false
    pub enabled: bool,
    pub iterations: usize,
    /// Pull toward the neighbour midpoint
    pub smoothing_weight: f64,
    /// Scale of the summed repulsion
    pub obstacle_weight: f64,
    /// Offset of the six axis-aligned safety probes
    pub probe_distance: f64,
    /// Distance at which repulsion fades to zero
    pub influence_radius: f64,
    pub repulsion_strength: f64,
    /// Clearance required around every moved waypoint
    pub safety_distance: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            iterations: 5,
            smoothing_weight: 0.5,
            obstacle_weight: 0.05,
            probe_distance: 0.1,
            influence_radius: 1.0,
            repulsion_strength: 1.0,
            safety_distance: 0.11,
        }
    }
}

/// Laplacian path smoother
#[derive(Debug, Clone, Default)]
pub struct PathSmoother {
    config: SmootherConfig,
}

impl PathSmoother {
    pub fn new(config: SmootherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SmootherConfig {
        &self.config
    }

    /// Smooth `path` against `grid`
    ///
    /// Endpoints never move and the waypoint count never changes. Paths
    /// shorter than three points come back as they are.
    pub fn smooth(&self, grid: &GridMap, path: &Path3D) -> Path3D {
        if !self.config.enabled || path.len() < 3 {
            return path.clone();
        }

        let mut points: Vec<Vector3<f64>> = path.points.iter().map(Point3D::to_vector).collect();

        for iteration in 0..self.config.iterations {
            // every waypoint relaxes against its neighbours from the previous sweep
            let previous = points.clone();
            for i in 1..points.len() - 1 {
                let prev = previous[i - 1];
                let next = previous[i + 1];
                let current = previous[i];

                let midpoint = (prev + next) * 0.5;
                let pull = (midpoint - current) * self.config.smoothing_weight;
                let push = self.repulsion(grid, &current) * self.config.obstacle_weight;
                let moved = current + pull + push;

                let moved_point = Point3D::from(moved);
                if !self.is_point_safe(grid, &moved_point)
                    || !Self::can_reach_directly(grid, &Point3D::from(prev), &moved_point)
                    || !Self::can_reach_directly(grid, &moved_point, &Point3D::from(next))
                {
                    warn!(
                        "[Smoother] waypoint {} unsafe at iteration {}, keeping original path",
                        i, iteration
                    );
                    return path.clone();
                }
                points[i] = moved;
            }
        }

        let smoothed = Path3D::from_points(points.into_iter().map(Point3D::from).collect());
        let all_clear = smoothed
            .points
            .windows(2)
            .all(|pair| Self::can_reach_directly(grid, &pair[0], &pair[1]));
        if !all_clear {
            warn!("[Smoother] smoothed path crosses an obstacle, keeping original path");
            return path.clone();
        }

        trace!(
            "[Smoother] length {:.3} -> {:.3}",
            path.total_length(),
            smoothed.total_length()
        );
        smoothed
    }

    /// Sum of pushes away from unsafe axis-aligned probes
    fn repulsion(&self, grid: &GridMap, point: &Vector3<f64>) -> Vector3<f64> {
        let d = self.config.probe_distance;
        let falloff = 1.0 - (d / self.config.influence_radius).clamp(0.0, 1.0);
        let force = self.config.repulsion_strength * falloff;

        let mut gradient = Vector3::zeros();
        for dir in [
            Vector3::x(),
            -Vector3::x(),
            Vector3::y(),
            -Vector3::y(),
            Vector3::z(),
            -Vector3::z(),
        ] {
            let probe = Point3D::from(point + dir * d);
            if !self.is_point_safe(grid, &probe) {
                gradient -= dir * force;
            }
        }
        gradient
    }

    /// Free cell inside the grid with clearance on eight azimuths plus up and down
    fn is_point_safe(&self, grid: &GridMap, point: &Point3D) -> bool {
        if grid.world_to_grid(point).is_none() || grid.is_occupied(point) {
            return false;
        }

        let r = self.config.safety_distance;
        let azimuths = (0..8).map(|k| {
            let angle = k as f64 * std::f64::consts::FRAC_PI_4;
            Point3D::new(point.x + r * angle.cos(), point.y + r * angle.sin(), point.z)
        });
        let vertical = [
            Point3D::new(point.x, point.y, point.z + r),
            Point3D::new(point.x, point.y, point.z - r),
        ];

        azimuths
            .chain(vertical)
            .all(|probe| !grid.is_occupied(&probe))
    }

    /// Sample the segment at grid-resolution steps, endpoints included
    pub fn can_reach_directly(grid: &GridMap, from: &Point3D, to: &Point3D) -> bool {
        let distance = from.distance(to);
        let steps = (distance / grid.resolution()).ceil().max(1.0) as usize;
        (0..=steps).all(|k| {
            let t = k as f64 / steps as f64;
            let sample = Point3D::new(
                from.x + (to.x - from.x) * t,
                from.y + (to.y - from.y) * t,
                from.z + (to.z - from.z) * t,
            );
            !grid.is_occupied(&sample)
        })
    }
}
