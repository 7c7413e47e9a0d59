//! Distance heuristics for grid search

use crate::common::GridIndex;

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Admissible distance estimate between two cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HeuristicKind {
    /// Exact 26-connected move cost on an empty grid
    #[default]
    Diagonal,
    Euclidean,
    /// Not admissible for 26-connected moves
    Manhattan,
}

impl HeuristicKind {
    /// Estimated world-space cost from `from` to `to`
    pub fn estimate(&self, from: GridIndex, to: GridIndex, resolution: f64) -> f64 {
        let dx = (from.x - to.x).abs() as f64;
        let dy = (from.y - to.y).abs() as f64;
        let dz = (from.z - to.z).abs() as f64;

        let cells = match self {
            HeuristicKind::Diagonal => {
                let min = dx.min(dy).min(dz);
                let max = dx.max(dy).max(dz);
                let mid = dx + dy + dz - min - max;
                SQRT_3 * min + std::f64::consts::SQRT_2 * (mid - min) + (max - mid)
            }
            HeuristicKind::Euclidean => (dx * dx + dy * dy + dz * dz).sqrt(),
            HeuristicKind::Manhattan => dx + dy + dz,
        };

        cells * resolution
    }
}
