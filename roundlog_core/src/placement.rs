//! Coverage-unit placement from vehicle density.
//!
//! One-shot geometric procedure, not part of the streaming pipeline: bin
//! observed vehicle positions into a 2D grid with data-driven bounds, then
//! greedily pick the hottest non-empty cells as unit positions, enforcing a
//! minimum spacing between picks. The result is written in the registry
//! file format so a run can consume it directly.

use crate::error::RoundlogError;
use crate::registry::CoverageUnit;
use std::collections::BTreeMap;
use std::path::Path;

/// A 2D density histogram over position samples.
#[derive(Debug, Clone)]
pub struct DensityGrid {
    counts: Vec<u64>,
    bins_x: usize,
    bins_y: usize,
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl DensityGrid {
    /// Bins samples into a `bins_x` x `bins_y` grid whose bounds come from
    /// the data itself. Returns `None` for an empty sample set or zero bin
    /// counts.
    pub fn from_samples(samples: &[(f64, f64)], bins_x: usize, bins_y: usize) -> Option<Self> {
        if samples.is_empty() || bins_x == 0 || bins_y == 0 {
            return None;
        }

        let mut x_min = f64::INFINITY;
        let mut x_max = f64::NEG_INFINITY;
        let mut y_min = f64::INFINITY;
        let mut y_max = f64::NEG_INFINITY;
        for &(x, y) in samples {
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }

        let mut grid = Self {
            counts: vec![0; bins_x * bins_y],
            bins_x,
            bins_y,
            x_min,
            x_max,
            y_min,
            y_max,
        };
        for &(x, y) in samples {
            let i = grid.bin_index(x, grid.x_min, grid.x_max, bins_x);
            let j = grid.bin_index(y, grid.y_min, grid.y_max, bins_y);
            grid.counts[i * bins_y + j] += 1;
        }
        Some(grid)
    }

    fn bin_index(&self, v: f64, min: f64, max: f64, bins: usize) -> usize {
        if max <= min {
            return 0;
        }
        // The max edge folds into the last bin.
        let idx = ((v - min) / (max - min) * bins as f64) as usize;
        idx.min(bins - 1)
    }

    /// Center coordinates of cell `(i, j)`.
    fn cell_center(&self, i: usize, j: usize) -> (f64, f64) {
        let dx = (self.x_max - self.x_min) / self.bins_x as f64;
        let dy = (self.y_max - self.y_min) / self.bins_y as f64;
        (
            self.x_min + (i as f64 + 0.5) * dx,
            self.y_min + (j as f64 + 0.5) * dy,
        )
    }

    /// Sample count in cell `(i, j)`.
    pub fn count(&self, i: usize, j: usize) -> u64 {
        self.counts[i * self.bins_y + j]
    }

    /// Greedily picks up to `k` positions at the centers of the hottest
    /// non-empty cells, skipping any candidate closer than `min_dist` to an
    /// already-picked position. Equal counts resolve by ascending cell
    /// index so the selection is deterministic.
    pub fn select_positions(&self, k: usize, min_dist: f64) -> Vec<(f64, f64)> {
        let mut order: Vec<usize> = (0..self.counts.len()).collect();
        order.sort_by(|&a, &b| self.counts[b].cmp(&self.counts[a]).then(a.cmp(&b)));

        let mut picked: Vec<(f64, f64)> = Vec::new();
        for flat in order {
            if picked.len() >= k {
                break;
            }
            if self.counts[flat] == 0 {
                continue;
            }
            let (i, j) = (flat / self.bins_y, flat % self.bins_y);
            let (cx, cy) = self.cell_center(i, j);
            let too_close = picked
                .iter()
                .any(|&(px, py)| (cx - px).hypot(cy - py) < min_dist);
            if !too_close {
                picked.push((cx, cy));
            }
        }
        picked
    }
}

/// Names the picked positions `rsu_0..` and gives each the same radius,
/// yielding a map in the registry file format.
pub fn to_registry_units(
    positions: &[(f64, f64)],
    radius: f64,
) -> BTreeMap<String, CoverageUnit> {
    positions
        .iter()
        .enumerate()
        .map(|(idx, &(x, y))| (format!("rsu_{idx}"), CoverageUnit { x, y, radius }))
        .collect()
}

/// Writes a unit map as a registry JSON file.
pub fn write_registry_file(
    path: impl AsRef<Path>,
    units: &BTreeMap<String, CoverageUnit>,
) -> Result<(), RoundlogError> {
    let json = serde_json::to_string_pretty(units)?;
    std::fs::write(path, json)?;
    Ok(())
}
