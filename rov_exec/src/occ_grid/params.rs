//! Parameters structure for the OccupancyGrid

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the occupancy grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Side length of the square map, which is centred on the world origin.
    ///
    /// Units: meters
    pub map_size_m: f64,

    /// Side length of one cell.
    ///
    /// Units: meters
    pub resolution_m: f64,

    /// Side length of one cell in the rendered image.
    ///
    /// Units: pixels
    pub render_scale: u32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            map_size_m: 4.0,
            resolution_m: 0.05,
            render_scale: 5,
        }
    }
}

impl Params {
    pub fn are_valid(&self) -> bool {
        self.map_size_m > 0.0
            && self.resolution_m > 0.0
            && self.resolution_m <= self.map_size_m
            && self.render_scale > 0
    }

    /// Number of cells along each side of the map.
    pub fn num_cells(&self) -> usize {
        (self.map_size_m / self.resolution_m).round() as usize
    }

    /// Units: centimeters
    pub fn half_extent_cm(&self) -> f64 {
        self.map_size_m * 100.0 / 2.0
    }

    /// Units: centimeters
    pub fn cell_cm(&self) -> f64 {
        self.resolution_m * 100.0
    }
}
