//! # Occupancy grid module
//!
//! A fixed size, square grid centred on the world origin in which each cell is
//! [`Unknown`](Cell::Unknown), [`Free`](Cell::Free) or [`Occupied`](Cell::Occupied). Scans are
//! fused in by raycasting from the rover's cell to each reflection: every cell the ray passes
//! through is marked free and the cell containing the reflection is marked occupied. The grid
//! keeps only the latest evidence, so a cell seen occupied in one scan is freed by a later ray
//! passing through it.
//!
//! Cells are indexed by column and row. Columns increase with world +x and rows increase with
//! world -y, so row 0 is the top (+y) edge of the map, matching the rendered image.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod params;
pub mod raster;
mod render;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use params::Params;
pub use raster::LineIter;

// ------------------------------------------------------------------------------------------------
// INCLUDES
// ------------------------------------------------------------------------------------------------

use log::trace;
use nalgebra::Point2;
use ndarray::Array2;
use serde::Serialize;
use util::maths::clamp;

use crate::loc::Pose;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The occupancy grid.
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    params: Params,
    num_cells: usize,
    half_cm: f64,
    cell_cm: f64,

    /// Cell states, indexed by `[row, col]`
    cells: Array2<Cell>,

    /// World frame endpoints of the last fused scan
    last_scan_points: Vec<Point2<f64>>,
}

/// Index of a cell in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GridCell {
    pub col: usize,
    pub row: usize,
}

/// Summary of one fusion update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FuseReport {
    /// Number of rays cast
    pub rays: usize,

    /// Number of rays whose endpoint was outside the map
    pub clamped: usize,

    /// Number of cells written free
    pub free_writes: usize,

    /// Number of cells written occupied
    pub occupied_writes: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Cell {
    Unknown,
    Free,
    Occupied,
}

#[derive(Debug, thiserror::Error)]
pub enum OccGridError {
    #[error("Pose ({0:.1}, {1:.1}) cm is outside the map, update skipped")]
    PoseOutsideMap(f64, f64),

    #[error("Invalid occupancy grid parameters")]
    InvalidParams,

    #[error("Could not create the map image directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Could not write the map image: {0}")]
    Image(image::ImageError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Cell {
    fn default() -> Self {
        Cell::Unknown
    }
}

impl OccupancyGrid {
    /// Create a new grid with every cell unknown.
    pub fn new(params: Params) -> Result<Self, OccGridError> {
        if !params.are_valid() {
            return Err(OccGridError::InvalidParams);
        }

        let num_cells = params.num_cells();

        Ok(Self {
            num_cells,
            half_cm: params.half_extent_cm(),
            cell_cm: params.cell_cm(),
            cells: Array2::default((num_cells, num_cells)),
            last_scan_points: Vec::new(),
            params,
        })
    }

    /// Number of cells along each side.
    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Return every cell to unknown and clear the scan overlay.
    pub fn reset(&mut self) {
        self.cells.fill(Cell::Unknown);
        self.last_scan_points.clear();
    }

    /// Get the state of a cell, or `None` if the index is outside the grid.
    pub fn get(&self, cell: GridCell) -> Option<Cell> {
        self.cells.get((cell.row, cell.col)).copied()
    }

    /// Number of cells in the given state.
    pub fn count(&self, state: Cell) -> usize {
        self.cells.iter().filter(|&&c| c == state).count()
    }

    /// World frame endpoints of the most recently fused scan.
    pub fn last_scan_points(&self) -> &[Point2<f64>] {
        &self.last_scan_points
    }

    /// Find the cell containing a world position, or `None` if it's outside the map.
    pub fn world_to_cell(&self, position: &Point2<f64>) -> Option<GridCell> {
        let (x, y) = (position.x, position.y);
        let h = self.half_cm;

        if !x.is_finite() || !y.is_finite() || x < -h || x > h || y < -h || y > h {
            return None;
        }

        let max = self.num_cells as i64 - 1;
        let col = ((x + h) / self.cell_cm).floor() as i64;
        let row = ((h - y) / self.cell_cm).floor() as i64;

        Some(GridCell {
            col: clamp(col, 0, max) as usize,
            row: clamp(row, 0, max) as usize,
        })
    }

    /// World position of the centre of a cell, or `None` if the index is outside the grid.
    pub fn cell_centre(&self, cell: GridCell) -> Option<Point2<f64>> {
        if cell.col >= self.num_cells || cell.row >= self.num_cells {
            return None;
        }

        Some(Point2::new(
            -self.half_cm + (cell.col as f64 + 0.5) * self.cell_cm,
            self.half_cm - (cell.row as f64 + 0.5) * self.cell_cm,
        ))
    }

    /// Fuse a scan taken from `pose` into the grid.
    ///
    /// `local_points` are reflection points in the rover frame. Points which land outside the
    /// map are clamped to its edge, and rays to them only mark free space. If the pose itself is
    /// outside the map nothing is changed and [`OccGridError::PoseOutsideMap`] is returned.
    pub fn update_with_scan(
        &mut self,
        pose: &Pose,
        local_points: &[Point2<f64>],
    ) -> Result<FuseReport, OccGridError> {
        let origin = self
            .world_to_cell(&pose.position())
            .ok_or(OccGridError::PoseOutsideMap(pose.x_cm, pose.y_cm))?;

        let mut report = FuseReport::default();
        let mut overlay = Vec::with_capacity(local_points.len());

        for local in local_points {
            let mut world = pose.local_to_world(local);

            let (end, mark_occupied) = match self.world_to_cell(&world) {
                Some(c) => (c, true),
                None => {
                    world = Point2::new(
                        clamp(world.x, -self.half_cm, self.half_cm),
                        clamp(world.y, -self.half_cm, self.half_cm),
                    );
                    match self.world_to_cell(&world) {
                        Some(c) => {
                            report.clamped += 1;
                            (c, false)
                        }
                        None => {
                            trace!("Skipping non-finite scan point {:?}", local);
                            continue;
                        }
                    }
                }
            };

            self.raycast(origin, end, mark_occupied, &mut report);
            overlay.push(world);
        }

        self.last_scan_points = overlay;

        Ok(report)
    }

    /// Mark the cells from `origin` up to but not including `end` free, and `end` occupied if
    /// `mark_occupied` is set.
    fn raycast(
        &mut self,
        origin: GridCell,
        end: GridCell,
        mark_occupied: bool,
        report: &mut FuseReport,
    ) {
        let line = LineIter::new(
            (origin.col as i64, origin.row as i64),
            (end.col as i64, end.row as i64),
        );

        for (col, row) in line {
            // Both ends are in the grid so every cell of the line is too
            let idx = (row as usize, col as usize);

            if (col as usize, row as usize) == (end.col, end.row) {
                if mark_occupied {
                    self.cells[idx] = Cell::Occupied;
                    report.occupied_writes += 1;
                }
            } else {
                self.cells[idx] = Cell::Free;
                report.free_writes += 1;
            }
        }

        report.rays += 1;
    }
}
