//! # Map rendering
//!
//! Draws the grid as an RGB image, one square block of pixels per cell, with the last scan's
//! endpoints and the rover's pose overlaid.

// ------------------------------------------------------------------------------------------------
// INCLUDES
// ------------------------------------------------------------------------------------------------

use std::{fs, path::Path};

use image::{Rgb, RgbImage};
use log::debug;

use super::{Cell, GridCell, LineIter, OccGridError, OccupancyGrid};
use crate::loc::Pose;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const BACKGROUND: Rgb<u8> = Rgb([220, 220, 220]);
const UNKNOWN: Rgb<u8> = Rgb([200, 200, 200]);
const FREE: Rgb<u8> = Rgb([245, 245, 245]);
const OCCUPIED: Rgb<u8> = Rgb([0, 0, 0]);
const SCAN_POINT: Rgb<u8> = Rgb([0, 90, 200]);
const ROVER: Rgb<u8> = Rgb([200, 0, 0]);

/// Units: pixels
const SCAN_POINT_RADIUS: i64 = 2;
const ROVER_RADIUS: i64 = 4;
const HEADING_LENGTH: f64 = 10.0;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OccupancyGrid {
    /// Render the grid with the last scan and the given pose overlaid.
    pub fn render(&self, pose: &Pose) -> RgbImage {
        let scale = self.params.render_scale;
        let side = self.num_cells as u32 * scale;

        let mut img = RgbImage::from_pixel(side, side, BACKGROUND);

        for ((row, col), cell) in self.cells.indexed_iter() {
            let colour = match cell {
                Cell::Unknown => UNKNOWN,
                Cell::Free => FREE,
                Cell::Occupied => OCCUPIED,
            };
            let (x0, y0) = (col as u32 * scale, row as u32 * scale);
            for y in y0..y0 + scale {
                for x in x0..x0 + scale {
                    img.put_pixel(x, y, colour);
                }
            }
        }

        for point in &self.last_scan_points {
            if let Some(c) = self.world_to_cell(point) {
                let (px, py) = self.cell_pixel(c);
                fill_circle(&mut img, px, py, SCAN_POINT_RADIUS, SCAN_POINT);
            }
        }

        if let Some(c) = self.world_to_cell(&pose.position()) {
            let (px, py) = self.cell_pixel(c);
            fill_circle(&mut img, px, py, ROVER_RADIUS, ROVER);

            // Image y runs down the map, so "up" is -y
            let hx = px + (HEADING_LENGTH * pose.theta_rad.sin()) as i64;
            let hy = py - (HEADING_LENGTH * pose.theta_rad.cos()) as i64;
            for (x, y) in LineIter::new((px, py), (hx, hy)) {
                put_clipped(&mut img, x, y, ROVER);
                put_clipped(&mut img, x + 1, y, ROVER);
                put_clipped(&mut img, x, y + 1, ROVER);
            }
        }

        img
    }

    /// Render the grid and write it to `path`, creating the parent directory if needed.
    ///
    /// The image format is taken from the file extension.
    pub fn save_render<P: AsRef<Path>>(&self, pose: &Pose, path: P) -> Result<(), OccGridError> {
        let path = path.as_ref();

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(OccGridError::CreateDir)?;
            }
        }

        self.render(pose).save(path).map_err(OccGridError::Image)?;
        debug!("Map image written to {:?}", path);

        Ok(())
    }

    /// Pixel at the centre of a cell.
    fn cell_pixel(&self, cell: GridCell) -> (i64, i64) {
        let scale = self.params.render_scale as i64;
        (
            cell.col as i64 * scale + scale / 2,
            cell.row as i64 * scale + scale / 2,
        )
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn put_clipped(img: &mut RgbImage, x: i64, y: i64, colour: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < img.width() as i64 && y < img.height() as i64 {
        img.put_pixel(x as u32, y as u32, colour);
    }
}

fn fill_circle(img: &mut RgbImage, cx: i64, cy: i64, radius: i64, colour: Rgb<u8>) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_clipped(img, cx + dx, cy + dy, colour);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::Params;
    use super::*;
    use nalgebra::Point2;

    #[test]
    fn test_render() {
        let mut g = OccupancyGrid::new(Params::default()).unwrap();
        g.update_with_scan(&Pose::default(), &[Point2::new(-100.0, 0.0)])
            .unwrap();

        let img = g.render(&Pose::default());
        assert_eq!(img.dimensions(), (400, 400));

        // Unknown corner
        assert_eq!(*img.get_pixel(0, 0), UNKNOWN);

        // Free cell along the ray, clear of the overlays, (30, 40) in the grid
        assert_eq!(*img.get_pixel(150, 200), FREE);

        // Occupied endpoint at cell (20, 40) is under its scan point marker, check its corner
        assert_eq!(*img.get_pixel(100, 200), OCCUPIED);
        assert_eq!(*img.get_pixel(102, 202), SCAN_POINT);

        // Rover at cell (40, 40), heading up the image
        assert_eq!(*img.get_pixel(202, 202), ROVER);
        assert_eq!(*img.get_pixel(202, 192), ROVER);

        // Nothing was observed behind the rover
        assert_eq!(*img.get_pixel(202, 212), UNKNOWN);
    }

    #[test]
    fn test_save_render() {
        let g = OccupancyGrid::new(Params::default()).unwrap();
        let dir = std::env::temp_dir().join(format!("occ_grid_render_{}", std::process::id()));
        let path = dir.join("maps").join("map.png");

        g.save_render(&Pose::default(), &path).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (400, 400));
        assert_eq!(*img.get_pixel(202, 202), ROVER);

        fs::remove_dir_all(dir).ok();
    }
}
