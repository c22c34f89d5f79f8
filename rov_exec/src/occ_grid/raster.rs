//! # Line rasterisation
//!
//! Integer Bresenham line between two grid cells, valid in every octant.

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Iterator over the cells of a line, from the start cell to the end cell, both included.
///
/// Cells are given as `(col, row)` pairs and consecutive cells are always 8-connected.
#[derive(Debug, Clone)]
pub struct LineIter {
    x: i64,
    y: i64,
    x1: i64,
    y1: i64,
    dx: i64,
    dy: i64,
    sx: i64,
    sy: i64,
    err: i64,
    done: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LineIter {
    pub fn new(start: (i64, i64), end: (i64, i64)) -> Self {
        let dx = (end.0 - start.0).abs();
        let dy = (end.1 - start.1).abs();

        Self {
            x: start.0,
            y: start.1,
            x1: end.0,
            y1: end.1,
            dx,
            dy,
            sx: if start.0 < end.0 { 1 } else { -1 },
            sy: if start.1 < end.1 { 1 } else { -1 },
            err: dx - dy,
            done: false,
        }
    }
}

impl Iterator for LineIter {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let cell = (self.x, self.y);

        if self.x == self.x1 && self.y == self.y1 {
            self.done = true;
            return Some(cell);
        }

        let e2 = 2 * self.err;
        if e2 > -self.dy {
            self.err -= self.dy;
            self.x += self.sx;
        }
        if e2 < self.dx {
            self.err += self.dx;
            self.y += self.sy;
        }

        Some(cell)
    }
}
