//! Height-grid accumulation.
//!
//! A [`HeightGrid`] is a fixed-size raster over the x/y footprint of a
//! flattened cloud.  Its size is computed once from the cloud's bounds, so
//! there is no incremental resizing:
//!
//! ```text
//! width  = ceil((x_max − x_min) / cell) + 1     (columns, along x)
//! height = ceil((y_max − y_min) / cell) + 1     (rows, along y)
//! ```
//!
//! Every cell keeps the **maximum** height of the points that fall into it,
//! which preserves roof silhouettes instead of averaging them into the
//! ground.  Cells nobody hits stay `None`.

use serde::Serialize;
use tiltscan_types::{PointCloud, ScanError};
use tracing::debug;

/// Largest raster [`HeightGrid::build`] will allocate (64 MiB of cells).
pub const MAX_CELLS: usize = 4_000_000;

/// Immutable 2-D raster of optional heights, indexed `[row, col]`.
///
/// Serialises to the raster format consumed by visualisation:
/// bounds plus a row-major `cells` array of `null | height`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeightGrid {
    pub x_min: f64,
    pub y_min: f64,
    pub cell_size: f64,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    cells: Vec<Option<f64>>,
}

impl HeightGrid {
    /// Bucket `cloud` into cells of `cell_size` centimeters.
    ///
    /// Points that land past the last row or column through rounding at the
    /// upper bound are clamped into it.  Non-finite points are ignored.
    ///
    /// # Errors
    ///
    /// - [`ScanError::EmptyCloud`] when the cloud has no (finite) points.
    /// - [`ScanError::InvalidConfig`] for a non-positive cell size.
    pub fn build(cloud: &PointCloud, cell_size: f64) -> Result<Self, ScanError> {
        cloud.ensure_non_empty()?;
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(ScanError::InvalidConfig(format!(
                "cell_size must be positive, got {cell_size}"
            )));
        }

        let finite = || {
            cloud
                .iter()
                .filter(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite())
        };
        let Some(first) = finite().next() else {
            return Err(ScanError::EmptyCloud);
        };
        let (mut x_min, mut x_max, mut y_min, mut y_max) = (first.x, first.x, first.y, first.y);
        for p in finite() {
            x_min = x_min.min(p.x);
            x_max = x_max.max(p.x);
            y_min = y_min.min(p.y);
            y_max = y_max.max(p.y);
        }

        let (width, height) = grid_dims(x_max - x_min, y_max - y_min, cell_size)?;
        let mut cells: Vec<Option<f64>> = vec![None; width * height];

        for p in finite() {
            let col = (((p.x - x_min) / cell_size).floor() as usize).min(width - 1);
            let row = (((p.y - y_min) / cell_size).floor() as usize).min(height - 1);
            let cell = &mut cells[row * width + col];
            *cell = Some(cell.map_or(p.z, |h| h.max(p.z)));
        }

        debug!(
            width,
            height,
            filled = cells.iter().filter(|c| c.is_some()).count(),
            "height grid built"
        );

        Ok(Self {
            x_min,
            y_min,
            cell_size,
            width,
            height,
            cells,
        })
    }

    /// Height at `[row, col]`; `None` when absent or out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.cells[row * self.width + col]
    }

    /// Same as [`get`](Self::get) but accepts signed indices, so neighbours
    /// of edge cells can be probed without underflow.
    pub fn get_signed(&self, row: isize, col: isize) -> Option<f64> {
        if row < 0 || col < 0 {
            return None;
        }
        self.get(row as usize, col as usize)
    }

    /// x of the lower edge of column `col`.
    pub fn col_x(&self, col: usize) -> f64 {
        self.x_min + col as f64 * self.cell_size
    }

    /// y of the lower edge of row `row`.
    pub fn row_y(&self, row: usize) -> f64 {
        self.y_min + row as f64 * self.cell_size
    }

    /// Rows of optional heights, for consumers that want a 2-D shape.
    pub fn rows(&self) -> impl Iterator<Item = &[Option<f64>]> {
        self.cells.chunks(self.width)
    }

    /// Row-major view of every cell.
    pub fn cells(&self) -> &[Option<f64>] {
        &self.cells
    }
}

// Columns and rows for a `span_x` × `span_y` footprint, refusing anything
// above MAX_CELLS before it is allocated.
fn grid_dims(span_x: f64, span_y: f64, cell_size: f64) -> Result<(usize, usize), ScanError> {
    let cols = (span_x / cell_size).ceil() + 1.0;
    let rows = (span_y / cell_size).ceil() + 1.0;
    let too_large = || {
        ScanError::InvalidConfig(format!(
            "height grid of {cols}x{rows} cells at {cell_size} cm exceeds {MAX_CELLS} cells"
        ))
    };
    if !(cols.is_finite() && rows.is_finite()) || cols * rows > MAX_CELLS as f64 {
        return Err(too_large());
    }
    let (width, height) = (cols as usize, rows as usize);
    match width.checked_mul(height) {
        Some(n) if n <= MAX_CELLS => Ok((width, height)),
        _ => Err(too_large()),
    }
}
