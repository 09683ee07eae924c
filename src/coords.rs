//! Native coordinate axes of a regular grid.

use crate::model::RasterEnvelope;

/// Cell-corner and cell-center axes of the native grid, one dimension each.
///
/// `x_corners` runs west to east with `n_cols + 1` values; `y_corners` runs
/// north to south (descending) with `n_rows + 1` values. Centers sit halfway
/// between adjacent corners, `n_cols` respectively `n_rows` long.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateAxes {
    pub x_corners: Vec<f64>,
    pub y_corners: Vec<f64>,
    pub x_centers: Vec<f64>,
    pub y_centers: Vec<f64>,
}

impl CoordinateAxes {
    /// Derives the axes from the envelope. Pure; the envelope's constructor
    /// already guarantees positive cell sizes and nonzero dimensions.
    pub fn from_envelope(envelope: &RasterEnvelope) -> Self {
        let x_corners = linspace(envelope.x_min, envelope.x_max, envelope.n_cols + 1);
        let y_corners = linspace(envelope.y_max, envelope.y_min, envelope.n_rows + 1);

        let half_w = 0.5 * envelope.cell_width;
        let half_h = 0.5 * envelope.cell_height;

        let x_centers = x_corners[..envelope.n_cols]
            .iter()
            .map(|x| x + half_w)
            .collect();
        let y_centers = y_corners[..envelope.n_rows]
            .iter()
            .map(|y| y - half_h)
            .collect();

        Self {
            x_corners,
            y_corners,
            x_centers,
            y_centers,
        }
    }
}

/// `n` evenly spaced values from `start` to `end` inclusive, endpoints exact.
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    assert!(n >= 2, "linspace needs at least two points");
    let step = (end - start) / (n - 1) as f64;
    (0..n)
        .map(|i| {
            if i == n - 1 {
                end
            } else {
                start + i as f64 * step
            }
        })
        .collect()
}
