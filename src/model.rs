//! In-memory representation of an opened GRIB raster.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gdal::raster::GdalDataType;

use crate::coords::CoordinateAxes;

/// Spatial envelope and band layout of a raster container.
///
/// Built once per successful open and never mutated. The extent identities
/// `x_max = x_min + n_cols * cell_width` and
/// `y_min = y_max - n_rows * cell_height` hold by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterEnvelope {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub n_cols: usize,
    pub n_rows: usize,
    pub cell_width: f64,
    pub cell_height: f64,
    /// CRS of the native grid as WKT.
    pub projection: String,
    pub band_count: usize,
}

impl RasterEnvelope {
    /// Derives the envelope from the top-left origin, cell sizes and grid
    /// dimensions, as read from a geotransform.
    ///
    /// # Panics
    ///
    /// Non-positive cell sizes or zero dimensions are caller bugs, not
    /// runtime faults, and panic.
    pub fn new(
        x_min: f64,
        y_max: f64,
        n_cols: usize,
        n_rows: usize,
        cell_width: f64,
        cell_height: f64,
        projection: String,
        band_count: usize,
    ) -> Self {
        assert!(cell_width > 0.0, "cell_width must be positive");
        assert!(cell_height > 0.0, "cell_height must be positive");
        assert!(n_cols > 0 && n_rows > 0, "grid dimensions must be nonzero");
        assert!(band_count > 0, "band_count must be nonzero");

        Self {
            x_min,
            x_max: x_min + n_cols as f64 * cell_width,
            y_min: y_max - n_rows as f64 * cell_height,
            y_max,
            n_cols,
            n_rows,
            cell_width,
            cell_height,
            projection,
            band_count,
        }
    }

    /// Grid shape as `(n_rows, n_cols)`.
    pub fn grid_shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }
}

/// One time step of the raster: its metadata dictionary and forecast time.
///
/// The band's pixel values live in the session-wide array of
/// [`GribContents`], not here; all bands share one shape and dtype.
#[derive(Debug, Clone)]
pub struct BandRecord {
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl BandRecord {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Corner coordinates of every cell in the target CRS.
///
/// Both arrays are `(n_rows + 1) x (n_cols + 1)`, row-major. Every element
/// is finite; the reprojection adapter rejects transforms producing NaN or
/// infinite values.
#[derive(Debug, Clone)]
pub struct ReprojectedCornerMesh {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// `(n_rows + 1, n_cols + 1)`
    pub shape: (usize, usize),
    /// CRS of the mesh as WKT.
    pub projection: String,
}

/// Everything read from one GRIB file, exclusively owned by the conversion
/// session. The raster handle itself is closed before this value exists.
#[derive(Debug, Clone)]
pub struct GribContents {
    source: PathBuf,
    envelope: RasterEnvelope,
    axes: CoordinateAxes,
    bands: Vec<BandRecord>,
    /// Flat row-major `(band_count, n_rows, n_cols)` array.
    values: Vec<f64>,
    value_type: GdalDataType,
}

impl GribContents {
    /// Assembles contents from already-decoded parts. The reader uses this
    /// after draining the raster handle; tests use it to build synthetic
    /// sessions without a GRIB fixture.
    ///
    /// # Panics
    ///
    /// The band list must be `band_count` long and the value array must hold
    /// exactly `band_count * n_rows * n_cols` elements.
    pub fn from_parts(
        source: PathBuf,
        envelope: RasterEnvelope,
        bands: Vec<BandRecord>,
        values: Vec<f64>,
        value_type: GdalDataType,
    ) -> Self {
        assert_eq!(bands.len(), envelope.band_count, "band list length");
        assert_eq!(
            values.len(),
            envelope.band_count * envelope.n_rows * envelope.n_cols,
            "value array length"
        );

        let axes = CoordinateAxes::from_envelope(&envelope);

        Self {
            source,
            envelope,
            axes,
            bands,
            values,
            value_type,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn envelope(&self) -> &RasterEnvelope {
        &self.envelope
    }

    pub fn grid_shape(&self) -> (usize, usize) {
        self.envelope.grid_shape()
    }

    /// WKT of the native grid CRS.
    pub fn projection(&self) -> &str {
        &self.envelope.projection
    }

    pub fn axes(&self) -> &CoordinateAxes {
        &self.axes
    }

    /// Band metadata and timestamps, in time order.
    pub fn bands(&self) -> &[BandRecord] {
        &self.bands
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.bands.iter().map(|b| b.timestamp).collect()
    }

    /// The full `(band_count, n_rows, n_cols)` array, flat row-major.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// One band's `n_rows * n_cols` slice.
    pub fn band_values(&self, band: usize) -> &[f64] {
        let plane = self.envelope.n_rows * self.envelope.n_cols;
        &self.values[band * plane..(band + 1) * plane]
    }

    /// Native GDAL pixel type shared by all bands.
    pub fn value_type(&self) -> GdalDataType {
        self.value_type
    }
}
