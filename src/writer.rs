//! Writing the assembled session to a netCDF archive.
//!
//! Layout of the output file:
//!
//! 1. The 3D data variable is named after the value of `GRIB_ELEMENT` in
//!    band 0's metadata and carries `units` (`GRIB_UNIT`), `standard_name`
//!    (`GRIB_COMMENT`) and `short_name` (`GRIB_SHORT_NAME`) attributes.
//! 2. The time variable is called `time`, with the configured calendar and
//!    unit string.
//! 3. Native cell-center coordinates are the 1D variables `rX` and `rY`.
//! 4. Cell-corner coordinates in the user-chosen target CRS are the 2D
//!    variables `X` and `Y`. Corners rather than centers because a
//!    reprojected cell is no longer square; adjacent corner coordinates
//!    describe each cell's true footprint.
//! 5. The global `Source` attribute records the input raster path.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{GribError, Result};
use crate::model::{GribContents, ReprojectedCornerMesh};
use crate::sentinel::Sentinel;
use crate::settings::VerifiedSettings;

/// Metadata keys every band must carry before anything is written.
pub const REQUIRED_KEYS: [&str; 4] = [
    "GRIB_ELEMENT",
    "GRIB_UNIT",
    "GRIB_COMMENT",
    "GRIB_SHORT_NAME",
];

// A 1D netCDF variable may share its dimension's name; a 2D one may not,
// so the corner dimensions get the underscore prefix.
const X_CENTERS_DIM: &str = "rX";
const Y_CENTERS_DIM: &str = "rY";
const X_CORNERS_DIM: &str = "_X";
const Y_CORNERS_DIM: &str = "_Y";
const TIME_DIM: &str = "time";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    SkippedExisting,
}

/// Writes the archive, guarded by the sentinel-marker crash-safety protocol.
///
/// A marker left behind by an interrupted attempt forces `overwrite`; with
/// `overwrite` false and the destination already present the write is
/// skipped. On any failure after the marker was armed, the marker stays on
/// disk so the next attempt rewrites the file.
pub fn write_archive(
    contents: &GribContents,
    mesh: &ReprojectedCornerMesh,
    settings: &VerifiedSettings,
    overwrite: bool,
) -> Result<WriteOutcome> {
    check_required_metadata(contents)?;

    let dest = settings.output_path();
    let (sentinel, stale) = Sentinel::arm(dest)?;
    if stale {
        warn!(
            dest = %dest.display(),
            "previous conversion attempt did not finish; overwriting"
        );
    }

    if !(overwrite || stale) && dest.exists() {
        sentinel.complete()?;
        info!(dest = %dest.display(), "output exists already, not converting");
        return Ok(WriteOutcome::SkippedExisting);
    }

    write_file(contents, mesh, settings, dest)?;

    sentinel.complete()?;
    info!(dest = %dest.display(), "converted to netCDF");
    Ok(WriteOutcome::Written)
}

fn check_required_metadata(contents: &GribContents) -> Result<()> {
    for key in REQUIRED_KEYS {
        for (band, record) in contents.bands().iter().enumerate() {
            if !record.metadata.contains_key(key) {
                return Err(GribError::MissingMetadata {
                    key: key.to_string(),
                    band,
                });
            }
        }
    }
    Ok(())
}

fn write_file(
    contents: &GribContents,
    mesh: &ReprojectedCornerMesh,
    settings: &VerifiedSettings,
    dest: &Path,
) -> Result<()> {
    let envelope = contents.envelope();
    let axes = contents.axes();

    let mut file = netcdf::create(dest)?;

    file.add_dimension(X_CENTERS_DIM, envelope.n_cols)?;
    file.add_dimension(Y_CENTERS_DIM, envelope.n_rows)?;
    file.add_dimension(X_CORNERS_DIM, envelope.n_cols + 1)?;
    file.add_dimension(Y_CORNERS_DIM, envelope.n_rows + 1)?;
    file.add_dimension(TIME_DIM, envelope.band_count)?;

    {
        let mut var = file.add_variable::<f64>("rX", &[X_CENTERS_DIM])?;
        var.put_values(&axes.x_centers, ..)?;
        var.put_attribute("description", "Original GRIB X coordinates for cell centers.")?;
        var.put_attribute("crs", contents.projection())?;
    }
    {
        let mut var = file.add_variable::<f64>("rY", &[Y_CENTERS_DIM])?;
        var.put_values(&axes.y_centers, ..)?;
        var.put_attribute("description", "Original GRIB Y coordinates for cell centers.")?;
        var.put_attribute("crs", contents.projection())?;
    }

    {
        let mut var = file.add_variable::<f64>("X", &[Y_CORNERS_DIM, X_CORNERS_DIM])?;
        var.put_values(&mesh.x, ..)?;
        var.put_attribute("description", "Transformed GRIB X coordinates for cell corners.")?;
        var.put_attribute("crs", mesh.projection.as_str())?;
    }
    {
        let mut var = file.add_variable::<f64>("Y", &[Y_CORNERS_DIM, X_CORNERS_DIM])?;
        var.put_values(&mesh.y, ..)?;
        var.put_attribute("description", "Transformed GRIB Y coordinates for cell corners.")?;
        var.put_attribute("crs", mesh.projection.as_str())?;
    }

    {
        let offsets = settings.time.encode(&contents.timestamps());
        let mut var = file.add_variable::<i64>(TIME_DIM, &[TIME_DIM])?;
        var.put_values(&offsets, ..)?;
        var.put_attribute("units", settings.time.units())?;
        var.put_attribute("calendar", settings.time.calendar().as_str())?;
    }

    {
        // Keys were checked up front; band 0 names the variable.
        let band0 = &contents.bands()[0];
        let element = band0.metadata_value("GRIB_ELEMENT").unwrap();

        let mut var =
            file.add_variable::<f64>(element, &[TIME_DIM, Y_CENTERS_DIM, X_CENTERS_DIM])?;
        var.put_values(contents.values(), ..)?;
        var.put_attribute("units", band0.metadata_value("GRIB_UNIT").unwrap())?;
        var.put_attribute("standard_name", band0.metadata_value("GRIB_COMMENT").unwrap())?;
        var.put_attribute("short_name", band0.metadata_value("GRIB_SHORT_NAME").unwrap())?;
    }

    file.add_attribute("Source", contents.source().display().to_string().as_str())?;

    Ok(())
}
