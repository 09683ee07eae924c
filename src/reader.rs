//! Opening a GRIB container and extracting grid geometry, band values and
//! forecast timestamps.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use gdal::raster::GdalDataType;
use gdal::{Dataset, Metadata};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{GribError, Result};
use crate::model::{BandRecord, GribContents, RasterEnvelope};

/// Metadata key holding a band's reference time string.
pub const REF_TIME_KEY: &str = "GRIB_REF_TIME";
/// Metadata key holding the forecast offset used by the fallback parse.
pub const FORECAST_SECONDS_KEY: &str = "GRIB_FORECAST_SECONDS";

/// The only accepted time unit token in a reference time string.
const TIME_UNIT: &str = "sec";
/// The only accepted time reference token in a reference time string.
const TIME_REF: &str = "UTC";

/// Opens a GRIB file, reads every band with its metadata and forecast time,
/// and returns the assembled session contents. The raster handle is closed
/// before this returns; everything lives in memory afterwards.
///
/// Fails with [`GribError::NotARaster`] when the file cannot be opened or is
/// not served by the GRIB driver, [`GribError::TimeParse`] when a band's
/// reference time cannot be understood, and [`GribError::InconsistentGrid`]
/// when a band's shape or pixel type differs from band 0.
pub fn read_grib(path: &Path) -> Result<GribContents> {
    let dataset = Dataset::open(path).map_err(|e| GribError::NotARaster {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let driver = dataset.driver().short_name();
    if driver != "GRIB" {
        return Err(GribError::NotARaster {
            path: path.to_path_buf(),
            reason: format!("driver is {driver:?}, expected \"GRIB\""),
        });
    }

    let (n_cols, n_rows) = dataset.raster_size();
    let transform = dataset.geo_transform()?;
    let band_count = dataset.raster_count();
    if band_count == 0 {
        return Err(GribError::NotARaster {
            path: path.to_path_buf(),
            reason: "no raster bands".to_string(),
        });
    }
    check_grid_geometry(path, n_cols, n_rows, &transform)?;

    let envelope = RasterEnvelope::new(
        transform[0],
        transform[3],
        n_cols,
        n_rows,
        transform[1],
        transform[5].abs(),
        dataset.projection(),
        band_count,
    );

    debug!(
        path = %path.display(),
        n_rows, n_cols, band_count,
        "opened GRIB raster"
    );

    let mut bands = Vec::with_capacity(band_count);
    let mut values = Vec::with_capacity(band_count * n_rows * n_cols);
    let mut value_type = None;
    let mut fallback_seen = false;

    for index in 0..band_count {
        let band = dataset.rasterband(index + 1)?;

        let metadata = band_metadata(&band);
        let timestamp = parse_band_time(&metadata, index, &mut fallback_seen)?;

        let band_type = band.band_type();
        let expected = *value_type.get_or_insert(band_type);
        if band_type != expected {
            return Err(GribError::InconsistentGrid {
                band: index,
                expected: format!("pixel type {expected:?}"),
                found: format!("pixel type {band_type:?}"),
            });
        }

        let (band_cols, band_rows) = band.size();
        if (band_rows, band_cols) != (n_rows, n_cols) {
            return Err(GribError::InconsistentGrid {
                band: index,
                expected: format!("shape ({n_rows}, {n_cols})"),
                found: format!("shape ({band_rows}, {band_cols})"),
            });
        }

        let buffer = band.read_as::<f64>((0, 0), (n_cols, n_rows), (n_cols, n_rows), None)?;
        values.extend_from_slice(buffer.data());

        bands.push(BandRecord {
            metadata,
            timestamp,
        });
    }

    // Dropping the dataset closes the GDAL handle; only the copied data
    // survives in the session.
    drop(dataset);

    Ok(GribContents::from_parts(
        path.to_path_buf(),
        envelope,
        bands,
        values,
        value_type.unwrap_or(GdalDataType::Float64),
    ))
}

/// Rejects degenerate grid geometry before it reaches [`RasterEnvelope`].
/// GDAL happily serves rasters whose geotransform carries zero or non-finite
/// cell sizes; those must surface as an error naming the offending values.
fn check_grid_geometry(
    path: &Path,
    n_cols: usize,
    n_rows: usize,
    transform: &[f64; 6],
) -> Result<()> {
    let cell_width = transform[1];
    let cell_height = transform[5].abs();
    let sizes_ok = cell_width.is_finite()
        && cell_height.is_finite()
        && cell_width > 0.0
        && cell_height > 0.0;
    if n_cols == 0 || n_rows == 0 || !sizes_ok {
        return Err(GribError::NotARaster {
            path: path.to_path_buf(),
            reason: format!(
                "degenerate grid geometry: raster size ({n_cols}, {n_rows}), \
                 geotransform cell sizes ({}, {})",
                transform[1], transform[5]
            ),
        });
    }
    Ok(())
}

/// Collects a band's default-domain metadata into a key/value map.
fn band_metadata(band: &impl Metadata) -> HashMap<String, String> {
    band.metadata_domain("")
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

/// Two-tier reference time parse.
///
/// Primary: `"<epoch> <unit> <ref>"` with `<unit>` and `<ref>` checked
/// against the allow-lists (currently `sec` / `UTC` only). When the pattern
/// itself does not match, fall back to the leading epoch integer plus the
/// band's forecast offset in seconds. The fallback is a logged degradation
/// path, warned once per session and flagged per band, not a silent one.
fn parse_band_time(
    metadata: &HashMap<String, String>,
    band: usize,
    fallback_seen: &mut bool,
) -> Result<DateTime<Utc>> {
    let raw = metadata
        .get(REF_TIME_KEY)
        .ok_or_else(|| GribError::MissingMetadata {
            key: REF_TIME_KEY.to_string(),
            band,
        })?;

    static PRIMARY: OnceLock<Regex> = OnceLock::new();
    let primary = PRIMARY.get_or_init(|| Regex::new(r"(-?\d+)\s+(\w+)\s+(\w+)").unwrap());

    if let Some(caps) = primary.captures(raw) {
        let epoch: i64 = caps[1].parse().map_err(|_| time_parse(band, raw))?;
        if &caps[2] != TIME_UNIT || &caps[3] != TIME_REF {
            return Err(time_parse(band, raw));
        }
        return utc_from_epoch(epoch).ok_or_else(|| time_parse(band, raw));
    }

    if !*fallback_seen {
        warn!(
            band,
            raw, "reference time did not match \"<epoch> <unit> <ref>\"; \
             falling back to epoch plus forecast offset"
        );
        *fallback_seen = true;
    }
    debug!(band, raw, "band parsed through the fallback time path");

    let epoch = leading_integer(raw).ok_or_else(|| time_parse(band, raw))?;
    let offset = metadata
        .get(FORECAST_SECONDS_KEY)
        .and_then(|v| leading_integer(v))
        .ok_or_else(|| time_parse(band, raw))?;

    utc_from_epoch(epoch + offset).ok_or_else(|| time_parse(band, raw))
}

fn time_parse(band: usize, raw: &str) -> GribError {
    GribError::TimeParse {
        band,
        raw: raw.to_string(),
    }
}

fn utc_from_epoch(epoch: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(epoch, 0).single()
}

fn leading_integer(raw: &str) -> Option<i64> {
    static LEADING: OnceLock<Regex> = OnceLock::new();
    let leading = LEADING.get_or_init(|| Regex::new(r"^\s*(-?\d+)").unwrap());
    leading
        .captures(raw)
        .and_then(|caps| caps[1].parse().ok())
}
