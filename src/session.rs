//! A whole-file conversion session, phase by phase.
//!
//! The session is a typed state machine: `Conversion` (collecting settings)
//! verifies into `VerifiedConversion`, which reads into `ReadConversion`,
//! which converts. An operation that is invalid in a phase simply does not
//! exist on that phase's type, so there are no readiness flags to check and
//! no way to convert before reading or read before verifying. A failed
//! `read` consumes the session; build a new one rather than retrying in
//! place.
//!
//! ```no_run
//! use grib2nc::Conversion;
//!
//! # fn main() -> Result<(), grib2nc::GribError> {
//! let mut session = Conversion::new("TOT_PRECIP.2D.199501.grb");
//! session.set_output_path("TOT_PRECIP.2D.199501.nc")?;
//! session.set_target_crs("EPSG", "4326")?;
//! session.set_time("gregorian", "hours since 1995-01-01 00:00:00.0")?;
//!
//! let read = session.verify()?.read()?;
//! read.convert(false)?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{GribError, Result};
use crate::model::GribContents;
use crate::projection::transform_corners;
use crate::reader::read_grib;
use crate::settings::{ArchiveSettings, VerifiedSettings};
use crate::writer::{write_archive, WriteOutcome};

/// Phase 1: input path plus output settings under construction.
#[derive(Debug)]
pub struct Conversion {
    grib_path: PathBuf,
    settings: ArchiveSettings,
}

impl Conversion {
    pub fn new(grib_path: impl Into<PathBuf>) -> Self {
        Self {
            grib_path: grib_path.into(),
            settings: ArchiveSettings::new(),
        }
    }

    pub fn set_output_path(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.settings.set_output_path(path)
    }

    pub fn set_target_crs(&mut self, kind: &str, payload: &str) -> Result<()> {
        self.settings.set_target_crs(kind, payload)
    }

    pub fn set_time(&mut self, calendar: &str, units: &str) -> Result<()> {
        self.settings.set_time(calendar, units)
    }

    pub fn settings_mut(&mut self) -> &mut ArchiveSettings {
        &mut self.settings
    }

    /// Validates the input path and the settings, entering the verified
    /// phase.
    pub fn verify(self) -> Result<VerifiedConversion> {
        if !self.grib_path.is_file() {
            return Err(GribError::InvalidSetting {
                value: self.grib_path.display().to_string(),
                allowed: "a path to an existing GRIB file".to_string(),
            });
        }
        let settings = self.settings.verify()?;

        info!(grib = %self.grib_path.display(), "conversion inputs and settings verified");

        Ok(VerifiedConversion {
            grib_path: self.grib_path,
            settings,
        })
    }
}

/// Phase 2: settings are frozen; the raster has not been touched yet.
#[derive(Debug)]
pub struct VerifiedConversion {
    grib_path: PathBuf,
    settings: VerifiedSettings,
}

impl VerifiedConversion {
    /// Reads the whole GRIB file into memory and closes the raster handle.
    pub fn read(self) -> Result<ReadConversion> {
        let contents = read_grib(&self.grib_path)?;

        info!(
            grib = %self.grib_path.display(),
            bands = contents.envelope().band_count,
            "GRIB read and closed"
        );

        Ok(ReadConversion {
            contents,
            settings: self.settings,
        })
    }
}

/// Phase 3: everything needed to write the archive lives in memory.
#[derive(Debug)]
pub struct ReadConversion {
    contents: GribContents,
    settings: VerifiedSettings,
}

impl ReadConversion {
    pub fn contents(&self) -> &GribContents {
        &self.contents
    }

    pub fn grib_path(&self) -> &Path {
        self.contents.source()
    }

    /// Reprojects the corner mesh and writes the netCDF archive.
    pub fn convert(&self, overwrite: bool) -> Result<WriteOutcome> {
        let target = self.settings.target_crs.spatial_ref()?;
        let mesh = transform_corners(self.contents.projection(), &target, self.contents.axes())?;

        write_archive(&self.contents, &mesh, &self.settings, overwrite)
    }
}
