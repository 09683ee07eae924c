//! User-supplied output configuration and its validation.
//!
//! Each setter validates its own input against the fixed enumerations and
//! keeps the last accepted value, so changing one setting never requires
//! re-supplying the others. [`ArchiveSettings::verify`] produces an
//! immutable [`VerifiedSettings`] witness; the archive writer only accepts
//! that type, which replaces the original flag-checked readiness gating.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use regex::Regex;

use crate::error::{GribError, Result};
use crate::projection::TargetCrs;

/// Calendars accepted for the archive time axis (the CF conventions set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    Standard,
    Gregorian,
    ProlepticGregorian,
    Noleap,
    Days365,
    Days360,
    Julian,
    AllLeap,
    Days366,
}

impl Calendar {
    pub const ALL: [Calendar; 9] = [
        Calendar::Standard,
        Calendar::Gregorian,
        Calendar::ProlepticGregorian,
        Calendar::Noleap,
        Calendar::Days365,
        Calendar::Days360,
        Calendar::Julian,
        Calendar::AllLeap,
        Calendar::Days366,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Calendar::Standard => "standard",
            Calendar::Gregorian => "gregorian",
            Calendar::ProlepticGregorian => "proleptic_gregorian",
            Calendar::Noleap => "noleap",
            Calendar::Days365 => "365_day",
            Calendar::Days360 => "360_day",
            Calendar::Julian => "julian",
            Calendar::AllLeap => "all_leap",
            Calendar::Days366 => "366_day",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| GribError::InvalidSetting {
                value: name.to_string(),
                allowed: Self::ALL
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Offset units accepted in a `"<unit> since <timestamp>"` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
    Milliseconds,
    Microseconds,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 6] = [
        TimeUnit::Days,
        TimeUnit::Hours,
        TimeUnit::Minutes,
        TimeUnit::Seconds,
        TimeUnit::Milliseconds,
        TimeUnit::Microseconds,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Days => "days",
            TimeUnit::Hours => "hours",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Microseconds => "microseconds",
        }
    }

    fn parse(token: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|u| u.as_str() == token)
            .ok_or_else(|| GribError::InvalidSetting {
                value: token.to_string(),
                allowed: Self::ALL
                    .iter()
                    .map(|u| u.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    fn offset(&self, delta: TimeDelta) -> i64 {
        match self {
            TimeUnit::Days => delta.num_days(),
            TimeUnit::Hours => delta.num_hours(),
            TimeUnit::Minutes => delta.num_minutes(),
            TimeUnit::Seconds => delta.num_seconds(),
            TimeUnit::Milliseconds => delta.num_milliseconds(),
            TimeUnit::Microseconds => delta
                .num_microseconds()
                .unwrap_or_else(|| delta.num_milliseconds().saturating_mul(1000)),
        }
    }
}

/// Validated calendar and time-unit specification for the `time` variable.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeEncoding {
    calendar: Calendar,
    units: String,
    unit: TimeUnit,
    reference: DateTime<Utc>,
}

impl TimeEncoding {
    /// Parses a calendar name and a `"<unit> since <ISO-8601 timestamp>"`
    /// string, both checked against the fixed enumerations.
    pub fn parse(calendar: &str, units: &str) -> Result<Self> {
        let calendar = Calendar::parse(calendar)?;

        let pattern = Regex::new(r"^\s*(\w+)\s+since\s+(.+?)\s*$").unwrap();
        let caps = pattern
            .captures(units)
            .ok_or_else(|| GribError::InvalidSetting {
                value: units.to_string(),
                allowed: "\"<unit> since <ISO-8601 timestamp>\"".to_string(),
            })?;

        let unit = TimeUnit::parse(&caps[1])?;
        let reference = parse_reference(&caps[2]).ok_or_else(|| GribError::InvalidSetting {
            value: caps[2].to_string(),
            allowed: "an ISO-8601 timestamp, e.g. 2021-01-01T00:00:00".to_string(),
        })?;

        Ok(Self {
            calendar,
            units: units.trim().to_string(),
            unit,
            reference,
        })
    }

    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    /// The unit string exactly as configured, stored verbatim in the archive.
    pub fn units(&self) -> &str {
        &self.units
    }

    /// Encodes UTC instants as integer offsets from the reference timestamp,
    /// truncating toward zero within the configured unit.
    pub fn encode(&self, timestamps: &[DateTime<Utc>]) -> Vec<i64> {
        timestamps
            .iter()
            .map(|t| self.unit.offset(*t - self.reference))
            .collect()
    }
}

fn parse_reference(raw: &str) -> Option<DateTime<Utc>> {
    const FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
    }
    // A bare date means midnight.
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Output configuration under construction. All three fields must be set
/// before [`ArchiveSettings::verify`] hands out a [`VerifiedSettings`].
#[derive(Debug, Clone, Default)]
pub struct ArchiveSettings {
    output_path: Option<PathBuf>,
    target_crs: Option<TargetCrs>,
    time: Option<TimeEncoding>,
}

impl ArchiveSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the archive destination. The parent directory must already
    /// exist; the file itself is created by the writer.
    pub fn set_output_path(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();

        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
        let parent_exists = match parent {
            Some(p) => p.exists(),
            // A bare file name resolves against the working directory.
            None => true,
        };
        if !parent_exists {
            return Err(GribError::InvalidSetting {
                value: path.display().to_string(),
                allowed: "a path whose parent directory exists".to_string(),
            });
        }

        self.output_path = Some(path);
        Ok(())
    }

    /// Sets the target CRS from a `(kind, payload)` pair, e.g.
    /// `("EPSG", "4326")`.
    pub fn set_target_crs(&mut self, kind: &str, payload: &str) -> Result<()> {
        self.target_crs = Some(TargetCrs::from_kind(kind, payload)?);
        Ok(())
    }

    /// Sets the time axis calendar and unit string.
    pub fn set_time(&mut self, calendar: &str, units: &str) -> Result<()> {
        self.time = Some(TimeEncoding::parse(calendar, units)?);
        Ok(())
    }

    /// Checks that all three settings were supplied and returns the
    /// immutable witness the writer consumes. Idempotent; call again after
    /// any setter to pick up the change.
    pub fn verify(&self) -> Result<VerifiedSettings> {
        let mut missing = Vec::new();
        if self.output_path.is_none() {
            missing.push("output path");
        }
        if self.target_crs.is_none() {
            missing.push("target CRS");
        }
        if self.time.is_none() {
            missing.push("calendar/units");
        }
        if !missing.is_empty() {
            return Err(GribError::SettingsNotReady {
                missing: missing.join(", "),
            });
        }

        Ok(VerifiedSettings {
            output_path: self.output_path.clone().unwrap(),
            target_crs: self.target_crs.clone().unwrap(),
            time: self.time.clone().unwrap(),
        })
    }
}

/// A fully validated settings snapshot. Immutable; gates the archive write.
#[derive(Debug, Clone)]
pub struct VerifiedSettings {
    pub output_path: PathBuf,
    pub target_crs: TargetCrs,
    pub time: TimeEncoding,
}

impl VerifiedSettings {
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn calendar_rejects_unknown_name() {
        let err = Calendar::parse("lunar").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("lunar"));
        assert!(msg.contains("proleptic_gregorian"));
        assert!(msg.contains("360_day"));
    }

    #[test]
    fn unit_string_pattern_is_enforced() {
        let err = TimeEncoding::parse("gregorian", "hours 2021-01-01").unwrap_err();
        assert!(err.to_string().contains("since"));

        let err = TimeEncoding::parse("gregorian", "fortnights since 2021-01-01").unwrap_err();
        assert!(err.to_string().contains("fortnights"));

        let err = TimeEncoding::parse("gregorian", "hours since someday").unwrap_err();
        assert!(err.to_string().contains("someday"));
    }

    #[test]
    fn accepts_space_and_t_separated_timestamps() {
        TimeEncoding::parse("gregorian", "hours since 2021-01-01T00:00:00").unwrap();
        TimeEncoding::parse("gregorian", "hours since 1995-01-01 00:00:00.0").unwrap();
        TimeEncoding::parse("standard", "days since 1970-01-01").unwrap();
    }

    #[test]
    fn encode_offsets_in_hours() {
        let enc = TimeEncoding::parse("gregorian", "hours since 2021-01-01T00:00:00").unwrap();
        let base = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let stamps = [
            base,
            base + TimeDelta::hours(1),
            base + TimeDelta::hours(2),
        ];

        assert_eq!(enc.encode(&stamps), vec![0, 1, 2]);
    }

    #[test]
    fn encode_truncates_partial_units() {
        let enc = TimeEncoding::parse("gregorian", "days since 2021-01-01T00:00:00").unwrap();
        let base = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(enc.encode(&[base + TimeDelta::hours(36)]), vec![1]);
    }

    #[test]
    fn verify_names_every_missing_field() {
        let settings = ArchiveSettings::new();
        let err = settings.verify().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("output path"));
        assert!(msg.contains("target CRS"));
        assert!(msg.contains("calendar/units"));
    }

    #[test]
    fn output_path_parent_must_exist() {
        let mut settings = ArchiveSettings::new();
        let err = settings
            .set_output_path("/definitely/not/a/real/dir/out.nc")
            .unwrap_err();
        assert!(err.to_string().contains("out.nc"));

        // A bare file name is fine.
        settings.set_output_path("out.nc").unwrap();
    }

    #[test]
    fn reverify_after_changing_only_crs() {
        use gdal::spatial_ref::SpatialRef;
        if SpatialRef::from_epsg(4326).is_err() {
            eprintln!("Skipping test: EPSG database not available");
            return;
        }

        let dir = TempDir::new().unwrap();
        let mut settings = ArchiveSettings::new();
        settings.set_output_path(dir.path().join("out.nc")).unwrap();
        settings
            .set_time("gregorian", "hours since 2021-01-01T00:00:00")
            .unwrap();
        settings.set_target_crs("EPSG", "4326").unwrap();
        settings.verify().unwrap();

        // Change just the CRS; path and time stay valid without re-supply.
        settings.set_target_crs("EPSG", "3857").unwrap();
        let verified = settings.verify().unwrap();
        assert_eq!(verified.target_crs, crate::projection::TargetCrs::Epsg(3857));
        assert_eq!(verified.time.units(), "hours since 2021-01-01T00:00:00");
    }
}
