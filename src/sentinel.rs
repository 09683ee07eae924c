//! Crash-safety marker files shared by the fetch, unpack and archive-write
//! steps.
//!
//! A `<destination>.tmp` marker is created before a destination file is
//! produced and removed only after the step completed. A marker found on a
//! later attempt therefore means the previous attempt failed or was
//! interrupted, and the destination must be rewritten regardless of any
//! overwrite flag.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{GribError, Result};

/// An armed sentinel marker next to a destination file.
///
/// Dropping a `Sentinel` without calling [`Sentinel::complete`] leaves the
/// marker on disk, which forces an overwrite on the next attempt.
#[derive(Debug)]
pub struct Sentinel {
    path: PathBuf,
}

impl Sentinel {
    /// Arms the marker for `destination`, creating it atomically with an
    /// exclusive create so that the presence check and the creation cannot
    /// race. Returns the sentinel and whether a stale marker from an earlier
    /// attempt was found.
    pub fn arm(destination: &Path) -> Result<(Self, bool)> {
        let path = Self::marker_path(destination);

        let stale = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => false,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => true,
            Err(e) => return Err(GribError::io(&path, e)),
        };

        Ok((Self { path }, stale))
    }

    /// Removes the marker. Call only after the destination was fully written
    /// (or the step was skipped on purpose).
    pub fn complete(self) -> Result<()> {
        fs::remove_file(&self.path).map_err(|e| GribError::io(&self.path, e))
    }

    pub fn marker_path(destination: &Path) -> PathBuf {
        let mut name = destination
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        destination.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_arm_creates_marker() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.nc");

        let (sentinel, stale) = Sentinel::arm(&dest).unwrap();
        assert!(!stale);
        assert!(Sentinel::marker_path(&dest).exists());

        sentinel.complete().unwrap();
        assert!(!Sentinel::marker_path(&dest).exists());
    }

    #[test]
    fn stale_marker_is_reported() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.nc");

        // First attempt never completes.
        let (first, stale) = Sentinel::arm(&dest).unwrap();
        assert!(!stale);
        drop(first);
        assert!(Sentinel::marker_path(&dest).exists());

        // Retry sees the leftover marker.
        let (second, stale) = Sentinel::arm(&dest).unwrap();
        assert!(stale);
        second.complete().unwrap();
    }

    #[test]
    fn marker_path_appends_tmp() {
        let marker = Sentinel::marker_path(Path::new("/data/TOT_PRECIP.nc"));
        assert_eq!(marker, Path::new("/data/TOT_PRECIP.nc.tmp"));
    }
}
