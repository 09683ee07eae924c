//! bz2 decompression of downloaded forecast files.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use bzip2::read::BzDecoder;
use tracing::{info, warn};

use crate::error::{GribError, Result};
use crate::sentinel::Sentinel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpackOutcome {
    Unpacked,
    SkippedExisting,
}

/// Decompresses a bz2 archive into a single output file, under the same
/// sentinel-marker protocol as fetch and archive write: an interrupted
/// attempt leaves the marker and forces a rewrite, a completed output with
/// `overwrite` false is kept as is.
pub fn unpack_bz2(input: &Path, output: &Path, overwrite: bool) -> Result<UnpackOutcome> {
    if !input.is_file() {
        return Err(GribError::InvalidSetting {
            value: input.display().to_string(),
            allowed: "a path to an existing bz2 file".to_string(),
        });
    }
    let parent_ok = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or(true, |p| p.exists());
    if !parent_ok {
        return Err(GribError::InvalidSetting {
            value: output.display().to_string(),
            allowed: "an output path whose parent directory exists".to_string(),
        });
    }

    let (sentinel, stale) = Sentinel::arm(output)?;
    if stale {
        warn!(
            output = %output.display(),
            "previous unpack attempt did not finish; unpacking again"
        );
    }

    if !(overwrite || stale) && output.exists() {
        sentinel.complete()?;
        info!(output = %output.display(), "output exists already, not unpacking");
        return Ok(UnpackOutcome::SkippedExisting);
    }

    let reader = File::open(input).map_err(|e| GribError::io(input, e))?;
    let mut decoder = BzDecoder::new(BufReader::new(reader));
    let mut writer =
        BufWriter::new(File::create(output).map_err(|e| GribError::io(output, e))?);

    io::copy(&mut decoder, &mut writer).map_err(|e| GribError::io(output, e))?;

    info!(
        input = %input.display(),
        output = %output.display(),
        "unpacked bz2"
    );

    sentinel.complete()?;
    Ok(UnpackOutcome::Unpacked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    const PAYLOAD: &[u8] = b"GRIB pretend payload, compressed and restored";

    fn write_fixture(path: &Path) {
        let mut encoder =
            BzEncoder::new(File::create(path).unwrap(), Compression::best());
        encoder.write_all(PAYLOAD).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn decompresses_byte_exactly() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("file.grb.bz2");
        let output = dir.path().join("file.grb");
        write_fixture(&input);

        assert_eq!(
            unpack_bz2(&input, &output, false).unwrap(),
            UnpackOutcome::Unpacked
        );
        assert_eq!(std::fs::read(&output).unwrap(), PAYLOAD);
        assert!(!Sentinel::marker_path(&output).exists());
    }

    #[test]
    fn second_run_is_skipped_and_identical() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("file.grb.bz2");
        let output = dir.path().join("file.grb");
        write_fixture(&input);

        unpack_bz2(&input, &output, false).unwrap();
        let first = std::fs::read(&output).unwrap();

        assert_eq!(
            unpack_bz2(&input, &output, false).unwrap(),
            UnpackOutcome::SkippedExisting
        );
        assert_eq!(std::fs::read(&output).unwrap(), first);
    }

    #[test]
    fn stale_marker_forces_fresh_unpack() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("file.grb.bz2");
        let output = dir.path().join("file.grb");
        write_fixture(&input);

        // Simulate an interrupted attempt.
        std::fs::write(Sentinel::marker_path(&output), b"").unwrap();
        std::fs::write(&output, b"partial").unwrap();

        assert_eq!(
            unpack_bz2(&input, &output, false).unwrap(),
            UnpackOutcome::Unpacked
        );
        assert_eq!(std::fs::read(&output).unwrap(), PAYLOAD);
        assert!(!Sentinel::marker_path(&output).exists());
    }

    #[test]
    fn missing_input_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = unpack_bz2(
            &dir.path().join("nope.bz2"),
            &dir.path().join("out.grb"),
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("nope.bz2"));
    }
}
