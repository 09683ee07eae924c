//! Listing and fetching forecast files from a plain HTTP file index.
//!
//! Works against simple directory listings (opendata.dwd.de style) where
//! each file is an `<a href>` in the page body. Blocking throughout, like
//! the rest of the pipeline.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::error::{GribError, Result};
use crate::sentinel::Sentinel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched,
    SkippedExisting,
}

/// Returns the names of all files at `base_url` whose name ends in `ext`.
///
/// `base_url` must end in `/`. Zero matches is an error naming the URL and
/// extension, not an empty result.
pub fn list_names(base_url: &str, ext: &str) -> Result<Vec<String>> {
    check_base_url(base_url)?;
    if ext.is_empty() {
        return Err(GribError::InvalidSetting {
            value: ext.to_string(),
            allowed: "a non-empty file extension".to_string(),
        });
    }

    let body = reqwest::blocking::get(base_url)?.error_for_status()?.text()?;
    let names = names_from_index(&body, ext);

    info!(url = base_url, count = names.len(), "listed index");

    if names.is_empty() {
        return Err(GribError::EmptyListing {
            url: base_url.to_string(),
            ext: ext.to_string(),
        });
    }
    Ok(names)
}

/// Pulls `href` targets out of an index page and keeps plain file names
/// with the wanted ending.
fn names_from_index(body: &str, ext: &str) -> Vec<String> {
    static HREF: OnceLock<Regex> = OnceLock::new();
    let href = HREF.get_or_init(|| Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).unwrap());

    href.captures_iter(body)
        .map(|caps| caps[1].to_string())
        .filter(|name| name.ends_with(ext) && !name.contains('/'))
        .collect()
}

/// Downloads `base_url`/`name` into `dest_dir`, protected by the sentinel
/// marker protocol: a marker left by an interrupted attempt forces a
/// redownload, and with `overwrite` false an already-complete file is left
/// untouched.
pub fn download_file(
    base_url: &str,
    name: &str,
    dest_dir: &Path,
    overwrite: bool,
) -> Result<FetchOutcome> {
    check_base_url(base_url)?;
    if !dest_dir.is_dir() {
        return Err(GribError::InvalidSetting {
            value: dest_dir.display().to_string(),
            allowed: "an existing download directory".to_string(),
        });
    }

    let dest = dest_dir.join(name);
    let (sentinel, stale) = Sentinel::arm(&dest)?;
    if stale {
        warn!(
            dest = %dest.display(),
            "previous download attempt did not finish; redownloading"
        );
    }

    if !(overwrite || stale) && dest.exists() {
        sentinel.complete()?;
        info!(dest = %dest.display(), "file exists already, not downloading");
        return Ok(FetchOutcome::SkippedExisting);
    }

    let url = format!("{base_url}{name}");
    info!(url, dest = %dest.display(), "downloading");

    let mut response = reqwest::blocking::get(&url)?.error_for_status()?;
    let mut file = File::create(&dest).map_err(|e| GribError::io(&dest, e))?;
    response.copy_to(&mut file)?;

    sentinel.complete()?;
    Ok(FetchOutcome::Fetched)
}

/// Lists the index and fetches every matching file into `dest_dir`.
pub fn download_all(
    base_url: &str,
    ext: &str,
    dest_dir: &Path,
    overwrite: bool,
) -> Result<Vec<PathBuf>> {
    let names = list_names(base_url, ext)?;
    download_names(base_url, &names, dest_dir, overwrite)
}

/// Fetches each of `names` from `base_url` into `dest_dir` and returns the
/// paths that ended up on disk. Failures of individual files are logged and
/// reported at the end; one bad file does not abort the batch.
pub fn download_names(
    base_url: &str,
    names: &[String],
    dest_dir: &Path,
    overwrite: bool,
) -> Result<Vec<PathBuf>> {
    check_base_url(base_url)?;

    let mut fetched = Vec::with_capacity(names.len());
    let mut failures = 0usize;
    for name in names {
        match download_file(base_url, name, dest_dir, overwrite) {
            Ok(_) => fetched.push(dest_dir.join(name)),
            Err(e) => {
                warn!(name, error = %e, "download failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        warn!(failures, total = names.len(), "some downloads failed");
    }
    Ok(fetched)
}

fn check_base_url(base_url: &str) -> Result<()> {
    if base_url.is_empty() || !base_url.ends_with('/') {
        return Err(GribError::InvalidSetting {
            value: base_url.to_string(),
            allowed: "a non-empty URL ending in \"/\"".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const INDEX: &str = r#"
        <html><body>
        <a href="../">Parent Directory</a>
        <a href="TOT_PRECIP.2D.199501.grb.bz2">TOT_PRECIP.2D.199501.grb.bz2</a>
        <a href="TOT_PRECIP.2D.199502.grb.bz2">TOT_PRECIP.2D.199502.grb.bz2</a>
        <a href='TOT_PRECIP.2D.199503.grb.bz2'>single quoted</a>
        <a href="README.txt">README.txt</a>
        </body></html>
    "#;

    #[test]
    fn index_names_are_filtered_by_extension() {
        let names = names_from_index(INDEX, ".bz2");
        assert_eq!(
            names,
            vec![
                "TOT_PRECIP.2D.199501.grb.bz2",
                "TOT_PRECIP.2D.199502.grb.bz2",
                "TOT_PRECIP.2D.199503.grb.bz2",
            ]
        );

        assert_eq!(names_from_index(INDEX, ".txt"), vec!["README.txt"]);
        assert!(names_from_index(INDEX, ".grib2").is_empty());
    }

    #[test]
    fn parent_links_are_ignored() {
        let names = names_from_index(INDEX, "/");
        assert!(names.is_empty());
    }

    #[test]
    fn base_url_must_end_in_slash() {
        let err = list_names("https://example.com/data", ".bz2").unwrap_err();
        assert!(err.to_string().contains("https://example.com/data"));
    }

    #[test]
    fn existing_download_is_skipped_before_any_request() {
        let dir = TempDir::new().unwrap();
        let name = "TOT_PRECIP.2D.199501.grb.bz2";
        std::fs::write(dir.path().join(name), b"payload").unwrap();

        // The base URL is unreachable on purpose; the skip path must not
        // touch the network.
        let outcome =
            download_file("http://127.0.0.1:1/no-such-index/", name, dir.path(), false).unwrap();
        assert_eq!(outcome, FetchOutcome::SkippedExisting);
        assert_eq!(std::fs::read(dir.path().join(name)).unwrap(), b"payload");
        assert!(!Sentinel::marker_path(&dir.path().join(name)).exists());
    }

    #[test]
    fn batch_survives_a_failed_file() {
        let dir = TempDir::new().unwrap();
        let ok_name = "TOT_PRECIP.2D.199501.grb.bz2";
        let bad_name = "TOT_PRECIP.2D.199502.grb.bz2";
        std::fs::write(dir.path().join(ok_name), b"payload").unwrap();

        // The first name exists already and is skipped without network
        // access; the second needs the (unreachable) host and fails. The
        // batch must still report the file that is on disk.
        let names = vec![ok_name.to_string(), bad_name.to_string()];
        let fetched =
            download_names("http://127.0.0.1:1/no-such-index/", &names, dir.path(), false)
                .unwrap();

        assert_eq!(fetched, vec![dir.path().join(ok_name)]);
        // The failed attempt leaves its marker armed so a retry redownloads.
        assert!(Sentinel::marker_path(&dir.path().join(bad_name)).exists());
    }

    #[test]
    fn download_dir_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nested");
        let err =
            download_file("http://example.com/", "a.bz2", &missing, false).unwrap_err();
        assert!(err.to_string().contains("nested"));
    }
}
