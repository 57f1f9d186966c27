use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::info;

use crate::config::SourceLocation;
use crate::errors::{Error, FetchError};
use crate::sfga::SfgaArchive;

/// The minimum SFGA schema version this pipeline accepts (spec §4.2 step
/// 4). Archives older than this fail fast with `VersionTooOld` before any
/// row is read.
pub const MINIMUM_SFGA_VERSION: u32 = 1;

/// `{4-digit-id}_{slug}_{YYYY-MM-DD}_v{version}.sqlite[.zip]` (spec §6).
fn filename_pattern() -> Regex {
    Regex::new(r"^(\d{4})_([A-Za-z0-9_-]+)_(\d{4}-\d{2}-\d{2})_v(\d+)\.sqlite(\.zip)?$").unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFilename {
    pub id: i32,
    pub slug: String,
    pub date: String,
    pub version: u32,
    pub compressed: bool,
}

pub fn parse_filename(name: &str) -> Option<ParsedFilename> {
    let re = filename_pattern();
    let captures = re.captures(name)?;

    Some(ParsedFilename {
        id: captures.get(1)?.as_str().parse().ok()?,
        slug: captures.get(2)?.as_str().to_string(),
        date: captures.get(3)?.as_str().to_string(),
        version: captures.get(4)?.as_str().parse().ok()?,
        compressed: captures.get(5).is_some(),
    })
}

/// The SFGA Fetcher (spec §4.2). Resolves a source's archive (local or
/// remote), extracts it into a scratch directory, and hands back an open
/// read-only SQLite connection.
pub struct Fetcher<'a> {
    pub cache_dir: &'a Path,
}

impl<'a> Fetcher<'a> {
    pub fn new(cache_dir: &'a Path) -> Fetcher<'a> {
        Fetcher { cache_dir }
    }

    /// Clears the cache directory in full. Spec §4.2 step 1: this is
    /// intentional, not an oversight -- it guarantees at most one source's
    /// artifacts live in cache at a time, for post-mortem inspection of the
    /// last run.
    pub fn clear_cache(&self) -> Result<(), Error> {
        if self.cache_dir.exists() {
            fs::remove_dir_all(self.cache_dir)?;
        }
        fs::create_dir_all(self.cache_dir)?;
        Ok(())
    }

    /// Returns the opened archive plus the filename-derived metadata (spec
    /// §4.8's version/date precedence chain needs it), when the resolved
    /// file matched the conventional naming pattern.
    pub fn fetch(&self, source_id: i32, location: &SourceLocation) -> Result<(SfgaArchive, Option<ParsedFilename>), Error> {
        self.clear_cache()?;

        let (sqlite_path, parsed_filename) = match location {
            SourceLocation::LocalDir(dir) => self.resolve_local(source_id, dir)?,
            SourceLocation::Url(url) => self.download(source_id, url)?,
        };

        let archive = SfgaArchive::open(&sqlite_path)?;

        let version = archive
            .schema_version()?
            .ok_or(FetchError::VersionMissing)?;
        if version < MINIMUM_SFGA_VERSION {
            return Err(FetchError::VersionTooOld {
                found: version,
                minimum: MINIMUM_SFGA_VERSION,
            }
            .into());
        }

        info!(source_id, version, "opened SFGA archive");
        Ok((archive, parsed_filename))
    }

    fn resolve_local(&self, source_id: i32, dir: &Path) -> Result<(PathBuf, Option<ParsedFilename>), Error> {
        let entries = fs::read_dir(dir).map_err(|err| FetchError::Read(err.to_string()))?;

        let mut candidate: Option<(PathBuf, ParsedFilename)> = None;
        for entry in entries {
            let entry = entry.map_err(|err| FetchError::Read(err.to_string()))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(parsed) = parse_filename(&name) {
                if parsed.id == source_id {
                    candidate = Some((entry.path(), parsed));
                    break;
                }
            }
        }

        let (path, parsed) = candidate.ok_or(FetchError::NotFound(source_id))?;
        Ok((self.materialize(&path)?, Some(parsed)))
    }

    fn download(&self, source_id: i32, url: &str) -> Result<(PathBuf, Option<ParsedFilename>), Error> {
        let filename = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FetchError::Read(format!("cannot derive filename from {url}")))?;
        let parsed = parse_filename(filename);

        let dest = self.cache_dir.join(filename);
        let response = ureq::get(url).call().map_err(|err| FetchError::Read(err.to_string()))?;

        let mut reader = response.into_body().into_reader();
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(|err| FetchError::Read(err.to_string()))?;
        fs::write(&dest, &bytes)?;

        let _ = source_id;
        Ok((self.materialize(&dest)?, parsed))
    }

    /// Extracts a `.sqlite.zip` into the cache directory, or returns the
    /// path unchanged if it is already a plain `.sqlite` file (spec §4.2
    /// step 3).
    fn materialize(&self, path: &Path) -> Result<PathBuf, Error> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

        if name.ends_with(".zip") {
            let file = fs::File::open(path)?;
            let mut archive = zip::ZipArchive::new(file).map_err(|err| FetchError::Read(err.to_string()))?;

            let sqlite_name = (0..archive.len())
                .find_map(|i| {
                    let entry = archive.by_index(i).ok()?;
                    let entry_name = entry.name().to_string();
                    entry_name.ends_with(".sqlite").then_some(entry_name)
                })
                .ok_or_else(|| FetchError::Read("zip archive does not contain a .sqlite file".to_string()))?;

            let extracted_path = self.cache_dir.join(&sqlite_name);
            {
                let mut entry = archive
                    .by_name(&sqlite_name)
                    .map_err(|err| FetchError::Read(err.to_string()))?;
                let mut out = fs::File::create(&extracted_path)?;
                std::io::copy(&mut entry, &mut out)?;
            }

            Ok(extracted_path)
        }
        else {
            Ok(path.to_path_buf())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conventional_filenames() {
        let parsed = parse_filename("1000_ruhoff-1980_1980-06-01_v1.sqlite").unwrap();
        assert_eq!(parsed.id, 1000);
        assert_eq!(parsed.slug, "ruhoff-1980");
        assert_eq!(parsed.version, 1);
        assert!(!parsed.compressed);
    }

    #[test]
    fn parses_compressed_filenames() {
        let parsed = parse_filename("0042_col_2024-01-15_v12.sqlite.zip").unwrap();
        assert_eq!(parsed.id, 42);
        assert!(parsed.compressed);
    }

    #[test]
    fn rejects_malformed_filenames() {
        assert!(parse_filename("not-an-archive.txt").is_none());
        assert!(parse_filename("42_col_2024-01-15_v1.sqlite").is_none());
    }

    #[test]
    fn clear_cache_removes_prior_contents() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("sfga");
        fs::create_dir_all(&cache_dir).unwrap();
        fs::write(cache_dir.join("stale.sqlite"), b"old").unwrap();

        let fetcher = Fetcher::new(&cache_dir);
        fetcher.clear_cache().unwrap();

        assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 0);
    }
}
