//! Thumbnail cache for the image browser.
//!
//! Decoding a full-size photo to draw a 400px tile is the expensive part of
//! every directory listing. This module keeps one downscaled JPEG per source
//! file and only re-encodes when the source has changed since the preview was
//! written.
//!
//! # Design
//!
//! ## Cache keys
//!
//! Artifacts are named by [`derive_key`]: SHA-256 over the source path
//! followed by its modification time. Touching a file therefore moves its
//! preview to a new name; the old artifact is simply never looked up again.
//! When the source can't be stat'ed the key falls back to the path alone, so
//! key derivation never fails.
//!
//! ## Freshness
//!
//! A cached artifact is used only when its own mtime is strictly newer than
//! the source's. Anything else (missing, equal or older) is regenerated.
//!
//! ## Storage
//!
//! Flat directory of `<key>.jpg` files. Each preview is encoded into a temp
//! file inside the cache directory and renamed into place, so readers never
//! see half-written JPEGs and two requests regenerating the same preview
//! just replace each other's identical bytes.
//!
//! ## Failure
//!
//! The cache is best-effort: decode or encode failures are logged at debug
//! level and surface as [`ThumbnailOutcome::Failed`]. Callers serve the
//! original file instead.

use crate::config::LoaderConfig;
use crate::imaging::{BackendError, ImageBackend, Quality, RustBackend, ThumbnailParams};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// Extension of every cached preview.
pub const THUMBNAIL_EXTENSION: &str = "jpg";

/// Stable cache key for a source file in its current state.
///
/// Hex SHA-256 of the path string followed by the modification time in
/// nanoseconds since the epoch. Falls back to the digest of the path alone
/// when the file can't be stat'ed.
pub fn derive_key(path: &Path) -> String {
    let path_str = path.to_string_lossy();
    let mut hasher = Sha256::new();
    hasher.update(path_str.as_bytes());
    if let Some(nanos) = modified(path).and_then(|t| t.duration_since(UNIX_EPOCH).ok()) {
        hasher.update(nanos.as_nanos().to_string().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Which branch a thumbnail lookup took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailOutcome {
    /// A fresh artifact already existed; the source was not decoded.
    Hit(PathBuf),
    /// The artifact was missing or stale and has been (re)written.
    Generated(PathBuf),
    /// The source could not be turned into a preview.
    Failed,
}

impl ThumbnailOutcome {
    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            ThumbnailOutcome::Hit(path) | ThumbnailOutcome::Generated(path) => Some(path),
            ThumbnailOutcome::Failed => None,
        }
    }
}

/// Lazily populated directory of downscaled previews.
pub struct ThumbnailCache<B: ImageBackend = RustBackend> {
    cache_dir: PathBuf,
    max_dimension: u32,
    quality: Quality,
    backend: B,
}

impl ThumbnailCache<RustBackend> {
    /// Cache backed by the pure-Rust imaging backend.
    pub fn new(config: &LoaderConfig) -> io::Result<Self> {
        Self::with_backend(config, RustBackend::new())
    }
}

impl<B: ImageBackend> ThumbnailCache<B> {
    /// Build a cache using `backend` for the pixel work.
    ///
    /// Creates the cache directory if needed.
    pub fn with_backend(config: &LoaderConfig, backend: B) -> io::Result<Self> {
        std::fs::create_dir_all(&config.cache_dir)?;
        Ok(Self {
            cache_dir: config.cache_dir.clone(),
            max_dimension: config.thumbnails.max_size,
            quality: Quality::new(config.thumbnails.quality),
            backend,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Configured bounding box for previews.
    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Location of the artifact for `source` in its current state.
    pub fn artifact_path(&self, source: &Path) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", derive_key(source), THUMBNAIL_EXTENSION))
    }

    /// Path of an up-to-date preview of `source`, generating it if needed.
    ///
    /// Returns `None` when the source can't be decoded or the preview can't
    /// be written; callers fall back to the original file.
    pub fn get_or_create(&self, source: &Path, max_dimension: u32) -> Option<PathBuf> {
        self.lookup(source, max_dimension).into_path()
    }

    /// Like [`get_or_create`](Self::get_or_create), reporting whether the
    /// preview was served from cache.
    pub fn lookup(&self, source: &Path, max_dimension: u32) -> ThumbnailOutcome {
        let artifact = self.artifact_path(source);

        if is_fresh(&artifact, source) {
            trace!(source = %source.display(), "thumbnail cache hit");
            return ThumbnailOutcome::Hit(artifact);
        }

        match self.generate(source, &artifact, max_dimension) {
            Ok(()) => {
                debug!(
                    source = %source.display(),
                    artifact = %artifact.display(),
                    "thumbnail generated"
                );
                ThumbnailOutcome::Generated(artifact)
            }
            Err(e) => {
                debug!(source = %source.display(), error = %e, "thumbnail generation failed");
                ThumbnailOutcome::Failed
            }
        }
    }

    /// Delete the artifact for `source` in its current state.
    ///
    /// Call before removing the source itself: once the file is gone its key
    /// can no longer include the mtime. Returns whether a file was removed.
    pub fn remove(&self, source: &Path) -> io::Result<bool> {
        let artifact = self.artifact_path(source);
        match std::fs::remove_file(&artifact) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Bring previews for every source up to date, in parallel on the
    /// current rayon pool.
    pub fn warm(&self, sources: &[PathBuf]) -> CacheStats {
        sources
            .par_iter()
            .map(|source| self.lookup(source, self.max_dimension))
            .fold(CacheStats::default, |mut stats, outcome| {
                stats.record(&outcome);
                stats
            })
            .reduce(CacheStats::default, CacheStats::merge)
    }

    /// Encode into a temp file next to the artifact, then rename over it.
    fn generate(
        &self,
        source: &Path,
        artifact: &Path,
        max_dimension: u32,
    ) -> Result<(), BackendError> {
        let tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .suffix(&format!(".{}", THUMBNAIL_EXTENSION))
            .tempfile_in(&self.cache_dir)?;

        self.backend.thumbnail(&ThumbnailParams {
            source: source.to_path_buf(),
            output: tmp.path().to_path_buf(),
            max_dimension,
            quality: self.quality,
        })?;

        tmp.persist(artifact).map_err(|e| e.error)?;
        Ok(())
    }
}

/// An artifact is fresh iff its mtime is strictly newer than the source's.
fn is_fresh(artifact: &Path, source: &Path) -> bool {
    match (modified(artifact), modified(source)) {
        (Some(cached), Some(original)) => cached > original,
        _ => false,
    }
}

/// Summary of cache behaviour over a batch of lookups.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub generated: u32,
    pub failed: u32,
}

impl CacheStats {
    pub fn record(&mut self, outcome: &ThumbnailOutcome) {
        match outcome {
            ThumbnailOutcome::Hit(_) => self.hits += 1,
            ThumbnailOutcome::Generated(_) => self.generated += 1,
            ThumbnailOutcome::Failed => self.failed += 1,
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            hits: self.hits + other.hits,
            generated: self.generated + other.generated,
            failed: self.failed + other.failed,
        }
    }

    pub fn total(&self) -> u32 {
        self.hits + self.generated + self.failed
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 || self.failed > 0 {
            if self.failed > 0 {
                write!(
                    f,
                    "{} cached, {} generated, {} failed ({} total)",
                    self.hits,
                    self.generated,
                    self.failed,
                    self.total()
                )
            } else {
                write!(
                    f,
                    "{} cached, {} generated ({} total)",
                    self.hits,
                    self.generated,
                    self.total()
                )
            }
        } else {
            write!(f, "{} generated", self.generated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::test_helpers::{create_test_jpeg, create_test_rgba_png, set_mtime_secs};
    use image::GenericImageView;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir) -> LoaderConfig {
        LoaderConfig {
            root_dir: tmp.path().to_path_buf(),
            cache_dir: tmp.path().join("cache"),
            ..LoaderConfig::default()
        }
    }

    fn mock_cache(tmp: &TempDir) -> ThumbnailCache<MockBackend> {
        ThumbnailCache::with_backend(&config_in(tmp), MockBackend::new()).unwrap()
    }

    // =========================================================================
    // Key derivation
    // =========================================================================

    #[test]
    fn derive_key_deterministic() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.png");
        fs::write(&path, b"x").unwrap();

        let k1 = derive_key(&path);
        let k2 = derive_key(&path);
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 64); // SHA-256 hex is 64 chars
    }

    #[test]
    fn derive_key_changes_with_mtime() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.png");
        fs::write(&path, b"x").unwrap();

        set_mtime_secs(&path, 1_000);
        let k1 = derive_key(&path);
        set_mtime_secs(&path, 2_000);
        let k2 = derive_key(&path);
        assert_ne!(k1, k2);
    }

    #[test]
    fn derive_key_differs_between_paths() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.png");
        let b = tmp.path().join("b.png");
        fs::write(&a, b"x").unwrap();
        fs::write(&b, b"x").unwrap();
        set_mtime_secs(&a, 1_000);
        set_mtime_secs(&b, 1_000);
        assert_ne!(derive_key(&a), derive_key(&b));
    }

    #[test]
    fn derive_key_missing_file_hashes_path_only() {
        let path = Path::new("/nonexistent/photo.jpg");
        let expected = format!("{:x}", Sha256::digest(b"/nonexistent/photo.jpg"));
        assert_eq!(derive_key(path), expected);
    }

    // =========================================================================
    // Lookup / freshness
    // =========================================================================

    #[test]
    fn construction_creates_cache_dir() {
        let tmp = TempDir::new().unwrap();
        let cache = mock_cache(&tmp);
        assert!(cache.cache_dir().is_dir());
        assert_eq!(cache.max_dimension(), 400);
    }

    #[test]
    fn artifact_path_lives_in_cache_dir() {
        let tmp = TempDir::new().unwrap();
        let cache = mock_cache(&tmp);
        let source = tmp.path().join("photo.png");
        fs::write(&source, b"x").unwrap();

        let artifact = cache.artifact_path(&source);
        assert_eq!(artifact.parent(), Some(cache.cache_dir()));
        assert_eq!(
            artifact.file_name().unwrap().to_string_lossy(),
            format!("{}.jpg", derive_key(&source))
        );
    }

    #[test]
    fn miss_generates_artifact() {
        let tmp = TempDir::new().unwrap();
        let cache = mock_cache(&tmp);
        let source = tmp.path().join("photo.png");
        fs::write(&source, b"x").unwrap();
        set_mtime_secs(&source, 1_000);

        let outcome = cache.lookup(&source, 400);
        let artifact = cache.artifact_path(&source);
        assert_eq!(outcome, ThumbnailOutcome::Generated(artifact.clone()));
        assert!(artifact.exists());
        assert_eq!(cache.backend.thumbnail_count(), 1);
    }

    #[test]
    fn fresh_artifact_is_not_redecoded() {
        let tmp = TempDir::new().unwrap();
        let cache = mock_cache(&tmp);
        let source = tmp.path().join("photo.png");
        fs::write(&source, b"x").unwrap();
        set_mtime_secs(&source, 1_000);

        let artifact = cache.artifact_path(&source);
        fs::write(&artifact, b"cached").unwrap();
        set_mtime_secs(&artifact, 2_000);

        let outcome = cache.lookup(&source, 400);
        assert_eq!(outcome, ThumbnailOutcome::Hit(artifact.clone()));
        assert_eq!(cache.backend.thumbnail_count(), 0);
        assert_eq!(fs::read(&artifact).unwrap(), b"cached");
    }

    #[test]
    fn stale_artifact_is_regenerated() {
        let tmp = TempDir::new().unwrap();
        let cache = mock_cache(&tmp);
        let source = tmp.path().join("photo.png");
        fs::write(&source, b"x").unwrap();
        set_mtime_secs(&source, 1_000);

        let artifact = cache.artifact_path(&source);
        fs::write(&artifact, b"old").unwrap();
        set_mtime_secs(&artifact, 500);

        let outcome = cache.lookup(&source, 400);
        assert_eq!(outcome, ThumbnailOutcome::Generated(artifact.clone()));
        assert_eq!(cache.backend.thumbnail_count(), 1);
        assert_eq!(fs::read(&artifact).unwrap(), b"mock preview");
    }

    #[test]
    fn equal_mtime_counts_as_stale() {
        let tmp = TempDir::new().unwrap();
        let cache = mock_cache(&tmp);
        let source = tmp.path().join("photo.png");
        fs::write(&source, b"x").unwrap();
        set_mtime_secs(&source, 1_000);

        let artifact = cache.artifact_path(&source);
        fs::write(&artifact, b"old").unwrap();
        set_mtime_secs(&artifact, 1_000);

        assert!(matches!(
            cache.lookup(&source, 400),
            ThumbnailOutcome::Generated(_)
        ));
    }

    #[test]
    fn lookup_passes_bound_and_quality_to_backend() {
        let tmp = TempDir::new().unwrap();
        let mut config = config_in(&tmp);
        config.thumbnails.quality = 70;
        let cache = ThumbnailCache::with_backend(&config, MockBackend::new()).unwrap();
        let source = tmp.path().join("photo.png");
        fs::write(&source, b"x").unwrap();

        cache.get_or_create(&source, 128).unwrap();
        let ops = cache.backend.get_operations();
        assert!(matches!(
            &ops[0],
            crate::imaging::backend::tests::RecordedOp::Thumbnail {
                max_dimension: 128,
                quality: 70,
                ..
            }
        ));
    }

    #[test]
    fn failure_returns_none_and_leaves_no_files() {
        let tmp = TempDir::new().unwrap();
        let cache = ThumbnailCache::with_backend(&config_in(&tmp), MockBackend::failing()).unwrap();
        let source = tmp.path().join("broken.png");
        fs::write(&source, b"x").unwrap();

        assert_eq!(cache.get_or_create(&source, 400), None);
        assert_eq!(fs::read_dir(cache.cache_dir()).unwrap().count(), 0);
    }

    #[test]
    fn missing_source_fails() {
        let tmp = TempDir::new().unwrap();
        let cache = ThumbnailCache::new(&config_in(&tmp)).unwrap();
        assert_eq!(
            cache.lookup(&tmp.path().join("missing.jpg"), 400),
            ThumbnailOutcome::Failed
        );
    }

    // =========================================================================
    // Real backend
    // =========================================================================

    #[test]
    fn real_thumbnail_fits_bound_without_alpha() {
        let tmp = TempDir::new().unwrap();
        let cache = ThumbnailCache::new(&config_in(&tmp)).unwrap();
        let source = tmp.path().join("wide.png");
        create_test_rgba_png(&source, 1000, 500);
        set_mtime_secs(&source, 1_000);

        let artifact = cache.get_or_create(&source, 400).unwrap();
        let preview = image::open(&artifact).unwrap();
        assert_eq!(preview.dimensions(), (400, 200));
        assert!(!preview.color().has_alpha());

        // Second lookup is served from cache
        assert_eq!(cache.lookup(&source, 400), ThumbnailOutcome::Hit(artifact));
    }

    #[test]
    fn corrupt_source_yields_none() {
        let tmp = TempDir::new().unwrap();
        let cache = ThumbnailCache::new(&config_in(&tmp)).unwrap();
        let source = tmp.path().join("corrupt.jpg");
        fs::write(&source, b"\xFF\xD8 truncated").unwrap();

        assert_eq!(cache.get_or_create(&source, 400), None);
    }

    // =========================================================================
    // Removal / warming
    // =========================================================================

    #[test]
    fn remove_deletes_artifact() {
        let tmp = TempDir::new().unwrap();
        let cache = mock_cache(&tmp);
        let source = tmp.path().join("photo.png");
        fs::write(&source, b"x").unwrap();

        let artifact = cache.get_or_create(&source, 400).unwrap();
        assert!(cache.remove(&source).unwrap());
        assert!(!artifact.exists());
        assert!(!cache.remove(&source).unwrap());
    }

    #[test]
    fn warm_counts_outcomes() {
        let tmp = TempDir::new().unwrap();
        let cache = ThumbnailCache::new(&config_in(&tmp)).unwrap();
        let good = tmp.path().join("good.jpg");
        let bad = tmp.path().join("bad.jpg");
        create_test_jpeg(&good, 64, 64);
        set_mtime_secs(&good, 1_000);
        fs::write(&bad, b"nope").unwrap();

        let sources = vec![good.clone(), bad];
        let first = cache.warm(&sources);
        assert_eq!(
            first,
            CacheStats {
                hits: 0,
                generated: 1,
                failed: 1
            }
        );

        let second = cache.warm(&[good]);
        assert_eq!(second.hits, 1);
    }

    // =========================================================================
    // CacheStats
    // =========================================================================

    #[test]
    fn cache_stats_display_with_hits() {
        let s = CacheStats {
            hits: 5,
            generated: 2,
            failed: 0,
        };
        assert_eq!(format!("{}", s), "5 cached, 2 generated (7 total)");
    }

    #[test]
    fn cache_stats_display_with_failures() {
        let s = CacheStats {
            hits: 3,
            generated: 2,
            failed: 1,
        };
        assert_eq!(
            format!("{}", s),
            "3 cached, 2 generated, 1 failed (6 total)"
        );
    }

    #[test]
    fn cache_stats_display_no_hits() {
        let s = CacheStats {
            hits: 0,
            generated: 3,
            failed: 0,
        };
        assert_eq!(format!("{}", s), "3 generated");
    }
}
