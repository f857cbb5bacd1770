//! Shared test utilities for the imageloader test suite.
//!
//! Provides synthetic image writers, mtime control and a small directory
//! fixture builder used by the cache, scan and server tests.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! create_test_jpeg(&tmp.path().join("photo.jpg"), 800, 600);
//! set_mtime_secs(&tmp.path().join("photo.jpg"), 1_000);
//! ```

use image::{ImageEncoder, RgbImage, RgbaImage};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

// =========================================================================
// Synthetic images
// =========================================================================

/// Create a small valid JPEG file with the given dimensions.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let file = fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

/// Create an RGBA PNG whose left half is fully transparent.
pub fn create_test_rgba_png(path: &Path, width: u32, height: u32) {
    let img = RgbaImage::from_fn(width, height, |x, _| {
        let alpha = if x < width / 2 { 0 } else { 255 };
        image::Rgba([20, 40, 60, alpha])
    });
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

// =========================================================================
// Filesystem helpers
// =========================================================================

/// Set a file's modification time to `secs` seconds after the epoch.
pub fn set_mtime_secs(path: &Path, secs: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

/// Write `contents` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Build the canonical scan fixture:
///
/// ```text
/// root/
/// ├── photo.JPG
/// ├── note.txt
/// ├── .hidden.png
/// └── sub/
///     ├── inner.png
///     └── readme.md
/// ```
pub fn setup_scan_fixture(root: &Path) {
    create_test_jpeg(&root.join("photo.JPG"), 32, 24);
    write_file(root, "note.txt", b"not an image");
    write_file(root, ".hidden.png", b"hidden");
    write_file(root, "sub/inner.png", b"png bytes");
    write_file(root, "sub/readme.md", b"# readme");
}
