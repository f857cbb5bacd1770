//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Scan
//!
//! ```text
//! input/
//!     sub/ (2 images)
//!         beach.png
//!         dawn.jpg
//!     001 photo.JPG
//!         Rating: 4
//!         Tags: sky, sunset
//!     002 scan.tif
//! ```
//!
//! Folders come first, then images with a positional index. Rating and tag
//! lines only appear when set.
//!
//! ## Options
//!
//! ```text
//! sub/
//!     beach.png
//! photo.JPG
//! ```
//!
//! ## Warm
//!
//! ```text
//! Thumbnails: 3 cached, 2 generated (5 total)
//!     Cache: .cache/thumbnails
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::cache::CacheStats;
use crate::scan::{DirectoryItem, SelectableEntry};
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Folder header with its image count, if any were listed.
///
/// ```text
/// sub/
/// sub/ (1 image)
/// sub/ (3 images)
/// ```
fn folder_header(name: &str, count: usize) -> String {
    match count {
        0 => format!("{}/", name),
        1 => format!("{}/ (1 image)", name),
        n => format!("{}/ ({} images)", name, n),
    }
}

// ============================================================================
// Scan
// ============================================================================

/// Format a directory listing. Expects items already in display order.
pub fn format_listing(directory: &Path, items: &[DirectoryItem]) -> Vec<String> {
    let mut lines = vec![format!("{}/", directory.display())];
    if items.is_empty() {
        lines.push(format!("{}(no images)", indent(1)));
        return lines;
    }

    let mut image_pos = 0;
    for item in items {
        match item {
            DirectoryItem::Folder(folder) => {
                lines.push(format!(
                    "{}{}",
                    indent(1),
                    folder_header(&folder.name, folder.files.len())
                ));
                for file in &folder.files {
                    lines.push(format!("{}{}", indent(2), file));
                }
            }
            DirectoryItem::Image(image) => {
                image_pos += 1;
                lines.push(format!(
                    "{}{} {}",
                    indent(1),
                    format_index(image_pos),
                    image.name
                ));
                if image.rating != 0 {
                    lines.push(format!("{}Rating: {}", indent(2), image.rating));
                }
                if !image.tags.is_empty() {
                    lines.push(format!("{}Tags: {}", indent(2), image.tags.join(", ")));
                }
            }
        }
    }
    lines
}

pub fn print_listing(directory: &Path, items: &[DirectoryItem]) {
    for line in format_listing(directory, items) {
        println!("{}", line);
    }
}

// ============================================================================
// Options
// ============================================================================

/// Format the loader node's selector options in their given order.
pub fn format_options(entries: &[SelectableEntry]) -> Vec<String> {
    let mut lines = Vec::new();
    for entry in entries {
        match entry {
            SelectableEntry::Folder { name, files } => {
                lines.push(format!("{}/", name));
                for file in files {
                    lines.push(format!("{}{}", indent(1), file));
                }
            }
            SelectableEntry::File(name) => lines.push(name.clone()),
        }
    }
    lines
}

pub fn print_options(entries: &[SelectableEntry]) {
    for line in format_options(entries) {
        println!("{}", line);
    }
}

// ============================================================================
// Warm
// ============================================================================

pub fn format_warm_summary(stats: &CacheStats, cache_dir: &Path) -> Vec<String> {
    vec![
        format!("Thumbnails: {}", stats),
        format!("{}Cache: {}", indent(1), cache_dir.display()),
    ]
}

pub fn print_warm_summary(stats: &CacheStats, cache_dir: &Path) {
    for line in format_warm_summary(stats, cache_dir) {
        println!("{}", line);
    }
}
