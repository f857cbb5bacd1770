//! Directory listing for the image browser.
//!
//! Lists one directory level at a time, the way the front-end navigates:
//!
//! ```text
//! input/                    # configured root
//! ├── photo.JPG             # → Image item (stat + rating/tags overlaid)
//! ├── note.txt              # → skipped (not an image extension)
//! ├── .cache/               # → skipped (hidden)
//! └── portraits/            # → Folder item
//!     ├── anna.png          #   listed in the folder's `files` when recursive
//!     └── raw/              #   never descended into
//! ```
//!
//! ## Output
//!
//! [`DirectoryIndexer::scan`] returns [`DirectoryItem`]s serialized with a
//! `type` tag (`"folder"` or `"image"`). Items are transient snapshots; only
//! the rating and tags come from the [`MetadataStore`], joined on the
//! image's absolute path.
//!
//! ## Paths
//!
//! `path` is absolute. `relative_path` is relative to the configured root
//! with `/` separators on every platform, or the bare filename for files that
//! aren't under the root.
//!
//! ## Errors
//!
//! Scanning never fails. A directory that doesn't exist lists as empty; an
//! unreadable one is logged and lists as empty; entries that can't be stat'ed
//! are skipped.
//!
//! ## Ordering
//!
//! `scan` returns entries in filesystem order. Presentation order (folders
//! first, case-insensitive names) is applied by [`sort_for_display`];
//! [`DirectoryIndexer::list_selectable_entries`] has its own fixed order.

use crate::config::LoaderConfig;
use crate::metadata::{MetadataMap, MetadataStore};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::warn;

/// Entries whose name starts with this are never listed.
const HIDDEN_PREFIX: char = '.';

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DirectoryItem {
    Folder(FolderItem),
    Image(ImageItem),
}

impl DirectoryItem {
    pub fn name(&self) -> &str {
        match self {
            DirectoryItem::Folder(f) => &f.name,
            DirectoryItem::Image(i) => &i.name,
        }
    }
}

/// A sub-directory and the image filenames directly inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderItem {
    pub name: String,
    /// Empty unless the listing was recursive.
    pub files: Vec<String>,
}

/// An image file with stat info and its stored rating/tags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageItem {
    pub name: String,
    /// Absolute path; the key for thumbnails and metadata.
    pub path: String,
    /// Path relative to the configured root, `/`-separated.
    pub relative_path: String,
    /// Modification time in seconds since the epoch.
    pub mtime: f64,
    /// Size in bytes.
    pub size: u64,
    pub rating: i64,
    pub tags: Vec<String>,
}

/// An option of the loader node's image selector: a folder object or a bare
/// filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SelectableEntry {
    Folder { name: String, files: Vec<String> },
    File(String),
}

/// Order items for presentation: folders first, then case-insensitive by name.
pub fn sort_for_display(items: &mut [DirectoryItem]) {
    items.sort_by_cached_key(|item| {
        (
            matches!(item, DirectoryItem::Image(_)),
            item.name().to_lowercase(),
        )
    });
}

/// Scans directories against a configured root and the metadata store.
pub struct DirectoryIndexer {
    root: PathBuf,
    extensions: Vec<String>,
    metadata: Arc<MetadataStore>,
}

impl DirectoryIndexer {
    pub fn new(config: &LoaderConfig, metadata: Arc<MetadataStore>) -> Self {
        Self {
            root: absolute(&config.root_dir),
            extensions: config.image_extensions(),
            metadata,
        }
    }

    /// Absolute configured root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` has one of the configured image extensions (any case).
    pub fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|known| *known == ext))
    }

    /// List the direct children of `directory`.
    ///
    /// With `recursive`, each folder item also lists the image filenames one
    /// level inside it (never deeper).
    pub fn scan(&self, directory: &Path, recursive: bool) -> Vec<DirectoryItem> {
        if !directory.is_dir() {
            return Vec::new();
        }
        let entries = match fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(directory = %directory.display(), error = %e, "cannot scan directory");
                return Vec::new();
            }
        };

        let metadata = self.metadata.load();
        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with(HIDDEN_PREFIX) {
                    return None;
                }
                self.build_item(name, &entry.path(), recursive, &metadata)
            })
            .collect()
    }

    /// Turn one directory entry into an item, or `None` to skip it.
    fn build_item(
        &self,
        name: String,
        path: &Path,
        recursive: bool,
        metadata: &MetadataMap,
    ) -> Option<DirectoryItem> {
        // fs::metadata follows symlinks, so linked folders and images list too
        let stat = fs::metadata(path).ok()?;

        if stat.is_dir() {
            let files = if recursive {
                self.image_names_in(path)
            } else {
                Vec::new()
            };
            return Some(DirectoryItem::Folder(FolderItem { name, files }));
        }

        if !stat.is_file() || !self.is_image(path) {
            return None;
        }

        let abs = absolute(path);
        let abs_str = abs.to_string_lossy().into_owned();
        let entry = metadata.get(&abs_str).cloned().unwrap_or_default();
        let mtime = stat
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        Some(DirectoryItem::Image(ImageItem {
            relative_path: self.relative_path(&abs, &name),
            name,
            path: abs_str,
            mtime,
            size: stat.len(),
            rating: entry.rating,
            tags: entry.tags,
        }))
    }

    /// Image filenames directly inside `dir`; empty if it can't be read.
    fn image_names_in(&self, dir: &Path) -> Vec<String> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                let path = e.path();
                path.is_file() && self.is_image(&path)
            })
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect()
    }

    /// `/`-separated path of `abs` under the root, or `fallback` outside it.
    pub fn relative_path(&self, abs: &Path, fallback: &str) -> String {
        match abs.strip_prefix(&self.root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            _ => fallback.to_string(),
        }
    }

    /// Options for the loader node's selector.
    ///
    /// Recursive scan of `root`: folder objects first, in scan order, then
    /// image filenames sorted case-insensitively.
    pub fn list_selectable_entries(&self, root: &Path) -> Vec<SelectableEntry> {
        let mut folders = Vec::new();
        let mut files = Vec::new();
        for item in self.scan(root, true) {
            match item {
                DirectoryItem::Folder(f) => folders.push(SelectableEntry::Folder {
                    name: f.name,
                    files: f.files,
                }),
                DirectoryItem::Image(i) => files.push(i.name),
            }
        }
        files.sort_by_cached_key(|name| name.to_uppercase());
        folders
            .into_iter()
            .chain(files.into_iter().map(SelectableEntry::File))
            .collect()
    }
}

/// Make `path` absolute without touching the filesystem.
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
