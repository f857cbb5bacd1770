//! Per-image rating and tag store.
//!
//! Ratings and tags live in one JSON file, keyed by the image's absolute path:
//!
//! ```json
//! {
//!     "/data/input/portraits/anna.png": {
//!         "rating": 4,
//!         "tags": ["portrait", "keeper"]
//!     }
//! }
//! ```
//!
//! ## Access pattern
//!
//! The whole file is read on every access and rewritten on every change.
//! Listings are small (one entry per rated or tagged image) and this keeps
//! the file the single source of truth, editable by hand while the server
//! runs.
//!
//! ## Pruning
//!
//! An entry whose rating is 0 and whose tag list is empty carries no
//! information and is deleted instead of stored. Clearing the last star and
//! tag of an image therefore removes its key from the file.
//!
//! ## Writes
//!
//! Saves go to a temp file in the same directory which is then renamed over
//! the store, so a failed write leaves the previous version intact. Within a
//! process, `update` and `remove_entry` hold a mutex across their
//! load-modify-save cycle; separate processes still race last-write-wins.
//!
//! ## Hand edits and corruption
//!
//! Entries are read leniently: a `null` or missing field takes its default,
//! ratings may be floats (truncated) or numeric strings, and non-string tags
//! are stringified. An entry that still can't be read is skipped with a
//! `warn` and the rest of the store loads normally.
//!
//! A store that isn't valid JSON, or whose top level isn't an object, is
//! logged at `warn`, renamed aside to `<file>.corrupt-<unix-seconds>` and
//! treated as empty, so the next write starts fresh without destroying the
//! damaged copy.

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rating and tags for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataEntry {
    /// Star rating, 0 = unrated.
    #[serde(deserialize_with = "lenient_rating")]
    pub rating: i64,
    /// Trimmed, non-empty, unique tags in insertion order.
    #[serde(deserialize_with = "lenient_tags")]
    pub tags: Vec<String>,
}

impl MetadataEntry {
    /// True when the entry carries nothing worth persisting.
    pub fn is_empty(&self) -> bool {
        self.rating == 0 && self.tags.is_empty()
    }
}

/// Full store contents, ordered by path for stable, diffable output.
pub type MetadataMap = BTreeMap<String, MetadataEntry>;

/// Trim tags, drop empties and duplicates, keep first-seen order.
///
/// ```
/// # use imageloader::metadata::normalize_tags;
/// let tags = normalize_tags([" a ", "", "b", "a"]);
/// assert_eq!(tags, vec!["a", "b"]);
/// ```
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Integer rating from a JSON number or an integer string.
///
/// Floats are truncated toward zero. Anything else is `None`.
///
/// ```
/// # use imageloader::metadata::coerce_rating;
/// # use serde_json::json;
/// assert_eq!(coerce_rating(&json!(4.0)), Some(4));
/// assert_eq!(coerce_rating(&json!(" 3 ")), Some(3));
/// assert_eq!(coerce_rating(&json!("high")), None);
/// ```
pub fn coerce_rating(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Tag list from a JSON array, stringifying numbers and booleans.
///
/// `null` (as a whole or as an element) means no tags; a bare string is a
/// single tag. Nested arrays or objects are `None`. The result is not yet
/// normalized.
pub fn coerce_tags(value: Value) -> Option<Vec<String>> {
    match value {
        Value::Null => Some(Vec::new()),
        Value::String(s) => Some(vec![s]),
        Value::Array(items) => {
            let mut tags = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Null => {}
                    Value::String(s) => tags.push(s),
                    Value::Number(n) => tags.push(n.to_string()),
                    Value::Bool(b) => tags.push(b.to_string()),
                    Value::Array(_) | Value::Object(_) => return None,
                }
            }
            Some(tags)
        }
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => None,
    }
}

fn lenient_rating<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(0);
    }
    coerce_rating(&value).ok_or_else(|| de::Error::custom(format!("invalid rating {value}")))
}

fn lenient_tags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let shown = value.to_string();
    coerce_tags(value).ok_or_else(|| de::Error::custom(format!("invalid tags {shown}")))
}

/// JSON-file backed metadata store.
pub struct MetadataStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole store.
    ///
    /// Missing or unreadable files give an empty map; corrupt JSON is moved
    /// aside first (see the module docs).
    pub fn load(&self) -> MetadataMap {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return MetadataMap::new(),
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "cannot read metadata store");
                return MetadataMap::new();
            }
        };
        let entries = match serde_json::from_str(&content) {
            Ok(Value::Object(entries)) => entries,
            Ok(_) => return self.discard_corrupt(&"top level is not a JSON object"),
            Err(e) => return self.discard_corrupt(&e),
        };

        entries
            .into_iter()
            .filter_map(|(path, raw)| match serde_json::from_value(raw) {
                Ok(entry) => Some((path, entry)),
                Err(e) => {
                    warn!(path = %path, error = %e, "skipping unreadable metadata entry");
                    None
                }
            })
            .collect()
    }

    /// Move a store that can't be read as a map aside and start empty.
    fn discard_corrupt(&self, reason: &dyn std::fmt::Display) -> MetadataMap {
        let backup = self.quarantine();
        warn!(
            path = %self.path.display(),
            backup = ?backup,
            error = %reason,
            "metadata store is corrupt, starting from an empty store"
        );
        MetadataMap::new()
    }

    /// Rename a corrupt store aside. Returns the backup path on success.
    fn quarantine(&self) -> Option<PathBuf> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let mut name = self.path.file_name()?.to_os_string();
        name.push(format!(".corrupt-{stamp}"));
        let backup = self.path.with_file_name(name);
        match std::fs::rename(&self.path, &backup) {
            Ok(()) => Some(backup),
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "cannot move corrupt metadata store aside");
                None
            }
        }
    }

    /// Write the whole store: pretty JSON, non-ASCII kept verbatim, replaced
    /// atomically.
    pub fn save(&self, map: &MetadataMap) -> Result<(), MetadataError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".metadata-")
            .suffix(".json.tmp")
            .tempfile_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, map)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Current entry for `path`, or the empty default.
    pub fn get(&self, path: &str) -> MetadataEntry {
        self.load().remove(path).unwrap_or_default()
    }

    /// Merge `rating` and/or `tags` into the entry for `path`.
    ///
    /// `None` leaves a field untouched. Tags are normalized with
    /// [`normalize_tags`]. The entry is deleted if it ends up empty.
    /// Returns the resulting entry (empty if pruned).
    pub fn update(
        &self,
        path: &str,
        rating: Option<i64>,
        tags: Option<Vec<String>>,
    ) -> Result<MetadataEntry, MetadataError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.load();

        let mut entry = map.remove(path).unwrap_or_default();
        if let Some(rating) = rating {
            entry.rating = rating;
        }
        if let Some(tags) = tags {
            entry.tags = normalize_tags(tags);
        }

        if entry.is_empty() {
            debug!(path, "metadata entry pruned");
        } else {
            map.insert(path.to_string(), entry.clone());
        }
        self.save(&map)?;
        Ok(entry)
    }

    /// Delete the entry for `path`. Returns whether one existed.
    pub fn remove_entry(&self, path: &str) -> Result<bool, MetadataError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.load();
        if map.remove(path).is_none() {
            return Ok(false);
        }
        self.save(&map)?;
        Ok(true)
    }
}
