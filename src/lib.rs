//! # imageloader
//!
//! Backend for an image-browsing loader node: lists directories of images,
//! serves cached thumbnails, and keeps a small per-image rating and tag store.
//!
//! # Architecture
//!
//! Four filesystem-backed components sit behind a thin HTTP layer:
//!
//! ```text
//!                    ┌── scan      directory → [Folder | Image]   (+ metadata overlay)
//! GET/POST/DELETE ───┼── cache     source    → <cache_dir>/<key>.jpg
//!  /imageloader/*    └── metadata  path      → {rating, tags}     (metadata.json)
//! ```
//!
//! The core is synchronous. The [`server`] runs it on tokio's blocking pool,
//! and the CLI calls it directly.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `imageloader.toml` loading, merging over defaults, validation |
//! | [`cache`] | Content-keyed thumbnail cache with mtime freshness and atomic writes |
//! | [`imaging`] | Pure-Rust decode, orientation, flatten, resize and JPEG encode |
//! | [`metadata`] | JSON rating/tag store with serialized read-modify-write |
//! | [`scan`] | Directory listing, display ordering, selector options |
//! | [`server`] | axum routes under `/imageloader` |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Keys Change With the File
//!
//! A thumbnail's name is a digest of the source path and its modification
//! time ([`cache::derive_key`]). Editing a file gives it a new key, so stale
//! previews are simply never looked up again. The freshness check on top
//! (artifact strictly newer than source) catches the rare case of a file being
//! rewritten within the mtime's resolution.
//!
//! ## One Writer for Metadata
//!
//! The store is a single JSON object rewritten whole on every change. Within
//! a process, [`metadata::MetadataStore`] holds a mutex across each
//! load-modify-save so concurrent requests can't drop each other's updates.
//! Saves go through a temp file and rename, so a crash never leaves half a
//! file behind. A file that fails to parse is moved aside rather than
//! overwritten.
//!
//! ## Failure Degrades to the Original
//!
//! A preview that can't be generated is not an error for the caller: the
//! thumbnail route serves the original file instead. Only missing files and
//! bad input are reported as errors.
//!
//! ## Explicit Configuration
//!
//! Every path and knob lives in [`config::LoaderConfig`], loaded once at
//! startup and handed to each component's constructor. Nothing reads the
//! environment or global state after that.

pub mod cache;
pub mod config;
pub mod imaging;
pub mod metadata;
pub mod output;
pub mod scan;
pub mod server;

#[cfg(test)]
pub(crate) mod test_helpers;
