//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the seam between the thumbnail cache and the
//! pixel work. The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend); tests use the recording
//! `MockBackend` to observe whether a source was decoded.

use super::params::ThumbnailParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// `Send + Sync` so one backend can be shared by the HTTP handlers and the
/// rayon pool used to warm the cache.
pub trait ImageBackend: Send + Sync {
    /// Decode `params.source`, normalize it to an opaque RGB preview that
    /// fits inside `params.max_dimension`, and encode it to `params.output`.
    ///
    /// Returns the dimensions of the written preview.
    fn thumbnail(&self, params: &ThumbnailParams) -> Result<Dimensions, BackendError>;
}
