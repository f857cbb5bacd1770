//! Image processing in pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (JPEG, PNG, TIFF, WebP, GIF, BMP) |
//! | **Orientation** | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | **Alpha flatten** | composite over opaque white |
//! | **Downscale** | `imageops::resize` with `Lanczos3` |
//! | **Encode** | `JpegEncoder` at a fixed quality |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing a thumbnail operation
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::fit_within;
pub use params::{Quality, ThumbnailParams};
pub use rust_backend::RustBackend;
