//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the size of an image scaled down to fit a square bounding box.
///
/// The aspect ratio is preserved and images already inside the box are left
/// alone (never upscaled). The scaled side is rounded and never drops below 1.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `max_dimension` - Side of the bounding box
///
/// # Returns
/// * `(width, height)` - Output dimensions, both `<= max_dimension`
///
/// # Examples
/// ```
/// # use imageloader::imaging::fit_within;
/// // Landscape: width hits the bound
/// assert_eq!(fit_within((1600, 1200), 400), (400, 300));
///
/// // Already small enough
/// assert_eq!(fit_within((320, 200), 400), (320, 200));
/// ```
pub fn fit_within(source: (u32, u32), max_dimension: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    let max_dimension = max_dimension.max(1);

    if src_w <= max_dimension && src_h <= max_dimension {
        return (src_w, src_h);
    }

    if src_w >= src_h {
        let h = (src_h as f64 * max_dimension as f64 / src_w as f64).round() as u32;
        (max_dimension, h.clamp(1, max_dimension))
    } else {
        let w = (src_w as f64 * max_dimension as f64 / src_h as f64).round() as u32;
        (w.clamp(1, max_dimension), max_dimension)
    }
}
