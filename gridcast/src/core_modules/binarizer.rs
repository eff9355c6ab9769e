// THEORY:
// First of the two thresholding stages. The whole frame is pushed to pure black
// or pure white against one global level, before any cell is looked at. This
// normalizes illumination once for the entire image so the per-cell stage only
// has to count white pixels.
//
// A pixel is white when its intensity is at or above `threshold * 255`. The
// threshold is clamped into [0, 1]; 0 turns everything white, 1 keeps only
// fully saturated pixels.

use crate::core_modules::frame::frame::{BinaryFrame, Frame};
use image::{GrayImage, Luma};

pub const WHITE: u8 = 255;
pub const BLACK: u8 = 0;

/// Thresholds `frame` into a same-size black and white frame.
///
/// An empty frame yields an empty result.
pub fn binarize(frame: &Frame<'_>, threshold: f32) -> BinaryFrame {
    if frame.is_empty() {
        return BinaryFrame::empty();
    }

    let level = threshold_level(threshold);
    let image = GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let white = frame
            .intensity_at(x, y)
            .is_some_and(|intensity| f32::from(intensity) >= level);
        Luma([if white { WHITE } else { BLACK }])
    });

    BinaryFrame::from_image(image)
}

/// The intensity at which a pixel starts counting as white.
pub fn threshold_level(threshold: f32) -> f32 {
    let threshold = if threshold.is_nan() { 0.0 } else { threshold };
    threshold.clamp(0.0, 1.0) * 255.0
}
