// THEORY:
// Second thresholding stage. Each cell looks at its own rectangle of the
// binarized frame, averages a strided subset of pixels, and compares that mean
// against the activation threshold.
//
// Because the binarized pixels are only ever 0 or 255, the mean is the share of
// white samples scaled to 0..255, and a threshold near 128 is a majority vote.
// Sampling every `sample_step`-th pixel on both axes keeps the cost per cell low
// without changing the vote on real camera input.
//
// Rules the rest of the engine relies on:
// - Rectangles are clamped to the frame. A rectangle that clamps to nothing has
//   no mean, and a cell without a mean is inactive, never active by default.
// - Comparisons are strict. A mean equal to the threshold is inactive in both
//   directions.
// - The grid is assembled fresh on every call.

use crate::config::Tuning;
use crate::core_modules::activation_grid::ActivationGrid;
use crate::core_modules::frame::frame::BinaryFrame;
use crate::core_modules::geometry::{CellRect, GridLayout};

/// Mean intensity of `frame` sampled every `step` pixels inside `rect`.
///
/// `None` when the rectangle lies fully outside the frame or the frame is empty.
pub fn region_mean(frame: &BinaryFrame, rect: &CellRect, step: u32) -> Option<f64> {
    let width = i64::from(frame.width());
    let height = i64::from(frame.height());
    if width == 0 || height == 0 {
        return None;
    }

    let x_start = (rect.x.floor() as i64).clamp(0, width);
    let y_start = (rect.y.floor() as i64).clamp(0, height);
    let x_end = ((rect.x + rect.width).floor() as i64).clamp(0, width);
    let y_end = ((rect.y + rect.height).floor() as i64).clamp(0, height);

    if x_end <= x_start || y_end <= y_start {
        return None;
    }

    let step = step.max(1) as usize;
    let mut sum = 0u64;
    let mut count = 0u64;
    for y in (y_start..y_end).step_by(step) {
        for x in (x_start..x_end).step_by(step) {
            if let Some(value) = frame.intensity_at(x as u32, y as u32) {
                sum += u64::from(value);
                count += 1;
            }
        }
    }

    (count > 0).then(|| sum as f64 / count as f64)
}

/// The activation rule. Strict in both directions.
#[inline]
pub fn is_active(mean: f64, threshold: u8, invert: bool) -> bool {
    let threshold = f64::from(threshold);
    if invert {
        mean > threshold
    } else {
        mean < threshold
    }
}

/// Samples every cell of `layout` and assembles a fresh grid.
pub fn sample_grid(frame: &BinaryFrame, layout: &GridLayout, tuning: &Tuning) -> ActivationGrid {
    let mut grid = ActivationGrid::new(layout.rows(), layout.cols());
    if frame.is_empty() {
        return grid;
    }

    for (row, col, rect) in layout.cells() {
        let active = region_mean(frame, &rect, tuning.sample_step).is_some_and(|mean| {
            is_active(mean, tuning.activation_threshold, tuning.invert_detection)
        });
        grid.set(row, col, active);
    }

    grid
}
