// Properties that must hold for every grid shape, frame and threshold, not
// just the hand-picked cases in each module's tests.

use crate::config::{GridConfig, Tuning};
use crate::core_modules::activation_grid::ActivationGrid;
use crate::core_modules::binarizer::binarize;
use crate::core_modules::change_gate::{ChangeGate, GateDecision, RateLimit};
use crate::core_modules::encoder::Encoding;
use crate::core_modules::frame::frame::Frame;
use crate::core_modules::geometry::{GridLayout, cell_index};
use crate::core_modules::sampler::{is_active, sample_grid};
use proptest::prelude::*;
use std::collections::HashSet;
use std::time::{Duration, Instant};

fn grid_shape() -> impl Strategy<Value = (usize, usize)> {
    (1usize..=12, 1usize..=24)
}

fn random_grid() -> impl Strategy<Value = ActivationGrid> {
    grid_shape().prop_flat_map(|(rows, cols)| {
        prop::collection::vec(any::<bool>(), rows * cols).prop_map(move |cells| {
            ActivationGrid::from_activations(rows, cols, cells).expect("length matches shape")
        })
    })
}

fn gray_frame() -> impl Strategy<Value = (u32, u32, Vec<u8>)> {
    (1u32..=96, 1u32..=72).prop_flat_map(|(width, height)| {
        prop::collection::vec(any::<u8>(), (width * height) as usize)
            .prop_map(move |pixels| (width, height, pixels))
    })
}

proptest! {
    #[test]
    fn index_is_a_bijection((rows, cols) in grid_shape()) {
        let mut seen = HashSet::new();
        for row in 0..rows {
            for col in 0..cols {
                let index = cell_index(row, col, cols);
                prop_assert!(index < rows * cols);
                prop_assert!(seen.insert(index));
                let mirrored = cell_index(row, cols - 1 - col, cols);
                if cols > 1 && col != cols - 1 - col {
                    prop_assert_ne!(mirrored, index);
                }
            }
        }
        prop_assert_eq!(seen.len(), rows * cols);
    }

    #[test]
    fn grid_length_matches_shape(
        (rows, cols) in grid_shape(),
        (width, height, pixels) in gray_frame(),
        threshold in 0.0f32..=1.0,
    ) {
        let frame = Frame::gray(&pixels, width, height).unwrap();
        let binary = binarize(&frame, threshold);
        let config = GridConfig { rows, cols, cell_aspect_ratio: 1.0, margin: 0, gap: 0 };
        let layout = GridLayout::compute(width, height, &config);
        prop_assume!(layout.is_ok());
        let grid = sample_grid(&binary, &layout.unwrap(), &Tuning::default());
        prop_assert_eq!(grid.len(), rows * cols);
    }

    #[test]
    fn same_frame_same_grid(
        (width, height, pixels) in gray_frame(),
        threshold in 0.0f32..=1.0,
        invert in any::<bool>(),
        step in 1u32..=4,
    ) {
        let frame = Frame::gray(&pixels, width, height).unwrap();
        let config = GridConfig { rows: 3, cols: 4, cell_aspect_ratio: 1.0, margin: 0, gap: 0 };
        let layout = GridLayout::compute(width, height, &config);
        prop_assume!(layout.is_ok());
        let layout = layout.unwrap();
        let tuning = Tuning {
            binarize_threshold: threshold,
            invert_detection: invert,
            sample_step: step,
            ..Tuning::default()
        };

        let first = sample_grid(&binarize(&frame, threshold), &layout, &tuning);
        let second = sample_grid(&binarize(&frame, threshold), &layout, &tuning);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn invert_flips_every_non_tie(mean in 0.0f64..=255.0, threshold in any::<u8>()) {
        prop_assume!(mean != f64::from(threshold));
        prop_assert_eq!(is_active(mean, threshold, false), !is_active(mean, threshold, true));
    }

    #[test]
    fn binarized_pixels_are_black_or_white(
        (width, height, pixels) in gray_frame(),
        threshold in 0.0f32..=1.0,
    ) {
        let binary = binarize(&Frame::gray(&pixels, width, height).unwrap(), threshold);
        for y in 0..height {
            for x in 0..width {
                let value = binary.intensity_at(x, y).unwrap();
                prop_assert!(value == 0 || value == 255);
            }
        }
    }

    #[test]
    fn dense_payload_decodes_to_the_same_grid(grid in random_grid()) {
        let payload = Encoding::Dense.encode(&grid);
        prop_assert_eq!(payload.len(), grid.len() + 1);
        prop_assert_eq!(payload[0], 0xFF);
        let decoded = Encoding::Dense.decode(&payload, grid.rows(), grid.cols()).unwrap();
        prop_assert_eq!(decoded, grid);
    }

    #[test]
    fn sparse_payload_lists_active_cells(grid in random_grid()) {
        let payload = Encoding::SparseIndexList.encode(&grid);
        prop_assert_eq!(payload.last(), Some(&b'\n'));
        let decoded = Encoding::SparseIndexList.decode(&payload, grid.rows(), grid.cols()).unwrap();
        prop_assert_eq!(decoded, grid);
    }

    #[test]
    fn unchanged_grid_is_never_resent(
        grid in random_grid(),
        gaps in prop::collection::vec(0u64..2_000, 1..40),
        use_frames in any::<bool>(),
    ) {
        let rate_limit = if use_frames {
            RateLimit::EveryNFrames { n: 2 }
        } else {
            RateLimit::Interval { ms: 250 }
        };
        let mut gate = ChangeGate::new(rate_limit);
        let mut now = Instant::now();
        prop_assert_eq!(gate.evaluate(&grid, now), GateDecision::Send);
        gate.record_sent(&grid);

        for gap in gaps {
            now += Duration::from_millis(gap);
            prop_assert_ne!(gate.evaluate(&grid.clone(), now), GateDecision::Send);
        }
    }
}
