// THEORY:
// `GridLayout` turns a grid shape into pixel rectangles on a canvas. It is the
// spatial contract between the camera image and the physical display: cell
// `(row, col)` always samples the same rectangle for a given canvas size.
//
// The layout fits `cols` columns and `rows` rows into the canvas minus its
// margin, with `gap` pixels between neighbours, keeping every cell at the
// configured width:height ratio. Whichever axis is tighter decides the cell
// width, and the finished grid is centered on the canvas.
//
// Layouts are computed once per canvas size and cached by the pipeline. Nothing
// here runs per cell per frame.

use crate::config::GridConfig;
use crate::error::GeometryError;

/// One cell's rectangle in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Position of a cell in the activation grid. Columns are mirrored because the
/// frame is mirrored before it reaches us.
#[inline]
pub fn cell_index(row: usize, col: usize, cols: usize) -> usize {
    row * cols + (cols - 1 - col)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    canvas_width: u32,
    canvas_height: u32,
    rows: usize,
    cols: usize,
    cell_width: f32,
    cell_height: f32,
    offset_x: f32,
    offset_y: f32,
    /// Row-major, `rows * cols` entries.
    rects: Vec<CellRect>,
}

impl GridLayout {
    pub fn compute(
        canvas_width: u32,
        canvas_height: u32,
        grid: &GridConfig,
    ) -> Result<Self, GeometryError> {
        grid.validate()?;

        let rows = grid.rows;
        let cols = grid.cols;
        let aspect = grid.cell_aspect_ratio;
        let margin = grid.margin as f32;
        let gap = grid.gap as f32;

        let available_width = canvas_width as f32 - margin * 2.0;
        let available_height = canvas_height as f32 - margin * 2.0;

        let max_width_from_horizontal = (available_width - gap * (cols - 1) as f32) / cols as f32;
        let max_width_from_vertical =
            (available_height - gap * (rows - 1) as f32) / rows as f32 * aspect;

        let cell_width = max_width_from_horizontal.min(max_width_from_vertical);
        let cell_height = cell_width / aspect;

        if !(cell_width > 0.0 && cell_height > 0.0) {
            return Err(GeometryError::CanvasTooSmall {
                width: canvas_width,
                height: canvas_height,
                rows,
                cols,
            });
        }

        let grid_width = cols as f32 * cell_width + gap * (cols - 1) as f32;
        let grid_height = rows as f32 * cell_height + gap * (rows - 1) as f32;
        let offset_x = (canvas_width as f32 - grid_width) / 2.0;
        let offset_y = (canvas_height as f32 - grid_height) / 2.0;

        let mut rects = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                rects.push(CellRect {
                    x: offset_x + col as f32 * (cell_width + gap),
                    y: offset_y + row as f32 * (cell_height + gap),
                    width: cell_width,
                    height: cell_height,
                });
            }
        }

        Ok(Self {
            canvas_width,
            canvas_height,
            rows,
            cols,
            cell_width,
            cell_height,
            offset_x,
            offset_y,
            rects,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn cell_size(&self) -> (f32, f32) {
        (self.cell_width, self.cell_height)
    }

    pub fn offset(&self) -> (f32, f32) {
        (self.offset_x, self.offset_y)
    }

    /// True when this layout was computed for a canvas of the given size.
    pub fn fits_canvas(&self, width: u32, height: u32) -> bool {
        self.canvas_width == width && self.canvas_height == height
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<CellRect> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.rects.get(row * self.cols + col).copied()
    }

    /// All cells in row-major order as `(row, col, rect)`.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, CellRect)> + '_ {
        let cols = self.cols;
        self.rects
            .iter()
            .enumerate()
            .map(move |(i, rect)| (i / cols, i % cols, *rect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: usize, cols: usize, aspect: f32, margin: u32, gap: u32) -> GridConfig {
        GridConfig {
            rows,
            cols,
            cell_aspect_ratio: aspect,
            margin,
            gap,
        }
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn reference_layout_on_a_640x480_canvas() {
        let layout = GridLayout::compute(640, 480, &GridConfig::default()).unwrap();
        // Horizontal: (620 - 5*23) / 24 = 21.0417; vertical: (460 - 45) / 10 * 9/16 = 23.34.
        let (w, h) = layout.cell_size();
        assert!(approx(w, 505.0 / 24.0));
        assert!(approx(h, w * 16.0 / 9.0));

        let (ox, oy) = layout.offset();
        assert!(approx(ox, 10.0), "width-bound grid hugs the margin, got {ox}");
        let grid_height = 10.0 * h + 45.0;
        assert!(approx(oy, (480.0 - grid_height) / 2.0));
    }

    #[test]
    fn square_cells_without_margin_tile_the_canvas() {
        let layout = GridLayout::compute(4, 4, &grid(2, 2, 1.0, 0, 0)).unwrap();
        assert_eq!(
            layout.cell(1, 1),
            Some(CellRect {
                x: 2.0,
                y: 2.0,
                width: 2.0,
                height: 2.0
            })
        );
        assert_eq!(layout.cell(2, 0), None);
        assert_eq!(layout.cell(0, 2), None);
    }

    #[test]
    fn height_bound_grid_is_centered_horizontally() {
        // Vertical limit wins: a 1x1 square on a wide canvas.
        let layout = GridLayout::compute(100, 20, &grid(1, 1, 1.0, 0, 0)).unwrap();
        let rect = layout.cell(0, 0).unwrap();
        assert!(approx(rect.width, 20.0));
        assert!(approx(rect.x, 40.0));
        assert!(approx(rect.y, 0.0));
    }

    #[test]
    fn gaps_separate_neighbours() {
        let layout = GridLayout::compute(23, 10, &grid(1, 3, 1.0, 0, 1)).unwrap();
        let a = layout.cell(0, 0).unwrap();
        let b = layout.cell(0, 1).unwrap();
        assert!(approx(b.x - (a.x + a.width), 1.0));
    }

    #[test]
    fn cells_iterate_row_major() {
        let layout = GridLayout::compute(60, 40, &grid(2, 3, 1.0, 0, 0)).unwrap();
        let order: Vec<(usize, usize)> = layout.cells().map(|(r, c, _)| (r, c)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
    }

    #[test]
    fn degenerate_shapes_fail_fast() {
        assert_eq!(
            GridLayout::compute(640, 480, &grid(0, 4, 1.0, 0, 0)).unwrap_err(),
            GeometryError::EmptyGrid { rows: 0, cols: 4 }
        );
        assert!(matches!(
            GridLayout::compute(640, 480, &grid(2, 2, 0.0, 0, 0)),
            Err(GeometryError::InvalidAspectRatio(_))
        ));
        assert!(matches!(
            GridLayout::compute(640, 480, &grid(2, 2, f32::NAN, 0, 0)),
            Err(GeometryError::InvalidAspectRatio(_))
        ));
    }

    #[test]
    fn margin_larger_than_canvas_is_rejected() {
        let err = GridLayout::compute(15, 15, &grid(2, 2, 1.0, 10, 0)).unwrap_err();
        assert!(matches!(err, GeometryError::CanvasTooSmall { width: 15, .. }));
    }

    #[test]
    fn mirrored_index() {
        assert_eq!(cell_index(0, 0, 2), 1);
        assert_eq!(cell_index(0, 1, 2), 0);
        assert_eq!(cell_index(1, 0, 2), 3);
        assert_eq!(cell_index(3, 0, 1), 3);
    }

    #[test]
    fn fits_canvas_tracks_the_source_size() {
        let layout = GridLayout::compute(640, 480, &GridConfig::default()).unwrap();
        assert!(layout.fits_canvas(640, 480));
        assert!(!layout.fits_canvas(320, 240));
    }
}
