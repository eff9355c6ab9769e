// THEORY:
// The `ActivationGrid` is the per-frame answer of the vision side: one byte per
// cell, `8` for on and `0` for off. Those byte values are what the display
// firmware consumes directly (bit 3 drives the segment), so the grid stores
// wire bytes rather than booleans and the dense encoder is a plain copy.
//
// The grid is addressed by `cell_index(row, col)`, which mirrors columns. It is
// always exactly `rows * cols` long and is rebuilt from scratch every frame.

use crate::core_modules::geometry::cell_index;

pub const ACTIVE: u8 = 8;
pub const INACTIVE: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivationGrid {
    rows: usize,
    cols: usize,
    cells: Vec<u8>,
}

impl ActivationGrid {
    /// An all-inactive grid.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![INACTIVE; rows * cols],
        }
    }

    /// Builds a grid from activations listed in index order.
    ///
    /// Returns `None` when the number of activations is not `rows * cols`.
    pub fn from_activations(
        rows: usize,
        cols: usize,
        activations: impl IntoIterator<Item = bool>,
    ) -> Option<Self> {
        let cells: Vec<u8> = activations
            .into_iter()
            .map(|on| if on { ACTIVE } else { INACTIVE })
            .collect();
        (cells.len() == rows * cols).then_some(Self { rows, cols, cells })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Wire index of `(row, col)`. `col` must be below `cols()`.
    pub fn index(&self, row: usize, col: usize) -> usize {
        cell_index(row, col, self.cols)
    }

    /// Sets the cell at grid position `(row, col)`. Positions outside the
    /// grid are ignored.
    pub fn set(&mut self, row: usize, col: usize, active: bool) {
        if row >= self.rows || col >= self.cols {
            return;
        }
        let index = self.index(row, col);
        self.set_index(index, active);
    }

    /// Sets the cell at wire index `index`. Out-of-range indices are ignored.
    pub fn set_index(&mut self, index: usize, active: bool) {
        if let Some(cell) = self.cells.get_mut(index) {
            *cell = if active { ACTIVE } else { INACTIVE };
        }
    }

    pub fn is_active(&self, row: usize, col: usize) -> bool {
        if row >= self.rows || col >= self.cols {
            return false;
        }
        self.is_index_active(self.index(row, col))
    }

    pub fn is_index_active(&self, index: usize) -> bool {
        self.cells.get(index).is_some_and(|&cell| cell == ACTIVE)
    }

    /// Wire bytes in index order.
    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    /// Indices of active cells, ascending.
    pub fn active_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| **cell == ACTIVE)
            .map(|(index, _)| index)
    }

    pub fn active_count(&self) -> usize {
        self.cells.iter().filter(|cell| **cell == ACTIVE).count()
    }

    /// ASCII rendering in physical (un-mirrored) layout, one line per row.
    pub fn render_ascii(&self, on: char, off: char) -> String {
        let mut out = String::with_capacity(self.rows * (self.cols + 1));
        for row in 0..self.rows {
            for slot in 0..self.cols {
                let index = row * self.cols + slot;
                out.push(if self.is_index_active(index) { on } else { off });
            }
            out.push('\n');
        }
        out
    }
}
