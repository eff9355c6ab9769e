// THEORY:
// Two wire formats exist for the same grid and a deployment picks one at
// startup. Both go through `Encoding::encode`, so the pipeline never branches
// on the format itself.
//
// Dense:
// ```text
// ┌──────┬───────────────────────────────┐
// │ 0xFF │ rows*cols bytes, each 0 or 8  │
// └──────┴───────────────────────────────┘
// ```
// The device reads text lines ("READY") and binary frames on the same port.
// 0xFF never occurs inside the cell bytes, so a leading 0xFF unambiguously
// starts a binary frame. No terminator; the device knows the cell count.
//
// Sparse index list:
// ```text
// [3,17,42]\n
// ```
// Ascending active indices as an array literal, newline terminated. Cheaper
// than dense when few cells are on. The device tokenizes on `\n`.
//
// Decoding is the device's side of the contract. It is used to verify payloads
// and by the tester's dry-run echo.

use crate::core_modules::activation_grid::{ACTIVE, ActivationGrid, INACTIVE};
use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

/// Leading byte of every dense payload.
pub const DENSE_MARKER: u8 = 0xFF;
/// Terminator of every sparse payload.
pub const LINE_TERMINATOR: u8 = b'\n';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Dense,
    SparseIndexList,
}

impl Encoding {
    pub fn encode(&self, grid: &ActivationGrid) -> Vec<u8> {
        match self {
            Encoding::Dense => encode_dense(grid),
            Encoding::SparseIndexList => encode_sparse(grid),
        }
    }

    /// Rebuilds a `rows x cols` grid from a payload in this encoding.
    pub fn decode(
        &self,
        payload: &[u8],
        rows: usize,
        cols: usize,
    ) -> Result<ActivationGrid, DecodeError> {
        match self {
            Encoding::Dense => decode_dense(payload, rows, cols),
            Encoding::SparseIndexList => decode_sparse(payload, rows, cols),
        }
    }
}

fn encode_dense(grid: &ActivationGrid) -> Vec<u8> {
    let mut payload = Vec::with_capacity(grid.len() + 1);
    payload.push(DENSE_MARKER);
    payload.extend_from_slice(grid.as_bytes());
    payload
}

fn encode_sparse(grid: &ActivationGrid) -> Vec<u8> {
    let indices: Vec<String> = grid.active_indices().map(|index| index.to_string()).collect();
    let mut text = format!("[{}]", indices.join(","));
    text.push(LINE_TERMINATOR as char);
    text.into_bytes()
}

fn decode_dense(payload: &[u8], rows: usize, cols: usize) -> Result<ActivationGrid, DecodeError> {
    let Some((&DENSE_MARKER, cells)) = payload.split_first() else {
        return Err(DecodeError::MissingMarker);
    };
    let expected = rows * cols;
    if cells.len() != expected {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: cells.len(),
        });
    }

    let mut grid = ActivationGrid::new(rows, cols);
    for (index, &value) in cells.iter().enumerate() {
        match value {
            ACTIVE => grid.set_index(index, true),
            INACTIVE => {}
            _ => return Err(DecodeError::InvalidCellByte { index, value }),
        }
    }
    Ok(grid)
}

fn decode_sparse(payload: &[u8], rows: usize, cols: usize) -> Result<ActivationGrid, DecodeError> {
    let Some(body) = payload.strip_suffix(&[LINE_TERMINATOR]) else {
        return Err(DecodeError::MissingTerminator);
    };
    let indices: Vec<usize> = serde_json::from_slice(body)
        .map_err(|e| DecodeError::MalformedIndexList(e.to_string()))?;

    let cells = rows * cols;
    let mut grid = ActivationGrid::new(rows, cols);
    for index in indices {
        if index >= cells {
            return Err(DecodeError::IndexOutOfRange { index, cells });
        }
        grid.set_index(index, true);
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_two_top_left() -> ActivationGrid {
        let mut grid = ActivationGrid::new(2, 2);
        grid.set(0, 0, true);
        grid
    }

    #[test]
    fn dense_layout() {
        let payload = Encoding::Dense.encode(&two_by_two_top_left());
        assert_eq!(payload, vec![0xFF, 0, 8, 0, 0]);
    }

    #[test]
    fn dense_marker_never_appears_in_cells() {
        let mut grid = ActivationGrid::new(4, 6);
        for index in (0..24).step_by(3) {
            grid.set_index(index, true);
        }
        let payload = Encoding::Dense.encode(&grid);
        assert_eq!(payload.len(), 25);
        assert_eq!(payload.iter().filter(|b| **b == DENSE_MARKER).count(), 1);
        assert!(payload[1..].iter().all(|b| *b == ACTIVE || *b == INACTIVE));
    }

    #[test]
    fn sparse_layout() {
        let mut grid = ActivationGrid::new(2, 3);
        grid.set(0, 0, true);
        grid.set(1, 2, true);
        assert_eq!(Encoding::SparseIndexList.encode(&grid), b"[2,3]\n".to_vec());
    }

    #[test]
    fn sparse_empty_grid() {
        let grid = ActivationGrid::new(3, 3);
        assert_eq!(Encoding::SparseIndexList.encode(&grid), b"[]\n".to_vec());
    }

    #[test]
    fn sparse_multi_digit_indices() {
        let mut grid = ActivationGrid::new(10, 24);
        grid.set_index(7, true);
        grid.set_index(42, true);
        grid.set_index(239, true);
        assert_eq!(Encoding::SparseIndexList.encode(&grid), b"[7,42,239]\n".to_vec());
    }

    #[test]
    fn sparse_decodes_its_own_output() {
        let mut grid = ActivationGrid::new(3, 5);
        for (row, col) in [(0, 4), (1, 1), (2, 0), (2, 3)] {
            grid.set(row, col, true);
        }
        let payload = Encoding::SparseIndexList.encode(&grid);
        let decoded = Encoding::SparseIndexList.decode(&payload, 3, 5).unwrap();
        assert_eq!(decoded, grid);
    }

    #[test]
    fn sparse_accepts_whitespace() {
        let decoded = Encoding::SparseIndexList
            .decode(b"[ 0, 3 ]\n", 2, 2)
            .unwrap();
        assert_eq!(decoded.as_bytes(), &[8, 0, 0, 8]);
    }

    #[test]
    fn dense_decode_errors() {
        let dense = Encoding::Dense;
        assert_eq!(dense.decode(&[], 1, 1), Err(DecodeError::MissingMarker));
        assert_eq!(dense.decode(&[0x00, 8], 1, 1), Err(DecodeError::MissingMarker));
        assert_eq!(
            dense.decode(&[0xFF, 8, 0], 1, 1),
            Err(DecodeError::LengthMismatch {
                expected: 1,
                actual: 2
            })
        );
        assert_eq!(
            dense.decode(&[0xFF, 0, 1], 1, 2),
            Err(DecodeError::InvalidCellByte { index: 1, value: 1 })
        );
    }

    #[test]
    fn sparse_decode_errors() {
        let sparse = Encoding::SparseIndexList;
        assert_eq!(
            sparse.decode(b"[1,2]", 2, 2),
            Err(DecodeError::MissingTerminator)
        );
        assert!(matches!(
            sparse.decode(b"READY\n", 2, 2),
            Err(DecodeError::MalformedIndexList(_))
        ));
        assert_eq!(
            sparse.decode(b"[4]\n", 2, 2),
            Err(DecodeError::IndexOutOfRange { index: 4, cells: 4 })
        );
    }
}
