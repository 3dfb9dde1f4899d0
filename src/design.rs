//! Design-space types: the binary design matrix and per-candidate records.

use serde::{Deserialize, Serialize};

/// 2-D binary design grid, stored flat in row-major order.
///
/// Every cell is 0 (no material) or 1 (material). The optimizer owns the
/// *half* matrix; the evaluated structure is the half matrix stacked with its
/// vertical mirror (see [`DesignMatrix::mirrored`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<u8>,
}

impl DesignMatrix {
    /// Create an all-zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![0; rows * cols],
        }
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Convert (row, col) to flat index.
    #[inline]
    fn idx(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Get cell value at (row, col).
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.cells[self.idx(row, col)]
    }

    /// Set cell value at (row, col). Value must be 0 or 1.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: u8) {
        debug_assert!(value <= 1, "design cells are binary");
        let i = self.idx(row, col);
        self.cells[i] = value;
    }

    /// Toggle the cell at (row, col).
    pub fn toggle(&mut self, row: usize, col: usize) {
        let i = self.idx(row, col);
        self.cells[i] ^= 1;
    }

    /// Clone with the cell at (row, col) toggled.
    pub fn with_toggled(&self, row: usize, col: usize) -> Self {
        let mut out = self.clone();
        out.toggle(row, col);
        out
    }

    /// Coordinates of all cells holding `value`, in row-major order.
    pub fn cells_with(&self, value: u8) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(move |(_, v)| **v == value)
            .map(|(i, _)| (i / self.cols, i % self.cols))
    }

    /// Number of material cells.
    pub fn count_ones(&self) -> usize {
        self.cells.iter().filter(|&&v| v == 1).count()
    }

    /// The full evaluated structure: this matrix stacked with its vertical
    /// flip, doubling the row count. Row order is `r0..rn, rn..r0`.
    pub fn mirrored(&self) -> Self {
        let mut cells = Vec::with_capacity(2 * self.cells.len());
        cells.extend_from_slice(&self.cells);
        for row in (0..self.rows).rev() {
            let start = row * self.cols;
            cells.extend_from_slice(&self.cells[start..start + self.cols]);
        }
        Self {
            rows: 2 * self.rows,
            cols: self.cols,
            cells,
        }
    }

    /// The upper half of a mirrored matrix. Inverse of [`mirrored`] for
    /// matrices with an even row count.
    ///
    /// [`mirrored`]: DesignMatrix::mirrored
    pub fn upper_half(&self) -> Self {
        let rows = self.rows / 2;
        Self {
            rows,
            cols: self.cols,
            cells: self.cells[..rows * self.cols].to_vec(),
        }
    }
}

/// One proposed single-cell flip, carrying the full mirrored matrix that
/// results from applying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Row of the flipped cell in the half matrix.
    pub row: usize,
    /// Column of the flipped cell.
    pub col: usize,
    /// Mirrored design with the flip applied, ready for the evaluator.
    pub matrix: DesignMatrix,
}

/// Worker-side outcome for one candidate.
///
/// `fitness` is `Some(score)` on success; `None` is the failure sentinel and
/// ranks below every real score during winner selection.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub row: usize,
    pub col: usize,
    pub fitness: Option<f64>,
}
