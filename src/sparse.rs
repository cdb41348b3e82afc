// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Small assembly helpers over `sprs`.  Every matrix the engine builds is
//! assembled as triplets and finalised to CSR once.

use sprs::{CsMat, TriMat};

use crate::common::Result;
use crate::model_err;

pub fn eye(n: usize) -> CsMat<f64> {
    CsMat::eye(n)
}

pub fn zeros(rows: usize, cols: usize) -> CsMat<f64> {
    TriMat::new((rows, cols)).to_csr()
}

/// Assemble a CSR matrix from `(row, col, value)` triplets.
pub fn from_triplets(
    rows: usize,
    cols: usize,
    triplets: impl IntoIterator<Item = (usize, usize, f64)>,
) -> CsMat<f64> {
    let mut tri = TriMat::new((rows, cols));
    for (r, c, v) in triplets {
        tri.add_triplet(r, c, v);
    }
    tri.to_csr()
}

/// A `1 x n` row matrix with the given entries.
pub fn row_vector(entries: &[f64]) -> CsMat<f64> {
    from_triplets(
        1,
        entries.len(),
        entries.iter().enumerate().map(|(i, v)| (0, i, *v)),
    )
}

/// Stack square-ish blocks along the diagonal into one sparse matrix.
pub fn block_diag(blocks: &[CsMat<f64>]) -> CsMat<f64> {
    let rows: usize = blocks.iter().map(|b| b.rows()).sum();
    let cols: usize = blocks.iter().map(|b| b.cols()).sum();
    let mut tri = TriMat::new((rows, cols));
    let mut row_off = 0;
    let mut col_off = 0;
    for block in blocks {
        for (v, (r, c)) in block.iter() {
            tri.add_triplet(row_off + r, col_off + c, *v);
        }
        row_off += block.rows();
        col_off += block.cols();
    }
    tri.to_csr()
}

/// `m @ v` for a CSR matrix and a dense vector.
pub fn mul_vec(m: &CsMat<f64>, v: &[f64]) -> Result<Vec<f64>> {
    if m.cols() != v.len() {
        return model_err!(
            ShapeMismatch,
            format!(
                "cannot multiply a {}x{} matrix by a vector of length {}",
                m.rows(),
                m.cols(),
                v.len()
            )
        );
    }
    let mut out = vec![0.0; m.rows()];
    for (row_idx, row) in m.outer_iterator().enumerate() {
        let mut acc = 0.0;
        for (col_idx, value) in row.iter() {
            acc += value * v[col_idx];
        }
        out[row_idx] = acc;
    }
    Ok(out)
}
