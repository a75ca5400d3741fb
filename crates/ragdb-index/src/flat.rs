//! Dense inner-product index: exact, exhaustive, no approximation.

use serde::{Deserialize, Serialize};

/// Row-major f32 matrix searched by exhaustive inner product.
///
/// Rows are appended in insertion order and never reordered, so row `i`
/// stays aligned with whatever external record was added at position `i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIpIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored rows.
    pub fn rows(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    /// Append rows. Callers must have validated that every row has the
    /// index dimension.
    pub fn push_rows(&mut self, rows: &[Vec<f32>]) {
        self.data.reserve(rows.len() * self.dimension);
        for row in rows {
            debug_assert_eq!(row.len(), self.dimension);
            self.data.extend_from_slice(row);
        }
    }

    /// Exhaustive top-`k` scan: inner product of `query` against every row,
    /// returned as `(row_index, score)` in descending score order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(i, row)| (i, dot(query, row)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Scale `v` to unit L2 norm in place. Zero vectors are left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
