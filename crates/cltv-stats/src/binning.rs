//! Quantile-based binning
//!
//! A quantile cut splits a dataset into `k` bins whose edges are the
//! quantiles at `0, 1/k, 2/k, ..., 1` of the data, so each bin holds roughly
//! the same number of values.
//!
//! # Bin semantics
//!
//! - Edges are computed with [`compute_quantile`] (linear interpolation).
//! - Bins are right-closed: bin `i` holds values in `(edge[i], edge[i + 1]]`.
//! - The first bin also includes its lower edge, so the dataset minimum lands in bin 0.
//! - Equal values always land in the same bin.
//! - Duplicate edges are rejected: they appear when too many values tie and
//!   no cut can separate them into `k` non-empty bins.
//!
//! # Examples
//!
//! ```
//! use cltv_stats::binning::QuantileBins;
//!
//! let values: Vec<f64> = (1..=100).map(f64::from).collect();
//! let bins = QuantileBins::fit(&values, 4).unwrap();
//!
//! assert_eq!(bins.bin_of(1.0), Some(0));
//! assert_eq!(bins.bin_of(25.0), Some(0));
//! assert_eq!(bins.bin_of(26.0), Some(1));
//! assert_eq!(bins.bin_of(100.0), Some(3));
//! assert_eq!(bins.bin_of(101.0), None);
//! ```

use crate::percentiles::compute_quantile;

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum QuantileCutError {
    #[display("cannot cut an empty dataset")]
    EmptyDataset,
    #[display("number of bins must be at least 1")]
    NoBins,
    #[display("non-finite value at index {index}")]
    NonFiniteValue { index: usize },
    #[display("bin edges must be unique, got {edges:?}")]
    DuplicateEdges { edges: Vec<f64> },
}

/// Bin edges fitted by a quantile cut.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileBins {
    edges: Vec<f64>,
}

impl QuantileBins {
    /// Computes `num_bins + 1` quantile edges from `values`.
    #[expect(clippy::cast_precision_loss)]
    pub fn fit(values: &[f64], num_bins: usize) -> Result<Self, QuantileCutError> {
        if num_bins == 0 {
            return Err(QuantileCutError::NoBins);
        }
        if values.is_empty() {
            return Err(QuantileCutError::EmptyDataset);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(QuantileCutError::NonFiniteValue { index });
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let edges = (0..=num_bins)
            .map(|i| compute_quantile(&sorted, i as f64 / num_bins as f64))
            .collect::<Vec<_>>();
        if edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(QuantileCutError::DuplicateEdges { edges });
        }
        Ok(Self { edges })
    }

    /// Returns the bin edges, ascending.
    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Returns the bin index of `value`, or `None` if it lies outside the
    /// fitted edges.
    #[must_use]
    pub fn bin_of(&self, value: f64) -> Option<usize> {
        let first = *self.edges.first()?;
        let last = *self.edges.last()?;
        if !(first..=last).contains(&value) {
            return None;
        }
        // first edge index whose value is >= `value`, skipping the lower edge
        let upper = self.edges[1..].partition_point(|&edge| edge < value);
        Some(upper.min(self.num_bins() - 1))
    }
}
