//! Min-max scaling onto a fixed target range
//!
//! The scaler is fitted on one dataset (its observed minimum and maximum) and
//! then maps any value linearly so that the observed minimum lands on the
//! lower bound of the target range and the observed maximum on the upper bound.
//!
//! Fitted bounds are plain data: to apply the same transform to another
//! dataset, keep the fitted [`MinMaxScaler`] and reuse it instead of refitting.
//!
//! # Example
//!
//! ```
//! use cltv_stats::scaling::MinMaxScaler;
//!
//! let scaler = MinMaxScaler::fit(&[10.0, 20.0, 30.0], (0.0, 5.0)).unwrap();
//! assert_eq!(scaler.transform(10.0), 0.0);
//! assert_eq!(scaler.transform(20.0), 2.5);
//! assert_eq!(scaler.transform(30.0), 5.0);
//! ```

/// Linear transform fitted on the observed range of a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxScaler {
    /// Observed minimum of the fitted data
    pub data_min: f64,
    /// Observed maximum of the fitted data
    pub data_max: f64,
    /// Lower bound of the target range
    pub feature_min: f64,
    /// Upper bound of the target range
    pub feature_max: f64,
}

impl MinMaxScaler {
    /// Fits the scaler on `values`, targeting `range = (lower, upper)`.
    ///
    /// Returns `None` if `values` is empty or contains a non-finite value.
    /// A dataset whose values are all equal is treated as having a unit data
    /// range, so every value maps to the lower bound.
    #[must_use]
    pub fn fit(values: &[f64], range: (f64, f64)) -> Option<Self> {
        let (min, max) = finite_bounds(values)?;
        Some(Self {
            data_min: min,
            data_max: max,
            feature_min: range.0,
            feature_max: range.1,
        })
    }

    fn data_range(&self) -> f64 {
        let range = self.data_max - self.data_min;
        if range == 0.0 { 1.0 } else { range }
    }

    /// Maps a value from the data range onto the target range.
    ///
    /// Values outside the fitted data range are extrapolated, not clipped.
    #[must_use]
    pub fn transform(&self, value: f64) -> f64 {
        let unit = (value - self.data_min) / self.data_range();
        self.feature_min + unit * (self.feature_max - self.feature_min)
    }

    /// Applies [`Self::transform`] to every value.
    #[must_use]
    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform(v)).collect()
    }
}

fn finite_bounds(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().try_fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &v| {
        v.is_finite().then(|| (min.min(v), max.max(v)))
    })
    .filter(|(min, max)| min <= max)
}
