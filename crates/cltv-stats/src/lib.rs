//! Numeric building blocks for the CLTV pipeline.
//!
//! This crate collects the small, dependency-light statistical tools the other
//! crates share:
//!
//! - **Descriptive statistics**: count, sum, mean
//! - **Quantiles**: linear-interpolation quantiles of sorted data
//! - **Scaling**: min-max scaling onto a target range
//! - **Binning**: quantile cuts that split a dataset into equally populated bins
//! - **Special functions**: `ln Γ`, the Gauss hypergeometric function and log-sum-exp
//!
//! # Modules
//!
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//! - [`percentiles`]: Quantile computation
//! - [`scaling`]: Min-max scaler with fitted bounds
//! - [`binning`]: Quantile-based binning
//! - [`special`]: Special functions used by likelihoods
//!
//! # Examples
//!
//! ## Computing descriptive statistics
//!
//! ```
//! use cltv_stats::descriptive::DescriptiveStats;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let stats = DescriptiveStats::new(values).unwrap();
//! assert_eq!(stats.mean, 3.0);
//! assert_eq!(stats.sum, 15.0);
//! ```
//!
//! ## Computing quantiles
//!
//! ```
//! use cltv_stats::percentiles::compute_quantile;
//!
//! let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
//! assert_eq!(compute_quantile(&sorted, 0.5), 3.0);
//! assert_eq!(compute_quantile(&sorted, 0.25), 2.0);
//! ```
//!
//! ## Cutting into quartiles
//!
//! ```
//! use cltv_stats::binning::QuantileBins;
//!
//! let values: Vec<f64> = (0..8).map(f64::from).collect();
//! let bins = QuantileBins::fit(&values, 4).unwrap();
//! let indices: Vec<_> = values.iter().filter_map(|&v| bins.bin_of(v)).collect();
//! assert_eq!(indices, vec![0, 0, 1, 1, 2, 2, 3, 3]);
//! ```

pub mod binning;
pub mod descriptive;
pub mod percentiles;
pub mod scaling;
pub mod special;
