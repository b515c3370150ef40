//! Scaling CLTV onto a fixed range and cutting it into quantile segments
//!
//! The scaler is fitted on the same cohort it transforms. To score a holdout
//! consistently, reuse [`Segmentation::scaler`] and [`Segmentation::edges`]
//! instead of refitting.

use std::collections::BTreeMap;

use cltv_core::CltvError;
use cltv_stats::{
    binning::{QuantileBins, QuantileCutError},
    descriptive::DescriptiveStats,
    scaling::MinMaxScaler,
};
use serde::{Deserialize, Serialize};

use crate::prediction::CustomerPrediction;

/// Fitted scaler bounds, kept with the report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerBounds {
    pub data_min: f64,
    pub data_max: f64,
    pub feature_min: f64,
    pub feature_max: f64,
}

impl From<MinMaxScaler> for ScalerBounds {
    fn from(scaler: MinMaxScaler) -> Self {
        Self {
            data_min: scaler.data_min,
            data_max: scaler.data_max,
            feature_min: scaler.feature_min,
            feature_max: scaler.feature_max,
        }
    }
}

impl From<ScalerBounds> for MinMaxScaler {
    fn from(bounds: ScalerBounds) -> Self {
        Self {
            data_min: bounds.data_min,
            data_max: bounds.data_max,
            feature_min: bounds.feature_min,
            feature_max: bounds.feature_max,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segmenter {
    scale_range: (f64, f64),
    labels: Vec<String>,
}

/// Scaled values and segment assignment of one cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segmentation {
    pub scaler: ScalerBounds,
    /// Quantile edges of the scaled values, ascending.
    pub edges: Vec<f64>,
    pub scaled: Vec<f64>,
    /// Segment label of each value, parallel to `scaled`.
    pub segments: Vec<String>,
}

impl Segmenter {
    /// `labels` run from the lowest segment to the highest.
    #[must_use]
    pub fn new(scale_range: (f64, f64), labels: Vec<String>) -> Self {
        Self {
            scale_range,
            labels,
        }
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Scales `values` and assigns each one a segment label.
    ///
    /// ```
    /// use cltv_analysis::segmentation::Segmenter;
    ///
    /// let segmenter = Segmenter::new((0.0, 5.0), vec!["low".into(), "high".into()]);
    /// let seg = segmenter.segment(&[3.0, 1.0, 5.0, 2.0])?;
    /// assert_eq!(seg.scaled, [2.5, 0.0, 5.0, 1.25]);
    /// assert_eq!(seg.segments, ["high", "low", "high", "low"]);
    /// # Ok::<(), cltv_core::CltvError>(())
    /// ```
    pub fn segment(&self, values: &[f64]) -> Result<Segmentation, CltvError> {
        let scaler = MinMaxScaler::fit(values, self.scale_range).ok_or_else(|| {
            CltvError::domain("cannot scale an empty or non-finite CLTV column")
        })?;
        let scaled = scaler.transform_all(values);
        let bins = QuantileBins::fit(&scaled, self.labels.len()).map_err(|err| match err {
            QuantileCutError::DuplicateEdges { .. } => CltvError::domain(format!(
                "too many tied CLTV values to form {} segments: {err}",
                self.labels.len()
            )),
            err => CltvError::domain(err.to_string()),
        })?;

        let segments = scaled
            .iter()
            .map(|&v| {
                bins.bin_of(v)
                    .map(|bin| self.labels[bin].clone())
                    .ok_or_else(|| {
                        CltvError::domain(format!("scaled value {v} outside the fitted edges"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Segmentation {
            scaler: scaler.into(),
            edges: bins.edges().to_vec(),
            scaled,
            segments,
        })
    }
}

/// Mean, count and sum of one column within one segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnAggregate {
    pub mean: f64,
    pub count: usize,
    pub sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentAggregate {
    pub segment: String,
    /// Keyed by column name.
    pub columns: BTreeMap<String, ColumnAggregate>,
}

impl SegmentAggregate {
    #[must_use]
    pub fn count(&self) -> usize {
        self.columns.values().next().map_or(0, |c| c.count)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnAggregate> {
        self.columns.get(name)
    }
}

/// Aggregates every numeric column per segment, in `labels` order.
///
/// Segments without customers are left out.
#[must_use]
pub fn aggregate_segments(
    predictions: &[CustomerPrediction],
    labels: &[String],
) -> Vec<SegmentAggregate> {
    labels
        .iter()
        .filter_map(|label| {
            let members = predictions
                .iter()
                .filter(|p| &p.segment == label)
                .map(CustomerPrediction::numeric_values)
                .collect::<Vec<_>>();
            if members.is_empty() {
                return None;
            }
            let columns = CustomerPrediction::NUMERIC_COLUMNS
                .iter()
                .enumerate()
                .filter_map(|(i, name)| {
                    let stats = DescriptiveStats::new(members.iter().map(|values| values[i]))?;
                    Some((
                        (*name).to_owned(),
                        ColumnAggregate {
                            mean: stats.mean,
                            count: stats.count,
                            sum: stats.sum,
                        },
                    ))
                })
                .collect();
            Some(SegmentAggregate {
                segment: label.clone(),
                columns,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        ["D", "C", "B", "A"].map(String::from).to_vec()
    }

    fn prediction(id: u64, clv: f64, scaled_clv: f64, segment: &str) -> CustomerPrediction {
        CustomerPrediction {
            customer_id: id,
            recency: 2.0,
            t: 4.0,
            frequency: 2,
            monetary: 10.0,
            expected_purc_1_week: 0.1,
            expected_purc_1_month: 0.4,
            expected_average_profit: 11.0,
            clv,
            scaled_clv,
            segment: segment.to_owned(),
        }
    }

    #[test]
    fn test_four_hundred_distinct_values() {
        // deliberately unsorted and skewed
        let values = (0..400)
            .map(|i| f64::from((i * 7919) % 400).powf(1.5))
            .collect::<Vec<_>>();
        let segmenter = Segmenter::new((0.0, 5.0), labels());
        let seg = segmenter.segment(&values).unwrap();

        let min = seg.scaled.iter().copied().fold(f64::INFINITY, f64::min);
        let max = seg.scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(min, 0.0);
        assert_eq!(max, 5.0);

        let predictions = values
            .iter()
            .zip(&seg.scaled)
            .zip(&seg.segments)
            .enumerate()
            .map(|(i, ((&clv, &scaled), segment))| prediction(i as u64, clv, scaled, segment))
            .collect::<Vec<_>>();
        let aggregates = aggregate_segments(&predictions, segmenter.labels());
        assert_eq!(
            aggregates.iter().map(|a| a.segment.as_str()).collect::<Vec<_>>(),
            ["D", "C", "B", "A"]
        );
        for aggregate in &aggregates {
            assert_eq!(aggregate.count(), 100);
        }
        let means = aggregates
            .iter()
            .map(|a| a.column("scaled_clv").unwrap().mean)
            .collect::<Vec<_>>();
        assert!(means.windows(2).all(|w| w[0] < w[1]), "{means:?}");
    }

    #[test]
    fn test_highest_value_gets_top_label() {
        let segmenter = Segmenter::new((0.0, 5.0), labels());
        let seg = segmenter
            .segment(&[10.0, 50.0, 20.0, 40.0, 30.0, 60.0, 70.0, 80.0])
            .unwrap();
        assert_eq!(seg.segments[7], "A");
        assert_eq!(seg.segments[0], "D");
        assert_eq!(seg.segments[1], "B");
        assert_eq!(seg.segments[3], "C");
    }

    #[test]
    fn test_ties_fail_to_segment() {
        let segmenter = Segmenter::new((0.0, 5.0), labels());
        let err = segmenter.segment(&[1.0, 1.0, 1.0, 1.0, 2.0]).unwrap_err();
        assert!(err.is_domain());
    }

    #[test]
    fn test_empty_and_non_finite() {
        let segmenter = Segmenter::new((0.0, 5.0), labels());
        assert!(segmenter.segment(&[]).unwrap_err().is_domain());
        assert!(segmenter.segment(&[1.0, f64::NAN]).unwrap_err().is_domain());
    }

    #[test]
    fn test_aggregate_sums_and_means() {
        let predictions = vec![
            prediction(1, 10.0, 0.0, "D"),
            prediction(2, 30.0, 5.0, "A"),
            prediction(3, 20.0, 2.5, "A"),
        ];
        let aggregates = aggregate_segments(&predictions, &labels());
        assert_eq!(aggregates.len(), 2);
        let a = &aggregates[1];
        assert_eq!(a.segment, "A");
        let clv = a.column("clv").unwrap();
        assert_eq!(clv.count, 2);
        assert_eq!(clv.sum, 50.0);
        assert_eq!(clv.mean, 25.0);
        assert_eq!(a.column("frequency").unwrap().sum, 4.0);
        assert!(a.column("Customer ID").is_none());
    }

    #[test]
    fn test_frozen_scaler_round_trip() {
        let segmenter = Segmenter::new((0.0, 5.0), labels());
        let seg = segmenter.segment(&[2.0, 4.0, 6.0, 8.0, 10.0]).unwrap();
        let scaler = MinMaxScaler::from(seg.scaler);
        assert_eq!(scaler.transform(6.0), 2.5);
        assert_eq!(ScalerBounds::from(scaler), seg.scaler);
    }
}
