//! Pipeline hyperparameters.
//!
//! Every field has a default, so a JSON config only needs the keys it
//! changes:
//!
//! ```
//! use cltv_analysis::config::PipelineConfig;
//!
//! let config: PipelineConfig = serde_json::from_str(r#"{ "horizon_months": 12 }"#)?;
//! assert_eq!(config.horizon_months, 12);
//! assert_eq!(config.segment_labels, ["D", "C", "B", "A"]);
//! # Ok::<(), serde_json::Error>(())
//! ```

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use cltv_core::{CltvError, cleaner::WinsorizeParams};
use cltv_models::{
    lifetime_value::{ClvHorizon, TimeUnit},
    optimizer::NelderMead,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Reference "today" for `T`; one day past the last transaction when
    /// absent.
    pub anchor_date: Option<NaiveDate>,
    pub bg_penalizer: f64,
    pub gg_penalizer: f64,
    pub horizon_months: u32,
    /// Discount rate per month.
    pub discount_rate: f64,
    /// Unit the purchase model is fitted in.
    pub time_unit: TimeUnit,
    pub scale_range: (f64, f64),
    /// Segment labels from lowest to highest value; one segment per label.
    pub segment_labels: Vec<String>,
    pub min_cohort_size: usize,
    pub winsorize_lower_quantile: f64,
    pub winsorize_upper_quantile: f64,
    pub winsorize_iqr_multiplier: f64,
    pub optimizer: NelderMead,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let winsorize = WinsorizeParams::default();
        Self {
            anchor_date: None,
            bg_penalizer: 0.001,
            gg_penalizer: 0.01,
            horizon_months: 6,
            discount_rate: 0.01,
            time_unit: TimeUnit::Week,
            scale_range: (0.0, 5.0),
            segment_labels: ["D", "C", "B", "A"].map(String::from).to_vec(),
            min_cohort_size: 30,
            winsorize_lower_quantile: winsorize.lower_quantile,
            winsorize_upper_quantile: winsorize.upper_quantile,
            winsorize_iqr_multiplier: winsorize.iqr_multiplier,
            optimizer: NelderMead::default(),
        }
    }
}

impl PipelineConfig {
    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), CltvError> {
        for (name, value) in [
            ("bg_penalizer", self.bg_penalizer),
            ("gg_penalizer", self.gg_penalizer),
            ("winsorize_iqr_multiplier", self.winsorize_iqr_multiplier),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(CltvError::schema(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if !(self.discount_rate.is_finite() && self.discount_rate > -1.0) {
            return Err(CltvError::schema(format!(
                "discount_rate must be greater than -1, got {}",
                self.discount_rate
            )));
        }
        let (low, high) = self.scale_range;
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(CltvError::schema(format!(
                "scale_range must be an increasing pair of finite numbers, got [{low}, {high}]"
            )));
        }
        if self.segment_labels.len() < 2 {
            return Err(CltvError::schema(format!(
                "at least two segment labels are required, got {:?}",
                self.segment_labels
            )));
        }
        let (lo_q, hi_q) = (self.winsorize_lower_quantile, self.winsorize_upper_quantile);
        if !(0.0 <= lo_q && lo_q < hi_q && hi_q <= 1.0) {
            return Err(CltvError::schema(format!(
                "winsorize quantiles must satisfy 0 <= lower < upper <= 1, got {lo_q} and {hi_q}"
            )));
        }
        if self.optimizer.max_iterations == 0
            || !(self.optimizer.tolerance.is_finite() && self.optimizer.tolerance > 0.0)
        {
            return Err(CltvError::schema(format!(
                "optimizer needs a positive iteration limit and tolerance, got {:?}",
                self.optimizer
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn winsorize_params(&self) -> WinsorizeParams {
        WinsorizeParams {
            lower_quantile: self.winsorize_lower_quantile,
            upper_quantile: self.winsorize_upper_quantile,
            iqr_multiplier: self.winsorize_iqr_multiplier,
        }
    }

    #[must_use]
    pub fn horizon(&self) -> ClvHorizon {
        ClvHorizon {
            months: self.horizon_months,
            time_unit: self.time_unit,
            discount_rate: self.discount_rate,
        }
    }

    /// The configured anchor at midnight.
    #[must_use]
    pub fn anchor(&self) -> Option<NaiveDateTime> {
        self.anchor_date.map(|date| date.and_time(NaiveTime::MIN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.winsorize_params(), WinsorizeParams::default());
        assert_eq!(config.horizon(), ClvHorizon::default());
        assert_eq!(config.anchor(), None);
    }

    #[test]
    fn test_json_round_trip_keeps_every_field() {
        let config = PipelineConfig {
            anchor_date: NaiveDate::from_ymd_opt(2011, 12, 11),
            time_unit: TimeUnit::Day,
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"anchor_date\":\"2011-12-11\""));
        assert!(json.contains("\"scale_range\":[0.0,5.0]"));
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = serde_json::from_str::<PipelineConfig>(r#"{ "horizon": 6 }"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_invalid_settings() {
        let cases = [
            PipelineConfig {
                bg_penalizer: -0.1,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                gg_penalizer: f64::NAN,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                discount_rate: -1.0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                scale_range: (5.0, 5.0),
                ..PipelineConfig::default()
            },
            PipelineConfig {
                segment_labels: vec!["A".to_owned()],
                ..PipelineConfig::default()
            },
            PipelineConfig {
                winsorize_lower_quantile: 0.99,
                winsorize_upper_quantile: 0.01,
                ..PipelineConfig::default()
            },
        ];
        for config in cases {
            assert!(config.validate().unwrap_err().is_schema(), "{config:?}");
        }
    }

    #[test]
    fn test_anchor_is_midnight() {
        let config = PipelineConfig {
            anchor_date: NaiveDate::from_ymd_opt(2011, 12, 11),
            ..PipelineConfig::default()
        };
        let anchor = config.anchor().unwrap();
        assert_eq!(anchor.to_string(), "2011-12-11 00:00:00");
    }
}
