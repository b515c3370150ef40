//! The end-to-end CLTV pipeline.
//!
//! ```text
//! raw rows ─► Cleaner ─► Summarizer ─► Cohort Filter ─┬─► BG/NBD ──────┐
//!                                                    └─► Gamma-Gamma ─┴─► CLTV
//! CLTV ─► Scaler ─► Segmenter ─► segment aggregates
//! ```
//!
//! Each stage consumes the previous stage's output and returns a new value;
//! running the pipeline twice on the same input yields identical reports.

use chrono::NaiveDateTime;
use cltv_core::{
    CltvError,
    cleaner::{Cleaner, CleaningReport},
    summary::{Cohort, CohortFilter, CustomerSummary, resolve_anchor, summarize},
    transaction::RawTransaction,
};
use cltv_models::{
    bg_nbd::{BgNbdFitter, BgNbdModel},
    gamma_gamma::{GammaGammaFitter, GammaGammaModel},
    lifetime_value::discounted_value,
};
use serde::{Deserialize, Serialize};

use crate::{
    config::PipelineConfig,
    prediction::CustomerPrediction,
    segmentation::{SegmentAggregate, Segmenter, ScalerBounds, aggregate_segments},
};

/// Horizons of the `expected_purc_*` columns, in weeks.
const ONE_WEEK: f64 = 1.0;
const ONE_MONTH: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModels {
    pub bg_nbd: BgNbdModel,
    pub gamma_gamma: GammaGammaModel,
}

/// Everything the pipeline derives from one cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortAnalysis {
    pub models: FittedModels,
    pub scaler: ScalerBounds,
    pub segment_edges: Vec<f64>,
    pub predictions: Vec<CustomerPrediction>,
    pub segments: Vec<SegmentAggregate>,
    /// Customers whose CLTV was clipped to zero.
    pub clipped_clv: usize,
}

impl CohortAnalysis {
    /// The `n` customers with the highest scaled CLTV, best first.
    #[must_use]
    pub fn top_customers(&self, n: usize) -> Vec<&CustomerPrediction> {
        let mut ranked = self.predictions.iter().collect::<Vec<_>>();
        ranked.sort_by(|a, b| {
            b.scaled_clv
                .total_cmp(&a.scaled_clv)
                .then(a.customer_id.cmp(&b.customer_id))
        });
        ranked.truncate(n);
        ranked
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CltvReport {
    pub anchor: NaiveDateTime,
    pub cleaning: CleaningReport,
    pub customers: usize,
    pub dropped_customers: usize,
    #[serde(flatten)]
    pub analysis: CohortAnalysis,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, CltvError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage on raw transaction rows.
    pub fn run(&self, rows: &[RawTransaction]) -> Result<CltvReport, CltvError> {
        let cleaned = Cleaner::new(self.config.winsorize_params()).clean(rows)?;
        tracing::info!(rows = cleaned.transactions().len(), "cleaned transactions");

        let anchor = resolve_anchor(cleaned.transactions(), self.config.anchor())?;
        let summaries = summarize(cleaned.transactions(), anchor)?;
        let customers = summaries.len();
        tracing::info!(customers, %anchor, "summarized customers");

        let cohort = CohortFilter::new(self.config.min_cohort_size).filter(summaries)?;
        tracing::info!(cohort = cohort.len(), "selected cohort");

        let analysis = self.analyze(&cohort)?;
        Ok(CltvReport {
            anchor,
            cleaning: cleaned.report().clone(),
            customers,
            dropped_customers: cohort.dropped(),
            analysis,
        })
    }

    /// Fits both models on `cohort` and scores every customer.
    pub fn analyze(&self, cohort: &Cohort) -> Result<CohortAnalysis, CltvError> {
        let per_week = self.config.time_unit.per_week();
        // summaries re-expressed in the unit the purchase model is fitted in
        let model_rows = cohort
            .customers()
            .iter()
            .map(|c| CustomerSummary {
                recency: c.recency * per_week,
                t: c.t * per_week,
                ..c.clone()
            })
            .collect::<Vec<_>>();

        let bg_nbd = BgNbdFitter::new(self.config.bg_penalizer)
            .with_optimizer(self.config.optimizer)
            .fit(&model_rows)?;
        let gamma_gamma = GammaGammaFitter::new(self.config.gg_penalizer)
            .with_optimizer(self.config.optimizer)
            .fit(&model_rows)?;
        tracing::info!(
            bg_nbd = ?bg_nbd.params(),
            gamma_gamma = ?gamma_gamma.params(),
            "fitted models"
        );

        let horizon = self.config.horizon();
        let mut clipped_clv = 0;
        let mut scored = Vec::with_capacity(model_rows.len());
        for (summary, row) in cohort.customers().iter().zip(&model_rows) {
            let week = bg_nbd.predict(ONE_WEEK * per_week, row.frequency, row.recency, row.t);
            let month = bg_nbd.predict(ONE_MONTH * per_week, row.frequency, row.recency, row.t);
            let profit =
                gamma_gamma.conditional_expected_average_profit(row.frequency, row.monetary)?;
            if ![week, month, profit].iter().all(|v| v.is_finite() && *v >= 0.0) {
                return Err(CltvError::model_fit_failure(format!(
                    "customer {}: non-finite or negative prediction (week {week}, month {month}, profit {profit})",
                    row.customer_id
                )));
            }
            let mut clv = discounted_value(&bg_nbd, row, profit, &horizon);
            if !(clv.is_finite() && clv >= 0.0) {
                clipped_clv += 1;
                clv = 0.0;
            }
            scored.push((summary, week, month, profit, clv));
        }
        if clipped_clv > 0 {
            tracing::warn!(clipped_clv, "clipped negative or non-finite CLTV values to zero");
        }

        let clv_values = scored.iter().map(|s| s.4).collect::<Vec<_>>();
        let segmenter = Segmenter::new(self.config.scale_range, self.config.segment_labels.clone());
        let segmentation = segmenter.segment(&clv_values)?;

        let predictions = scored
            .into_iter()
            .zip(segmentation.scaled)
            .zip(segmentation.segments)
            .map(|(((summary, week, month, profit, clv), scaled_clv), segment)| CustomerPrediction {
                customer_id: summary.customer_id,
                recency: summary.recency,
                t: summary.t,
                frequency: summary.frequency,
                monetary: summary.monetary,
                expected_purc_1_week: week,
                expected_purc_1_month: month,
                expected_average_profit: profit,
                clv,
                scaled_clv,
                segment,
            })
            .collect::<Vec<_>>();
        let segments = aggregate_segments(&predictions, segmenter.labels());
        for segment in &segments {
            tracing::debug!(segment = %segment.segment, customers = segment.count(), "segment");
        }

        Ok(CohortAnalysis {
            models: FittedModels {
                bg_nbd,
                gamma_gamma,
            },
            scaler: segmentation.scaler,
            segment_edges: segmentation.edges,
            predictions,
            segments,
            clipped_clv,
        })
    }
}
