//! Gamma-Gamma spend model.
//!
//! A customer's invoice values are `Gamma(p, ν)` with the customer-level rate
//! `ν ~ Gamma(q, v)`. Given `x` invoices with average value `m`, the
//! conditional expected spend is `p·(v + x·m) / (p·x + q − 1)`. When `q > 1`
//! this is a weighted average of `m` and the population mean
//! `v·p / (q − 1)`, so sparse histories are shrunk toward the cohort.
//!
//! The model assumes spend is independent of purchase frequency.

use cltv_core::{CltvError, summary::CustomerSummary};
use cltv_stats::special::ln_gamma;
use serde::{Deserialize, Serialize};

use crate::optimizer::{MIN_FITTED_PARAMETER, NelderMead};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GammaGammaParams {
    pub p: f64,
    pub q: f64,
    pub v: f64,
}

impl GammaGammaParams {
    fn from_log(log_params: &[f64]) -> Self {
        Self {
            p: log_params[0].exp(),
            q: log_params[1].exp(),
            v: log_params[2].exp(),
        }
    }

    fn is_valid(&self) -> bool {
        [self.p, self.q, self.v]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }

    fn is_interior(&self) -> bool {
        [self.p, self.q, self.v]
            .iter()
            .all(|v| *v >= MIN_FITTED_PARAMETER)
    }
}

fn negative_log_likelihood(params: &GammaGammaParams, x: f64, m: f64) -> f64 {
    let GammaGammaParams { p, q, v } = *params;
    let px = p * x;
    -(ln_gamma(px + q) - ln_gamma(px) - ln_gamma(q) + q * v.ln() + (px - 1.0) * m.ln()
        + px * x.ln()
        - (px + q) * (x * m + v).ln())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaGammaFitter {
    penalizer: f64,
    optimizer: NelderMead,
}

impl Default for GammaGammaFitter {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl GammaGammaFitter {
    #[must_use]
    pub fn new(penalizer: f64) -> Self {
        Self {
            penalizer,
            optimizer: NelderMead::default(),
        }
    }

    #[must_use]
    pub fn with_optimizer(mut self, optimizer: NelderMead) -> Self {
        self.optimizer = optimizer;
        self
    }

    #[expect(clippy::cast_precision_loss)]
    fn objective(&self, log_params: &[f64], data: &[(f64, f64)]) -> f64 {
        let params = GammaGammaParams::from_log(log_params);
        if !params.is_valid() {
            return f64::INFINITY;
        }
        let mean = data
            .iter()
            .map(|&(x, m)| negative_log_likelihood(&params, x, m))
            .sum::<f64>()
            / data.len() as f64;
        let GammaGammaParams { p, q, v } = params;
        mean + self.penalizer * (p * p + q * q + v * v)
    }

    /// Fits the model on `(frequency, monetary)` of each customer.
    ///
    /// Every customer must have `frequency >= 1` and positive monetary value.
    /// The penalty `penalizer·(p² + q² + v²)` applies to the parameters in
    /// the units of the data.
    ///
    /// Fails with [`CltvError::ModelFitFailure`] when the optimizer does not
    /// converge or drives a parameter to zero. A fitted `q <= 1` is accepted;
    /// see [`GammaGammaModel::population_mean`].
    #[expect(clippy::cast_precision_loss)]
    pub fn fit(&self, customers: &[CustomerSummary]) -> Result<GammaGammaModel, CltvError> {
        if customers.is_empty() {
            return Err(CltvError::insufficient_data(
                "Gamma-Gamma needs at least one customer",
            ));
        }
        if let Some(c) = customers
            .iter()
            .find(|c| c.frequency == 0 || !(c.monetary > 0.0 && c.monetary.is_finite()))
        {
            return Err(CltvError::domain(format!(
                "customer {}: Gamma-Gamma requires frequency >= 1 and positive spend, got frequency {} and monetary {}",
                c.customer_id, c.frequency, c.monetary
            )));
        }

        let data = customers
            .iter()
            .map(|c| (f64::from(c.frequency), c.monetary))
            .collect::<Vec<_>>();

        let minimum = self
            .optimizer
            .minimize(|p| self.objective(p, &data), &[0.0; 3]);
        let params = GammaGammaParams::from_log(&minimum.point);
        if !minimum.converged {
            return Err(CltvError::model_fit_failure(format!(
                "Gamma-Gamma optimizer did not converge after {} iterations (last parameters {params:?}); try a larger penalizer",
                minimum.iterations
            )));
        }
        if !params.is_valid() || !minimum.value.is_finite() {
            return Err(CltvError::model_fit_failure(format!(
                "Gamma-Gamma optimizer ended on non-finite parameters {params:?}"
            )));
        }
        if !params.is_interior() {
            return Err(CltvError::model_fit_failure(format!(
                "Gamma-Gamma fit collapsed onto the parameter boundary {params:?}; try a larger penalizer"
            )));
        }

        let log_likelihood = -data
            .iter()
            .map(|&(x, m)| negative_log_likelihood(&params, x, m))
            .sum::<f64>()
            / data.len() as f64;
        tracing::debug!(
            p = params.p,
            q = params.q,
            v = params.v,
            log_likelihood,
            iterations = minimum.iterations,
            "fitted Gamma-Gamma model"
        );
        Ok(GammaGammaModel {
            params,
            log_likelihood,
            iterations: minimum.iterations,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GammaGammaModel {
    params: GammaGammaParams,
    log_likelihood: f64,
    iterations: usize,
}

impl GammaGammaModel {
    /// Wraps known parameters without fitting.
    pub fn from_params(params: GammaGammaParams) -> Result<Self, CltvError> {
        if !params.is_valid() {
            return Err(CltvError::domain(format!(
                "Gamma-Gamma parameters must be positive and finite: {params:?}"
            )));
        }
        Ok(Self {
            params,
            log_likelihood: f64::NAN,
            iterations: 0,
        })
    }

    #[must_use]
    pub fn params(&self) -> &GammaGammaParams {
        &self.params
    }

    #[must_use]
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Mean spend per invoice across the population, `v·p / (q − 1)`.
    ///
    /// Returns `None` when `q <= 1`, where the mean is unbounded.
    #[must_use]
    pub fn population_mean(&self) -> Option<f64> {
        let GammaGammaParams { p, q, v } = self.params;
        (q > 1.0).then(|| v * p / (q - 1.0))
    }

    /// Expected spend per invoice for a customer with `frequency` invoices
    /// averaging `monetary`.
    ///
    /// Fails with [`CltvError::ModelFitFailure`] when `p·frequency + q <= 1`
    /// (only possible for `q < 1`) or the result is not finite.
    ///
    /// ```
    /// use cltv_models::gamma_gamma::{GammaGammaModel, GammaGammaParams};
    ///
    /// let model = GammaGammaModel::from_params(GammaGammaParams { p: 6.25, q: 3.74, v: 15.44 })?;
    /// let population = model.population_mean().unwrap();
    /// // a single 100.0 invoice is pulled toward the population mean
    /// let profit = model.conditional_expected_average_profit(1, 100.0)?;
    /// assert!(population < profit && profit < 100.0);
    /// # Ok::<(), cltv_core::CltvError>(())
    /// ```
    pub fn conditional_expected_average_profit(
        &self,
        frequency: u32,
        monetary: f64,
    ) -> Result<f64, CltvError> {
        let GammaGammaParams { p, q, v } = self.params;
        let x = f64::from(frequency);
        let denominator = p * x + q - 1.0;
        let profit = p * (v + x * monetary) / denominator;
        if denominator <= 0.0 || !profit.is_finite() {
            return Err(CltvError::model_fit_failure(format!(
                "Gamma-Gamma {:?} gives no finite expected spend for frequency {frequency} and monetary {monetary}",
                self.params
            )));
        }
        Ok(profit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::simulated_cohort;

    #[test]
    fn test_profit_lies_between_history_and_population() {
        let model = GammaGammaModel::from_params(GammaGammaParams {
            p: 6.25,
            q: 3.74,
            v: 15.44,
        })
        .unwrap();
        let population = model.population_mean().unwrap();
        for (frequency, monetary) in [(2, 5.0), (3, 80.0), (40, 33.0)] {
            let profit = model
                .conditional_expected_average_profit(frequency, monetary)
                .unwrap();
            assert!(profit >= population.min(monetary) && profit <= population.max(monetary));
        }
        // more history, less shrinkage
        let few = model.conditional_expected_average_profit(2, 80.0).unwrap();
        let many = model.conditional_expected_average_profit(20, 80.0).unwrap();
        assert!((80.0 - many).abs() < (80.0 - few).abs());
    }

    #[test]
    fn test_profit_without_population_mean() {
        let model = GammaGammaModel::from_params(GammaGammaParams {
            p: 2.0,
            q: 0.9,
            v: 1.0,
        })
        .unwrap();
        assert_eq!(model.population_mean(), None);
        // 2 * (1 + 3 * 10) / (2 * 3 + 0.9 - 1)
        let profit = model.conditional_expected_average_profit(3, 10.0).unwrap();
        assert!((profit - 62.0 / 5.9).abs() < 1e-12);
        assert!(
            model
                .conditional_expected_average_profit(0, 10.0)
                .unwrap_err()
                .is_model_fit_failure()
        );
    }

    #[test]
    fn test_profit_matches_weighted_average() {
        let model = GammaGammaModel::from_params(GammaGammaParams {
            p: 6.25,
            q: 3.74,
            v: 15.44,
        })
        .unwrap();
        let population = model.population_mean().unwrap();
        let px = 6.25 * 4.0;
        let weight = px / (px + 3.74 - 1.0);
        let expected = (1.0 - weight) * population + weight * 25.0;
        let profit = model.conditional_expected_average_profit(4, 25.0).unwrap();
        assert!((profit - expected).abs() < 1e-9);
    }

    #[test]
    fn test_fit_matches_reference_optimum() {
        // optimum of the same penalized objective on raw spend, found by
        // Newton's method with finite-difference derivatives
        let cohort = [
            (2, 12.5),
            (2, 31.0),
            (3, 18.2),
            (3, 55.0),
            (4, 22.4),
            (5, 9.8),
            (5, 40.1),
            (6, 27.3),
            (8, 15.6),
            (10, 33.9),
            (12, 21.7),
            (15, 26.0),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (frequency, monetary))| CustomerSummary {
            customer_id: i as u64,
            recency: 10.0,
            t: 20.0,
            frequency,
            monetary,
        })
        .collect::<Vec<_>>();
        let model = GammaGammaFitter::default().fit(&cohort).unwrap();
        let p = model.params();
        for (fitted, expected) in [(p.p, 4.226_880), (p.q, 1.161_091), (p.v, 4.083_861)] {
            assert!(
                (fitted / expected - 1.0).abs() < 1e-3,
                "{p:?} differs from the reference optimum"
            );
        }
    }

    #[test]
    fn test_fit_rejects_non_positive_spend() {
        let customer = CustomerSummary {
            customer_id: 1,
            recency: 1.0,
            t: 2.0,
            frequency: 2,
            monetary: 0.0,
        };
        let err = GammaGammaFitter::default().fit(&[customer]).unwrap_err();
        assert!(err.is_domain());
        assert!(GammaGammaFitter::default().fit(&[]).unwrap_err().is_insufficient_data());
    }

    #[test]
    fn test_fit_on_simulated_cohort() {
        let cohort = simulated_cohort(5, 600);
        let fitter = GammaGammaFitter::default();
        let model = fitter.fit(&cohort).unwrap();
        for c in &cohort {
            let profit = model
                .conditional_expected_average_profit(c.frequency, c.monetary)
                .unwrap();
            assert!(profit.is_finite() && profit > 0.0);
        }

        let again = fitter.fit(&cohort).unwrap();
        assert_eq!(model, again);
    }
}
