//! BG/NBD repeat-purchase model.
//!
//! While active, a customer purchases as a Poisson process with rate
//! `λ ~ Gamma(r, α)`; after every purchase they become inactive with
//! probability `p ~ Beta(a, b)`. The fitter estimates `(r, α, a, b)` by
//! penalized maximum likelihood over the cohort's
//! `(frequency, recency, T)` triples.
//!
//! # Fitting
//!
//! - times are multiplied by `10 / max(T)` before fitting and `α` is mapped
//!   back afterwards
//! - the optimizer works on `ln` of the parameters, starting from all ones
//! - the objective is the negative mean log-likelihood plus
//!   `penalizer · Σ θ²` over the (rescaled) parameters

use cltv_core::{CltvError, summary::CustomerSummary};
use cltv_stats::special::{ln_gamma, ln_hyp2f1, log_sum_exp};
use serde::{Deserialize, Serialize};

use crate::optimizer::{MIN_FITTED_PARAMETER, NelderMead};

const TIME_SCALE_TARGET: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BgNbdParams {
    pub r: f64,
    pub alpha: f64,
    pub a: f64,
    pub b: f64,
}

impl BgNbdParams {
    fn from_log(log_params: &[f64]) -> Self {
        Self {
            r: log_params[0].exp(),
            alpha: log_params[1].exp(),
            a: log_params[2].exp(),
            b: log_params[3].exp(),
        }
    }

    fn is_valid(&self) -> bool {
        [self.r, self.alpha, self.a, self.b]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }

    fn is_interior(&self) -> bool {
        [self.r, self.alpha, self.a, self.b]
            .iter()
            .all(|v| *v >= MIN_FITTED_PARAMETER)
    }

    fn sum_of_squares(&self) -> f64 {
        self.r * self.r + self.alpha * self.alpha + self.a * self.a + self.b * self.b
    }
}

/// A customer's history in model terms.
#[derive(Debug, Clone, Copy)]
struct Observation {
    x: f64,
    t_x: f64,
    t: f64,
}

impl Observation {
    fn from_summary(summary: &CustomerSummary, scale: f64) -> Self {
        Self {
            x: f64::from(summary.frequency),
            t_x: summary.recency * scale,
            t: summary.t * scale,
        }
    }
}

fn log_likelihood(params: &BgNbdParams, obs: &Observation) -> f64 {
    let BgNbdParams { r, alpha, a, b } = *params;
    let Observation { x, t_x, t } = *obs;

    let a1 = ln_gamma(r + x) - ln_gamma(r) + r * alpha.ln();
    let a2 = ln_gamma(a + b) + ln_gamma(b + x) - ln_gamma(b) - ln_gamma(a + b + x);
    let a3 = -(r + x) * (alpha + t).ln();
    let a4 = if x > 0.0 {
        a.ln() - (b + x.max(1.0) - 1.0).ln() - (r + x) * (alpha + t_x).ln()
    } else {
        f64::NEG_INFINITY
    };
    a1 + a2 + log_sum_exp(a3, a4)
}

#[expect(clippy::cast_precision_loss)]
fn mean_log_likelihood(params: &BgNbdParams, observations: &[Observation]) -> f64 {
    observations
        .iter()
        .map(|obs| log_likelihood(params, obs))
        .sum::<f64>()
        / observations.len() as f64
}

/// Penalized maximum-likelihood estimator for [`BgNbdModel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BgNbdFitter {
    penalizer: f64,
    optimizer: NelderMead,
}

impl Default for BgNbdFitter {
    fn default() -> Self {
        Self::new(0.001)
    }
}

impl BgNbdFitter {
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

    fn objective(&self, log_params: &[f64], observations: &[Observation]) -> f64 {
        let params = BgNbdParams::from_log(log_params);
        if !params.is_valid() {
            return f64::INFINITY;
        }
        -mean_log_likelihood(&params, observations) + self.penalizer * params.sum_of_squares()
    }

    /// Fits the model on customer summaries.
    ///
    /// Fails with [`CltvError::InsufficientData`] when `customers` is empty
    /// or every `T` is zero, and with [`CltvError::ModelFitFailure`] when the
    /// optimizer does not converge, ends on non-finite parameters, or drives
    /// a parameter to zero.
    pub fn fit(&self, customers: &[CustomerSummary]) -> Result<BgNbdModel, CltvError> {
        let max_t = customers.iter().map(|c| c.t).fold(0.0, f64::max);
        if customers.is_empty() || max_t <= 0.0 {
            return Err(CltvError::insufficient_data(
                "BG/NBD needs at least one customer with a positive observation window",
            ));
        }
        for customer in customers {
            customer.validate()?;
        }

        let scale = TIME_SCALE_TARGET / max_t;
        let observations = customers
            .iter()
            .map(|c| Observation::from_summary(c, scale))
            .collect::<Vec<_>>();

        let minimum = self
            .optimizer
            .minimize(|p| self.objective(p, &observations), &[0.0; 4]);
        let scaled = BgNbdParams::from_log(&minimum.point);
        if !minimum.converged {
            return Err(CltvError::model_fit_failure(format!(
                "BG/NBD optimizer did not converge after {} iterations (last parameters {scaled:?}); try a larger penalizer",
                minimum.iterations
            )));
        }
        if !scaled.is_valid() || !minimum.value.is_finite() {
            return Err(CltvError::model_fit_failure(format!(
                "BG/NBD optimizer ended on non-finite parameters {scaled:?}"
            )));
        }
        if !scaled.is_interior() {
            return Err(CltvError::model_fit_failure(format!(
                "BG/NBD fit collapsed onto the parameter boundary {scaled:?}; try a larger penalizer"
            )));
        }

        let log_likelihood = mean_log_likelihood(&scaled, &observations);
        let params = BgNbdParams {
            alpha: scaled.alpha / scale,
            ..scaled
        };
        tracing::debug!(
            r = params.r,
            alpha = params.alpha,
            a = params.a,
            b = params.b,
            log_likelihood,
            iterations = minimum.iterations,
            "fitted BG/NBD model"
        );
        Ok(BgNbdModel {
            params,
            log_likelihood,
            iterations: minimum.iterations,
        })
    }
}

/// A fitted BG/NBD model.
///
/// `log_likelihood` is the mean unpenalized log-likelihood in the rescaled
/// time units used while fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgNbdModel {
    params: BgNbdParams,
    log_likelihood: f64,
    iterations: usize,
}

impl BgNbdModel {
    /// Wraps known parameters without fitting.
    pub fn from_params(params: BgNbdParams) -> Result<Self, CltvError> {
        if !params.is_valid() {
            return Err(CltvError::domain(format!(
                "BG/NBD parameters must be positive and finite: {params:?}"
            )));
        }
        Ok(Self {
            params,
            log_likelihood: f64::NAN,
            iterations: 0,
        })
    }

    #[must_use]
    pub fn params(&self) -> &BgNbdParams {
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

    /// Expected number of purchases in the next `t` time units given the
    /// observed history.
    ///
    /// `t`, `recency` and `t_observed` share the unit the model was fitted
    /// in. The result is clamped at zero.
    #[must_use]
    pub fn predict(&self, t: f64, frequency: u32, recency: f64, t_observed: f64) -> f64 {
        let BgNbdParams { r, alpha, a, b } = self.params;
        let x = f64::from(frequency);

        let hyp_a = r + x;
        let hyp_b = b + x;
        let hyp_c = a + b + x - 1.0;
        let z = t / (alpha + t_observed + t);
        let ln_hyp = ln_hyp2f1(hyp_a, hyp_b, hyp_c, z);

        let first = (a + b + x - 1.0) / (a - 1.0);
        let second =
            1.0 - (ln_hyp + (r + x) * ((alpha + t_observed) / (alpha + t + t_observed)).ln()).exp();
        let denominator = if frequency > 0 {
            1.0 + (a / (b + x - 1.0)) * ((alpha + t_observed) / (alpha + recency)).powf(r + x)
        } else {
            1.0
        };
        (first * second / denominator).max(0.0)
    }

    /// Probability that the customer has not dropped out by `t_observed`.
    #[must_use]
    pub fn conditional_probability_alive(
        &self,
        frequency: u32,
        recency: f64,
        t_observed: f64,
    ) -> f64 {
        if frequency == 0 {
            return 1.0;
        }
        let BgNbdParams { r, alpha, a, b } = self.params;
        let x = f64::from(frequency);
        let log_div = (r + x) * ((alpha + t_observed) / (alpha + recency)).ln()
            + (a / (b + x.max(1.0) - 1.0)).ln();
        1.0 / (1.0 + log_div.exp())
    }

    /// Expected purchases in `(0, t]` for a customer observed from time zero.
    ///
    /// Returns `None` when `a <= 1`, where the closed form does not apply.
    #[must_use]
    pub fn expected_purchases_unconditional(&self, t: f64) -> Option<f64> {
        let BgNbdParams { r, alpha, a, b } = self.params;
        if a <= 1.0 {
            return None;
        }
        let ln_hyp = ln_hyp2f1(r, b, a + b - 1.0, t / (alpha + t));
        let tail = (ln_hyp + r * (alpha / (alpha + t)).ln()).exp();
        Some((a + b - 1.0) / (a - 1.0) * (1.0 - tail))
    }
}
