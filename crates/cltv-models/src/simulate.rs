//! Synthetic customers and transaction logs drawn from the fitted models'
//! generative process.
//!
//! Per customer:
//!
//! - purchase rate `λ ~ Gamma(r, 1/α)` and dropout probability
//!   `p ~ Beta(a, b)`
//! - spend rate `ν ~ Gamma(q, 1/v)`; each invoice is worth
//!   `Gamma(p_gg, 1/ν)`
//! - the first purchase falls uniformly in the acquisition window; gaps
//!   between purchases are `Exp(λ)` weeks; after every purchase the customer
//!   drops out with probability `p`
//!
//! Generation is driven by a caller-supplied RNG, so a seeded
//! [`Pcg32`] reproduces the same log.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use cltv_core::{
    CltvError,
    transaction::{CustomerId, RawTransaction},
};
use rand::{Rng, SeedableRng as _};
use rand_distr::{Beta, Distribution as _, Exp, Gamma};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::{bg_nbd::BgNbdParams, gamma_gamma::GammaGammaParams};

const SECONDS_PER_WEEK: f64 = 7.0 * 24.0 * 60.0 * 60.0;
const FIRST_INVOICE_NUMBER: u64 = 536_365;
const MAX_LINES_PER_INVOICE: usize = 3;
const MAX_LINE_QUANTITY: i64 = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub customers: usize,
    pub first_customer_id: CustomerId,
    pub start: NaiveDateTime,
    /// Length of the observation window in weeks.
    pub observation_weeks: f64,
    /// First purchases are spread uniformly over this many weeks.
    pub acquisition_weeks: f64,
    pub bg_nbd: BgNbdParams,
    pub gamma_gamma: GammaGammaParams,
    /// Probability that an invoice is followed by a return row.
    pub return_rate: f64,
    /// Probability that an invoice's rows lack a customer id.
    pub missing_customer_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let start = NaiveDate::from_ymd_opt(2010, 12, 1)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .unwrap_or_default();
        Self {
            customers: 1000,
            first_customer_id: 12_346,
            start,
            observation_weeks: 53.0,
            acquisition_weeks: 26.0,
            bg_nbd: BgNbdParams {
                r: 0.243,
                alpha: 4.414,
                a: 0.793,
                b: 2.426,
            },
            gamma_gamma: GammaGammaParams {
                p: 6.25,
                q: 3.74,
                v: 15.44,
            },
            return_rate: 0.02,
            missing_customer_rate: 0.05,
        }
    }
}

impl SimulationConfig {
    /// End of the observation window, usable as the anchor date.
    #[expect(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn observation_end(&self) -> NaiveDateTime {
        self.start + Duration::seconds((self.observation_weeks * SECONDS_PER_WEEK) as i64)
    }

    pub fn validate(&self) -> Result<(), CltvError> {
        let rate_ok = |v: f64| (0.0..=1.0).contains(&v);
        if !(self.observation_weeks > 0.0
            && self.acquisition_weeks > 0.0
            && self.acquisition_weeks <= self.observation_weeks)
        {
            return Err(CltvError::domain(format!(
                "acquisition window ({} weeks) must be positive and within the observation window ({} weeks)",
                self.acquisition_weeks, self.observation_weeks
            )));
        }
        if !rate_ok(self.return_rate) || !rate_ok(self.missing_customer_rate) {
            return Err(CltvError::domain(format!(
                "return rate {} and missing customer rate {} must lie in [0, 1]",
                self.return_rate, self.missing_customer_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatedPurchase {
    /// Weeks since the start of the observation window.
    pub week: f64,
    pub spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedCustomer {
    pub customer_id: CustomerId,
    pub purchase_rate: f64,
    pub dropout_probability: f64,
    pub purchases: Vec<SimulatedPurchase>,
}

fn distribution_error(name: &str, err: impl std::fmt::Display) -> CltvError {
    CltvError::domain(format!("invalid {name} distribution: {err}"))
}

/// Draws customers and their purchases.
pub fn simulate_customers<R>(
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<Vec<SimulatedCustomer>, CltvError>
where
    R: Rng,
{
    config.validate()?;
    let BgNbdParams { r, alpha, a, b } = config.bg_nbd;
    let GammaGammaParams { p, q, v } = config.gamma_gamma;

    let rate_dist = Gamma::new(r, 1.0 / alpha).map_err(|e| distribution_error("purchase rate", e))?;
    let dropout_dist = Beta::new(a, b).map_err(|e| distribution_error("dropout", e))?;
    let spend_rate_dist = Gamma::new(q, 1.0 / v).map_err(|e| distribution_error("spend rate", e))?;

    (0..config.customers)
        .map(|i| {
            let purchase_rate = rate_dist.sample(rng);
            let dropout_probability = dropout_dist.sample(rng);
            let spend_rate = spend_rate_dist.sample(rng);
            let spend_dist =
                Gamma::new(p, 1.0 / spend_rate).map_err(|e| distribution_error("spend", e))?;

            let mut week = rng.random_range(0.0..config.acquisition_weeks);
            let mut purchases = vec![SimulatedPurchase {
                week,
                spend: spend_dist.sample(rng),
            }];
            // a vanishing rate means no repeat purchase within the window
            if let Ok(gap_dist) = Exp::new(purchase_rate) {
                while !rng.random_bool(dropout_probability) {
                    week += gap_dist.sample(rng);
                    if week > config.observation_weeks {
                        break;
                    }
                    purchases.push(SimulatedPurchase {
                        week,
                        spend: spend_dist.sample(rng),
                    });
                }
            }

            Ok(SimulatedCustomer {
                customer_id: config.first_customer_id + i as CustomerId,
                purchase_rate,
                dropout_probability,
                purchases,
            })
        })
        .collect()
}

/// Renders simulated purchases as a transaction log ordered by invoice date.
///
/// Each purchase becomes one invoice of 1–3 line items whose totals add up
/// to the purchase value, up to rounding of prices to cents.
#[expect(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn render_transactions<R>(
    config: &SimulationConfig,
    customers: &[SimulatedCustomer],
    rng: &mut R,
) -> Vec<RawTransaction>
where
    R: Rng,
{
    let mut invoices = customers
        .iter()
        .flat_map(|c| c.purchases.iter().map(move |p| (c.customer_id, *p)))
        .collect::<Vec<_>>();
    invoices.sort_by(|(ca, pa), (cb, pb)| pa.week.total_cmp(&pb.week).then(ca.cmp(cb)));

    let mut rows = Vec::new();
    let mut invoice_number = FIRST_INVOICE_NUMBER;
    for (customer_id, purchase) in invoices {
        let date = config.start + Duration::seconds((purchase.week * SECONDS_PER_WEEK) as i64);
        let invoice = invoice_number.to_string();
        invoice_number += 1;
        let customer_id = (!rng.random_bool(config.missing_customer_rate)).then_some(customer_id);

        let lines = rng.random_range(1..=MAX_LINES_PER_INVOICE);
        let weights = (0..lines)
            .map(|_| rng.random_range(0.2..1.0))
            .collect::<Vec<f64>>();
        let weight_sum = weights.iter().sum::<f64>();
        let first_line = rows.len();
        for weight in weights {
            let quantity = rng.random_range(1..=MAX_LINE_QUANTITY);
            let line_spend = purchase.spend * weight / weight_sum;
            let price = ((line_spend / quantity as f64) * 100.0).round().max(1.0) / 100.0;
            let stock_code = rng.random_range(20_000..90_000).to_string();
            rows.push(RawTransaction {
                invoice: Some(invoice.clone()),
                description: Some(format!("ITEM {stock_code}")),
                stock_code: Some(stock_code),
                quantity: Some(quantity),
                invoice_date: Some(date),
                price: Some(price),
                customer_id,
                country: Some("United Kingdom".to_owned()),
            });
        }

        if rng.random_bool(config.return_rate) {
            let returned = rows[first_line].clone();
            rows.push(RawTransaction {
                invoice: Some(format!("C{invoice_number}")),
                quantity: returned.quantity.map(|q| -q),
                invoice_date: Some(date + Duration::days(1)),
                ..returned
            });
            invoice_number += 1;
        }
    }
    rows
}

/// Draws a complete transaction log from a seed.
///
/// ```
/// use cltv_models::simulate::{SimulationConfig, simulate_transactions};
///
/// let config = SimulationConfig { customers: 20, ..SimulationConfig::default() };
/// let first = simulate_transactions(&config, 42)?;
/// let second = simulate_transactions(&config, 42)?;
/// assert_eq!(first, second);
/// assert!(!first.is_empty());
/// # Ok::<(), cltv_core::CltvError>(())
/// ```
pub fn simulate_transactions(
    config: &SimulationConfig,
    seed: u64,
) -> Result<Vec<RawTransaction>, CltvError> {
    let mut rng = Pcg32::seed_from_u64(seed);
    let customers = simulate_customers(config, &mut rng)?;
    let rows = render_transactions(config, &customers, &mut rng);
    tracing::info!(
        customers = customers.len(),
        rows = rows.len(),
        seed,
        "simulated transaction log"
    );
    Ok(rows)
}

/// Eligible customer summaries from a clean simulated log.
#[cfg(test)]
pub(crate) fn simulated_cohort(
    seed: u64,
    customers: usize,
) -> Vec<cltv_core::summary::CustomerSummary> {
    use cltv_core::{
        summary::{CohortFilter, summarize},
        transaction::Transaction,
    };

    let config = SimulationConfig {
        customers,
        return_rate: 0.0,
        missing_customer_rate: 0.0,
        ..SimulationConfig::default()
    };
    let transactions = simulate_transactions(&config, seed)
        .unwrap()
        .iter()
        .filter_map(Transaction::from_raw)
        .collect::<Vec<_>>();
    let summaries = summarize(&transactions, config.observation_end()).unwrap();
    CohortFilter::new(30)
        .filter(summaries)
        .unwrap()
        .customers()
        .to_vec()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn test_purchases_stay_in_window() {
        let config = SimulationConfig {
            customers: 200,
            ..SimulationConfig::default()
        };
        let mut rng = Pcg32::seed_from_u64(1);
        let customers = simulate_customers(&config, &mut rng).unwrap();
        assert_eq!(customers.len(), 200);
        for c in &customers {
            assert!(!c.purchases.is_empty());
            assert!(c.purchases[0].week < config.acquisition_weeks);
            assert!(c.purchases.windows(2).all(|w| w[0].week <= w[1].week));
            assert!(c.purchases.iter().all(|p| p.week <= config.observation_weeks));
            assert!(c.purchases.iter().all(|p| p.spend > 0.0));
        }
        assert!(customers.iter().any(|c| c.purchases.len() > 1));
    }

    #[test]
    fn test_rendered_rows() {
        let config = SimulationConfig {
            customers: 300,
            return_rate: 0.2,
            missing_customer_rate: 0.2,
            ..SimulationConfig::default()
        };
        let rows = simulate_transactions(&config, 9).unwrap();
        let end = config.observation_end();

        let returns = rows.iter().filter(|r| r.is_return()).collect::<Vec<_>>();
        assert!(!returns.is_empty());
        assert!(returns.iter().all(|r| r.quantity.is_some_and(|q| q < 0)));
        assert!(rows.iter().any(|r| r.customer_id.is_none()));

        for row in rows.iter().filter(|r| !r.is_return()) {
            assert!(row.quantity.is_some_and(|q| q > 0));
            assert!(row.price.is_some_and(|p| p > 0.0));
            assert!(row.invoice_date.is_some_and(|d| d <= end));
        }

        let invoices = rows
            .iter()
            .filter_map(|r| r.invoice.as_deref())
            .collect::<BTreeSet<_>>();
        assert!(invoices.len() < rows.len());
    }

    #[test]
    fn test_seed_changes_output() {
        let config = SimulationConfig {
            customers: 50,
            ..SimulationConfig::default()
        };
        assert_ne!(
            simulate_transactions(&config, 1).unwrap(),
            simulate_transactions(&config, 2).unwrap()
        );
    }

    #[test]
    fn test_invalid_config() {
        let config = SimulationConfig {
            return_rate: 1.5,
            ..SimulationConfig::default()
        };
        assert!(simulate_transactions(&config, 0).unwrap_err().is_domain());

        let config = SimulationConfig {
            bg_nbd: BgNbdParams {
                r: -1.0,
                ..SimulationConfig::default().bg_nbd
            },
            ..SimulationConfig::default()
        };
        assert!(simulate_transactions(&config, 0).unwrap_err().is_domain());
    }
}
