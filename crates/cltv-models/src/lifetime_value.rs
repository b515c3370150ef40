//! Discounted customer lifetime value.
//!
//! The horizon is always counted in months. [`TimeUnit`] only states the
//! unit `recency` and `T` were measured in, which fixes how many model time
//! units make up one month.
//!
//! For month `k = 1..=months` the expected purchases in
//! `(f·(k−1), f·k]` are multiplied by the expected average profit and
//! discounted by `(1 + r)^k`, where `f` is the number of time units per
//! month.

use cltv_core::{CltvError, summary::CustomerSummary};
use serde::{Deserialize, Serialize};

use crate::{bg_nbd::BgNbdModel, gamma_gamma::GammaGammaModel};

/// Unit of `recency` and `T` passed to the purchase model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Hour,
    Day,
    #[default]
    Week,
    Month,
}

impl TimeUnit {
    /// Number of units in one week.
    #[must_use]
    pub fn per_week(self) -> f64 {
        match self {
            Self::Hour => 7.0 * 24.0,
            Self::Day => 7.0,
            Self::Week => 1.0,
            Self::Month => 1.0 / Self::Week.periods_per_month(),
        }
    }

    /// Number of units in one month, as used for the CLTV horizon.
    #[must_use]
    pub fn periods_per_month(self) -> f64 {
        match self {
            Self::Hour => 30.0 * 24.0,
            Self::Day => 30.0,
            Self::Week => 4.345,
            Self::Month => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClvHorizon {
    pub months: u32,
    pub time_unit: TimeUnit,
    /// Discount rate per month.
    pub discount_rate: f64,
}

impl Default for ClvHorizon {
    fn default() -> Self {
        Self {
            months: 6,
            time_unit: TimeUnit::Week,
            discount_rate: 0.01,
        }
    }
}

impl GammaGammaModel {
    /// Discounted expected spend of one customer over `horizon`.
    ///
    /// ```
    /// use cltv_core::summary::CustomerSummary;
    /// use cltv_models::{
    ///     bg_nbd::{BgNbdModel, BgNbdParams},
    ///     gamma_gamma::{GammaGammaModel, GammaGammaParams},
    ///     lifetime_value::ClvHorizon,
    /// };
    ///
    /// let bg = BgNbdModel::from_params(BgNbdParams {
    ///     r: 0.243,
    ///     alpha: 4.414,
    ///     a: 0.793,
    ///     b: 2.426,
    /// })?;
    /// let gg = GammaGammaModel::from_params(GammaGammaParams { p: 6.25, q: 3.74, v: 15.44 })?;
    /// let customer = CustomerSummary {
    ///     customer_id: 1,
    ///     recency: 30.0,
    ///     t: 38.0,
    ///     frequency: 4,
    ///     monetary: 50.0,
    /// };
    ///
    /// let six_months = gg.customer_lifetime_value(&bg, &customer, &ClvHorizon::default())?;
    /// let year_horizon = ClvHorizon { months: 12, ..ClvHorizon::default() };
    /// let year = gg.customer_lifetime_value(&bg, &customer, &year_horizon)?;
    /// assert!(six_months > 0.0 && year > six_months);
    /// # Ok::<(), cltv_core::CltvError>(())
    /// ```
    pub fn customer_lifetime_value(
        &self,
        purchases: &BgNbdModel,
        customer: &CustomerSummary,
        horizon: &ClvHorizon,
    ) -> Result<f64, CltvError> {
        let profit =
            self.conditional_expected_average_profit(customer.frequency, customer.monetary)?;
        Ok(discounted_value(purchases, customer, profit, horizon))
    }
}

/// Sums discounted monthly value for a known expected average profit.
#[must_use]
pub fn discounted_value(
    purchases: &BgNbdModel,
    customer: &CustomerSummary,
    expected_average_profit: f64,
    horizon: &ClvHorizon,
) -> f64 {
    let factor = horizon.time_unit.periods_per_month();
    let predict = |t: f64| purchases.predict(t, customer.frequency, customer.recency, customer.t);

    let mut previous = 0.0;
    let mut total = 0.0;
    for k in 1..=horizon.months {
        let month = f64::from(k);
        let cumulative = predict(factor * month);
        let expected = cumulative - previous;
        previous = cumulative;
        total += expected_average_profit * expected / (1.0 + horizon.discount_rate).powf(month);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bg_nbd::BgNbdParams, gamma_gamma::GammaGammaParams};

    fn models() -> (BgNbdModel, GammaGammaModel) {
        (
            BgNbdModel::from_params(BgNbdParams {
                r: 0.243,
                alpha: 4.414,
                a: 0.793,
                b: 2.426,
            })
            .unwrap(),
            GammaGammaModel::from_params(GammaGammaParams {
                p: 6.25,
                q: 3.74,
                v: 15.44,
            })
            .unwrap(),
        )
    }

    fn customer() -> CustomerSummary {
        CustomerSummary {
            customer_id: 12_347,
            recency: 52.0,
            t: 53.0,
            frequency: 7,
            monetary: 615.7,
        }
    }

    #[test]
    fn test_undiscounted_value_is_profit_times_purchases() {
        let (bg, gg) = models();
        let c = customer();
        let horizon = ClvHorizon {
            discount_rate: 0.0,
            ..ClvHorizon::default()
        };
        let profit = gg
            .conditional_expected_average_profit(c.frequency, c.monetary)
            .unwrap();
        let purchases = bg.predict(6.0 * 4.345, c.frequency, c.recency, c.t);
        let clv = gg.customer_lifetime_value(&bg, &c, &horizon).unwrap();
        assert!((clv - profit * purchases).abs() < 1e-9 * clv);
    }

    #[test]
    fn test_discounting_lowers_value() {
        let (bg, gg) = models();
        let c = customer();
        let plain = gg
            .customer_lifetime_value(
                &bg,
                &c,
                &ClvHorizon {
                    discount_rate: 0.0,
                    ..ClvHorizon::default()
                },
            )
            .unwrap();
        let discounted = gg
            .customer_lifetime_value(&bg, &c, &ClvHorizon::default())
            .unwrap();
        assert!(discounted < plain);
        assert!(discounted > 0.0);
    }

    #[test]
    fn test_horizon_is_in_months_for_every_unit() {
        let (bg, _) = models();
        // the same customer measured in days instead of weeks
        let weeks = customer();
        let days = CustomerSummary {
            recency: weeks.recency * 7.0,
            t: weeks.t * 7.0,
            ..weeks.clone()
        };
        let bg_days = BgNbdModel::from_params(BgNbdParams {
            alpha: bg.params().alpha * 7.0,
            ..*bg.params()
        })
        .unwrap();
        let in_weeks = discounted_value(&bg, &weeks, 1.0, &ClvHorizon::default());
        let in_days = discounted_value(
            &bg_days,
            &days,
            1.0,
            &ClvHorizon {
                time_unit: TimeUnit::Day,
                ..ClvHorizon::default()
            },
        );
        // 4.345 weeks and 30 days are close but not equal months
        assert!((in_weeks - in_days).abs() / in_weeks < 0.05);
    }

    #[test]
    fn test_zero_horizon() {
        let (bg, gg) = models();
        let horizon = ClvHorizon {
            months: 0,
            ..ClvHorizon::default()
        };
        assert_eq!(
            gg.customer_lifetime_value(&bg, &customer(), &horizon).unwrap(),
            0.0
        );
    }

    #[test]
    fn test_week_conversions() {
        assert_eq!(TimeUnit::Week.per_week(), 1.0);
        assert_eq!(TimeUnit::Day.per_week(), 7.0);
        assert!((TimeUnit::Month.per_week() * 4.345 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_time_unit_serde() {
        assert_eq!(serde_json::to_string(&TimeUnit::Week).unwrap(), "\"week\"");
        let unit: TimeUnit = serde_json::from_str("\"day\"").unwrap();
        assert_eq!(unit, TimeUnit::Day);
    }
}
