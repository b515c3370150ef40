//! Per-customer summaries and cohort selection
//!
//! # Summary columns
//!
//! For each customer, over their cleaned transactions:
//!
//! - `recency`: whole days between first and last purchase, divided by 7
//! - `T`: whole days between first purchase and the anchor date, divided by 7
//! - `frequency`: number of distinct invoices
//! - `monetary`: total spend divided by `frequency`
//!
//! Recency here is the span of observed activity, not the time since the
//! last purchase.
//!
//! # Cohort eligibility
//!
//! The purchase model needs at least one observed inter-purchase interval and
//! the spend model needs positive spend, so [`CohortFilter`] drops customers
//! with `frequency <= 1` or `monetary <= 0`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    CltvError,
    transaction::{CustomerId, Transaction},
};

pub const DAYS_PER_WEEK: f64 = 7.0;

/// Aggregated purchase history of one customer. Times are in weeks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSummary {
    #[serde(rename = "Customer ID")]
    pub customer_id: CustomerId,
    pub recency: f64,
    #[serde(rename = "T")]
    pub t: f64,
    pub frequency: u32,
    pub monetary: f64,
}

impl CustomerSummary {
    /// Checks the invariants every summary row satisfies: finite values and
    /// `T >= recency >= 0`, `frequency >= 1`.
    pub fn validate(&self) -> Result<(), CltvError> {
        let id = self.customer_id;
        if !(self.recency.is_finite() && self.t.is_finite() && self.monetary.is_finite()) {
            return Err(CltvError::domain(format!(
                "customer {id}: non-finite summary {self:?}"
            )));
        }
        if self.recency < 0.0 {
            return Err(CltvError::domain(format!(
                "customer {id}: negative recency {}",
                self.recency
            )));
        }
        if self.t < self.recency {
            return Err(CltvError::domain(format!(
                "customer {id}: T ({}) is smaller than recency ({}); is the anchor date before the last purchase?",
                self.t, self.recency
            )));
        }
        if self.frequency == 0 {
            return Err(CltvError::domain(format!("customer {id}: zero frequency")));
        }
        Ok(())
    }

    /// Whether the customer can enter the models.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.frequency > 1 && self.monetary > 0.0
    }
}

/// Returns the configured anchor, or one day after the latest transaction.
pub fn resolve_anchor(
    transactions: &[Transaction],
    configured: Option<NaiveDateTime>,
) -> Result<NaiveDateTime, CltvError> {
    if let Some(anchor) = configured {
        return Ok(anchor);
    }
    transactions
        .iter()
        .map(|tx| tx.invoice_date)
        .max()
        .map(|last| last + Duration::days(1))
        .ok_or_else(|| {
            CltvError::insufficient_data("cannot derive an anchor date without transactions")
        })
}

#[derive(Debug)]
struct CustomerFold<'a> {
    first: NaiveDateTime,
    last: NaiveDateTime,
    invoices: BTreeSet<&'a str>,
    total_spend: f64,
}

impl<'a> CustomerFold<'a> {
    fn new(tx: &'a Transaction) -> Self {
        Self {
            first: tx.invoice_date,
            last: tx.invoice_date,
            invoices: BTreeSet::from([tx.invoice.as_str()]),
            total_spend: tx.total_price(),
        }
    }

    fn push(&mut self, tx: &'a Transaction) {
        self.first = self.first.min(tx.invoice_date);
        self.last = self.last.max(tx.invoice_date);
        self.invoices.insert(tx.invoice.as_str());
        self.total_spend += tx.total_price();
    }
}

/// Folds cleaned transactions into one summary per customer, ordered by
/// customer id.
///
/// Fails with [`CltvError::InsufficientData`] on empty input and with
/// [`CltvError::Domain`] when a customer's `T` would fall below its recency.
#[expect(clippy::cast_precision_loss)]
pub fn summarize(
    transactions: &[Transaction],
    anchor: NaiveDateTime,
) -> Result<Vec<CustomerSummary>, CltvError> {
    if transactions.is_empty() {
        return Err(CltvError::insufficient_data("no transactions to summarize"));
    }

    let mut folds = BTreeMap::<CustomerId, CustomerFold<'_>>::new();
    for tx in transactions {
        folds
            .entry(tx.customer_id)
            .and_modify(|fold| fold.push(tx))
            .or_insert_with(|| CustomerFold::new(tx));
    }

    folds
        .into_iter()
        .map(|(customer_id, fold)| {
            let recency_days = (fold.last - fold.first).num_days();
            let t_days = (anchor - fold.first).num_days();
            let frequency = u32::try_from(fold.invoices.len()).map_err(|_| {
                CltvError::domain(format!("customer {customer_id}: too many invoices"))
            })?;
            let summary = CustomerSummary {
                customer_id,
                recency: recency_days as f64 / DAYS_PER_WEEK,
                t: t_days as f64 / DAYS_PER_WEEK,
                frequency,
                monetary: fold.total_spend / f64::from(frequency),
            };
            summary.validate()?;
            Ok(summary)
        })
        .collect()
}

/// Customers eligible for model fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    customers: Vec<CustomerSummary>,
    dropped: usize,
}

impl Cohort {
    /// Wraps already-filtered summaries, checking the cohort invariants.
    pub fn from_eligible(customers: Vec<CustomerSummary>) -> Result<Self, CltvError> {
        for customer in &customers {
            customer.validate()?;
            if !customer.is_eligible() {
                return Err(CltvError::domain(format!(
                    "customer {}: ineligible row in cohort (frequency {}, monetary {})",
                    customer.customer_id, customer.frequency, customer.monetary
                )));
            }
        }
        Ok(Self {
            customers,
            dropped: 0,
        })
    }

    #[must_use]
    pub fn customers(&self) -> &[CustomerSummary] {
        &self.customers
    }

    /// Number of customers removed by the filter that built this cohort.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.customers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CohortFilter {
    min_cohort_size: usize,
}

impl Default for CohortFilter {
    fn default() -> Self {
        Self::new(30)
    }
}

impl CohortFilter {
    #[must_use]
    pub fn new(min_cohort_size: usize) -> Self {
        Self { min_cohort_size }
    }

    /// Keeps customers with `frequency >= 2` and `monetary > 0`.
    ///
    /// Fails with [`CltvError::InsufficientData`] when fewer than the
    /// minimum cohort size remain.
    pub fn filter(&self, summaries: Vec<CustomerSummary>) -> Result<Cohort, CltvError> {
        let total = summaries.len();
        let customers = summaries
            .into_iter()
            .filter(CustomerSummary::is_eligible)
            .collect::<Vec<_>>();
        let dropped = total - customers.len();
        if dropped > 0 {
            tracing::warn!(
                dropped,
                kept = customers.len(),
                "dropped customers ineligible for the models"
            );
        }
        if customers.len() < self.min_cohort_size {
            return Err(CltvError::insufficient_data(format!(
                "{} eligible customers, at least {} required",
                customers.len(),
                self.min_cohort_size
            )));
        }

        let mut cohort = Cohort::from_eligible(customers)?;
        cohort.dropped = dropped;
        Ok(cohort)
    }
}
