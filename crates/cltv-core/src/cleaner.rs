//! Row filtering and outlier treatment for raw transactions
//!
//! # Cleaning steps
//!
//! In order:
//!
//! 1. Drop rows missing any of `Customer ID`, `InvoiceDate`, `Invoice`,
//!    `Quantity`, `Price`
//! 2. Drop rows whose invoice contains the return marker `C`
//! 3. Drop rows with `Quantity <= 0`
//! 4. Winsorize `Quantity` and `Price` independently
//! 5. Expose `TotalPrice` as [`Transaction::total_price`]
//!
//! # Winsorization
//!
//! Bounds come from the 1st and 99th percentiles rather than the quartiles,
//! since retail quantities and prices have long tails:
//!
//! ```text
//! iqr = q99 - q01
//! lo  = q01 - 1.5 * iqr
//! hi  = q99 + 1.5 * iqr
//! ```
//!
//! Values below `lo` become `lo`, values above `hi` become `hi`.

use cltv_stats::percentiles::compute_quantile;
use serde::{Deserialize, Serialize};

use crate::{
    CltvError,
    transaction::{RawTransaction, Transaction},
};

/// Quantile levels and multiplier used to derive winsorization bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WinsorizeParams {
    pub lower_quantile: f64,
    pub upper_quantile: f64,
    pub iqr_multiplier: f64,
}

impl Default for WinsorizeParams {
    fn default() -> Self {
        Self {
            lower_quantile: 0.01,
            upper_quantile: 0.99,
            iqr_multiplier: 1.5,
        }
    }
}

/// Lower and upper clipping bounds for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierThresholds {
    pub low: f64,
    pub high: f64,
}

impl OutlierThresholds {
    /// Derives bounds from the values of a column.
    ///
    /// Returns `None` for an empty column.
    ///
    /// ```
    /// use cltv_core::cleaner::{OutlierThresholds, WinsorizeParams};
    ///
    /// let values = [1.0, 2.0, 3.0, 4.0, 5.0];
    /// let t = OutlierThresholds::from_values(&values, &WinsorizeParams::default()).unwrap();
    /// // q01 = 1.04, q99 = 4.96, iqr = 3.92
    /// assert!((t.low - (1.04 - 1.5 * 3.92)).abs() < 1e-9);
    /// assert!((t.high - (4.96 + 1.5 * 3.92)).abs() < 1e-9);
    /// ```
    #[must_use]
    pub fn from_values(values: &[f64], params: &WinsorizeParams) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let lower = compute_quantile(&sorted, params.lower_quantile);
        let upper = compute_quantile(&sorted, params.upper_quantile);
        let iqr = upper - lower;
        Some(Self {
            low: lower - params.iqr_multiplier * iqr,
            high: upper + params.iqr_multiplier * iqr,
        })
    }

    #[must_use]
    pub fn clip(&self, value: f64) -> f64 {
        if value < self.low {
            self.low
        } else if value > self.high {
            self.high
        } else {
            value
        }
    }
}

/// Numeric column that can be winsorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinsorizeColumn {
    Quantity,
    Price,
}

impl WinsorizeColumn {
    fn get(self, tx: &Transaction) -> f64 {
        match self {
            Self::Quantity => tx.quantity,
            Self::Price => tx.price,
        }
    }

    fn set(self, tx: &mut Transaction, value: f64) {
        match self {
            Self::Quantity => tx.quantity = value,
            Self::Price => tx.price = value,
        }
    }
}

/// Result of winsorizing one column.
#[derive(Debug, Clone)]
pub struct Winsorized {
    pub transactions: Vec<Transaction>,
    pub thresholds: OutlierThresholds,
    /// Number of values moved onto a bound
    pub clipped: usize,
}

/// Clips `column` of every transaction to bounds derived from that column.
///
/// Works out of place: the input slice is left untouched. Returns `None` for
/// an empty input.
#[must_use]
pub fn winsorize(
    transactions: &[Transaction],
    column: WinsorizeColumn,
    params: &WinsorizeParams,
) -> Option<Winsorized> {
    let values = transactions
        .iter()
        .map(|tx| column.get(tx))
        .collect::<Vec<_>>();
    let thresholds = OutlierThresholds::from_values(&values, params)?;

    let mut clipped = 0;
    let transactions = transactions
        .iter()
        .map(|tx| {
            let value = column.get(tx);
            let bounded = thresholds.clip(value);
            let mut tx = tx.clone();
            if bounded != value {
                clipped += 1;
                column.set(&mut tx, bounded);
            }
            tx
        })
        .collect();

    Some(Winsorized {
        transactions,
        thresholds,
        clipped,
    })
}

/// Row counts and bounds recorded while cleaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub input_rows: usize,
    pub dropped_missing: usize,
    pub dropped_returns: usize,
    pub dropped_non_positive_quantity: usize,
    pub quantity_thresholds: Option<OutlierThresholds>,
    pub price_thresholds: Option<OutlierThresholds>,
    pub clipped_quantity: usize,
    pub clipped_price: usize,
    pub output_rows: usize,
}

/// Cleaned transactions together with the report of what was dropped.
#[derive(Debug, Clone)]
pub struct CleanedTransactions {
    transactions: Vec<Transaction>,
    report: CleaningReport,
}

impl CleanedTransactions {
    #[must_use]
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    #[must_use]
    pub fn report(&self) -> &CleaningReport {
        &self.report
    }

    #[must_use]
    pub fn into_transactions(self) -> Vec<Transaction> {
        self.transactions
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cleaner {
    params: WinsorizeParams,
}

impl Cleaner {
    #[must_use]
    pub fn new(params: WinsorizeParams) -> Self {
        Self { params }
    }

    /// Runs the cleaning steps on `rows`.
    ///
    /// Fails with [`CltvError::InsufficientData`] if no row survives the
    /// filtering steps.
    pub fn clean(&self, rows: &[RawTransaction]) -> Result<CleanedTransactions, CltvError> {
        let mut report = CleaningReport {
            input_rows: rows.len(),
            ..CleaningReport::default()
        };

        let mut transactions = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(tx) = Transaction::from_raw(row) else {
                report.dropped_missing += 1;
                continue;
            };
            if row.is_return() {
                report.dropped_returns += 1;
                continue;
            }
            if tx.quantity <= 0.0 {
                report.dropped_non_positive_quantity += 1;
                continue;
            }
            transactions.push(tx);
        }

        let dropped = report.dropped_missing
            + report.dropped_returns
            + report.dropped_non_positive_quantity;
        if dropped > 0 {
            tracing::warn!(
                dropped,
                missing = report.dropped_missing,
                returns = report.dropped_returns,
                non_positive_quantity = report.dropped_non_positive_quantity,
                "dropped rows while cleaning"
            );
        }

        let Some(quantity) = winsorize(&transactions, WinsorizeColumn::Quantity, &self.params)
        else {
            return Err(CltvError::insufficient_data(format!(
                "no rows left after cleaning {} input rows",
                rows.len()
            )));
        };
        let Some(price) = winsorize(&quantity.transactions, WinsorizeColumn::Price, &self.params)
        else {
            return Err(CltvError::insufficient_data("no rows left to winsorize"));
        };

        report.quantity_thresholds = Some(quantity.thresholds);
        report.price_thresholds = Some(price.thresholds);
        report.clipped_quantity = quantity.clipped;
        report.clipped_price = price.clipped;
        report.output_rows = price.transactions.len();
        tracing::debug!(
            quantity_thresholds = ?quantity.thresholds,
            price_thresholds = ?price.thresholds,
            clipped_quantity = quantity.clipped,
            clipped_price = price.clipped,
            "winsorized quantity and price"
        );

        Ok(CleanedTransactions {
            transactions: price.transactions,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;
    use crate::transaction::RETURN_MARKER;

    fn date(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2011, 1, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn quantity_rows(quantities: &[i64]) -> Vec<RawTransaction> {
        quantities
            .iter()
            .enumerate()
            .map(|(i, &q)| RawTransaction::new(format!("{}", 540_000 + i), q, date(1), 1.0, 1))
            .collect()
    }

    #[test]
    fn test_return_removal() {
        let rows = vec![
            RawTransaction::new("537123", 2, date(3), 5.0, 12345),
            RawTransaction::new("C537123", -2, date(3), 5.0, 12345),
        ];
        let cleaned = Cleaner::default().clean(&rows).unwrap();
        assert_eq!(cleaned.transactions().len(), 1);
        let tx = &cleaned.transactions()[0];
        assert_eq!(tx.invoice, "537123");
        assert_eq!(tx.total_price(), 10.0);
        assert_eq!(cleaned.report().dropped_returns, 1);
    }

    #[test]
    fn test_cleaned_rows_satisfy_invariants() {
        let mut rows = vec![
            RawTransaction::new("1", 3, date(1), 2.0, 10),
            RawTransaction::new("2", 0, date(2), 2.0, 10),
            RawTransaction::new("3", -4, date(3), 2.0, 11),
            RawTransaction::new("C4", 5, date(4), 2.0, 11),
            RawTransaction::new("5", 1, date(5), 4.0, 12),
        ];
        rows.push(RawTransaction {
            customer_id: None,
            ..RawTransaction::new("6", 1, date(6), 1.0, 0)
        });
        rows.push(RawTransaction {
            invoice_date: None,
            ..RawTransaction::new("7", 1, date(6), 1.0, 13)
        });

        let cleaned = Cleaner::default().clean(&rows).unwrap();
        for tx in cleaned.transactions() {
            assert!(tx.quantity > 0.0);
            assert!(!tx.invoice.starts_with(RETURN_MARKER));
        }
        let report = cleaned.report();
        assert_eq!(report.input_rows, 7);
        assert_eq!(report.dropped_missing, 2);
        assert_eq!(report.dropped_returns, 1);
        assert_eq!(report.dropped_non_positive_quantity, 2);
        assert_eq!(report.output_rows, 2);
    }

    #[test]
    fn test_everything_dropped_is_insufficient_data() {
        let rows = vec![RawTransaction::new("C1", -1, date(1), 1.0, 1)];
        let err = Cleaner::default().clean(&rows).unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn test_long_tail_outlier_is_retained() {
        // 48 ones and a single large order. The 99th percentile is pulled
        // towards the outlier, so the upper bound lies above it.
        let mut quantities = vec![1; 48];
        quantities.push(10_000);
        let cleaned = Cleaner::default().clean(&quantity_rows(&quantities)).unwrap();

        let thresholds = cleaned.report().quantity_thresholds.unwrap();
        let q01 = 1.0;
        let q99 = 1.0 + 0.52 * 9_999.0;
        assert!((thresholds.low - (q01 - 1.5 * (q99 - q01))).abs() < 1e-6);
        assert!((thresholds.high - (q99 + 1.5 * (q99 - q01))).abs() < 1e-6);
        assert!(thresholds.high > 10_000.0);
        assert_eq!(cleaned.report().clipped_quantity, 0);
        assert_eq!(cleaned.transactions()[48].quantity, 10_000.0);
    }

    #[test]
    fn test_outlier_beyond_upper_bound_is_clipped() {
        // With 200 ones the 99th percentile is 1, so the bound collapses to 1.
        let mut quantities = vec![1; 200];
        quantities.push(10_000);
        let cleaned = Cleaner::default().clean(&quantity_rows(&quantities)).unwrap();

        let thresholds = cleaned.report().quantity_thresholds.unwrap();
        assert_eq!(thresholds.high, 1.0);
        assert_eq!(cleaned.report().clipped_quantity, 1);
        assert_eq!(cleaned.transactions()[200].quantity, 1.0);
        assert_eq!(cleaned.transactions()[200].total_price(), 1.0);
    }

    #[test]
    fn test_winsorize_is_idempotent() {
        let mut quantities = vec![1; 200];
        quantities.push(10_000);
        quantities.extend([2, 3, 5, 8]);
        let transactions = quantity_rows(&quantities)
            .iter()
            .filter_map(Transaction::from_raw)
            .collect::<Vec<_>>();
        let params = WinsorizeParams::default();

        let once = winsorize(&transactions, WinsorizeColumn::Quantity, &params).unwrap();
        let twice = winsorize(&once.transactions, WinsorizeColumn::Quantity, &params).unwrap();
        assert_eq!(once.transactions, twice.transactions);
        assert_eq!(twice.clipped, 0);
    }

    #[test]
    fn test_winsorize_leaves_input_untouched() {
        let mut quantities = vec![1; 200];
        quantities.push(10_000);
        let transactions = quantity_rows(&quantities)
            .iter()
            .filter_map(Transaction::from_raw)
            .collect::<Vec<_>>();
        let result =
            winsorize(&transactions, WinsorizeColumn::Quantity, &WinsorizeParams::default())
                .unwrap();
        assert_eq!(transactions[200].quantity, 10_000.0);
        assert_eq!(result.transactions[200].quantity, 1.0);
    }

    #[test]
    fn test_empty_winsorize() {
        assert!(winsorize(&[], WinsorizeColumn::Price, &WinsorizeParams::default()).is_none());
    }
}
