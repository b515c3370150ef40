//! Transaction rows and the data-preparation stages of the CLTV pipeline.
//!
//! # Stages
//!
//! 1. **Cleaner** ([`cleaner::Cleaner`]): drops incomplete rows, returns and
//!    non-positive quantities, then winsorizes `Quantity` and `Price`
//! 2. **Summarizer** ([`summary::summarize`]): folds transactions into one
//!    `(recency, T, frequency, monetary)` row per customer
//! 3. **Cohort Filter** ([`summary::CohortFilter`]): keeps customers the
//!    models can be fitted on
//!
//! Every stage is a pure function of its input and returns a new collection.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use cltv_core::{
//!     cleaner::Cleaner,
//!     summary::{CohortFilter, summarize},
//!     transaction::RawTransaction,
//! };
//!
//! let day = |d| NaiveDate::from_ymd_opt(2011, 3, d).unwrap().and_hms_opt(10, 0, 0).unwrap();
//! let rows = vec![
//!     RawTransaction::new("536365", 2, day(1), 5.0, 17850),
//!     RawTransaction::new("536366", 6, day(29), 5.0, 17850),
//!     RawTransaction::new("536367", 1, day(2), 3.0, 13047),
//! ];
//!
//! let cleaned = Cleaner::default().clean(&rows)?;
//! let anchor = day(30);
//! let summaries = summarize(cleaned.transactions(), anchor)?;
//! assert_eq!(summaries.len(), 2);
//!
//! let cohort = CohortFilter::new(1).filter(summaries)?;
//! assert_eq!(cohort.customers().len(), 1);
//! assert_eq!(cohort.customers()[0].frequency, 2);
//! assert_eq!(cohort.customers()[0].recency, 4.0);
//! # Ok::<(), cltv_core::CltvError>(())
//! ```

pub mod cleaner;
pub mod summary;
pub mod transaction;

/// Errors raised by the CLTV pipeline.
///
/// None of these are recovered locally; they surface to the caller.
#[derive(
    Debug, Clone, PartialEq, derive_more::Display, derive_more::Error, derive_more::IsVariant,
)]
pub enum CltvError {
    /// Required columns are missing or hold values of the wrong type.
    #[display("schema error: {message}")]
    Schema { message: String },
    /// Too few rows or customers survived cleaning and filtering.
    #[display("insufficient data: {message}")]
    InsufficientData { message: String },
    /// The likelihood optimizer did not converge or produced non-finite
    /// parameters. Retrying with a larger penalizer may help.
    #[display("model fit failure: {message}")]
    ModelFitFailure { message: String },
    /// A per-row invariant was violated; indicates a bug in an earlier stage.
    #[display("domain error: {message}")]
    Domain { message: String },
}

impl CltvError {
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn insufficient_data(message: impl Into<String>) -> Self {
        Self::InsufficientData {
            message: message.into(),
        }
    }

    pub fn model_fit_failure(message: impl Into<String>) -> Self {
        Self::ModelFitFailure {
            message: message.into(),
        }
    }

    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain {
            message: message.into(),
        }
    }
}
