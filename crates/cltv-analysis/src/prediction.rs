use cltv_core::transaction::CustomerId;
use serde::{Deserialize, Serialize};

/// One row of the output table.
///
/// Field order is the column order of the written table. `recency` and `T`
/// are in weeks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerPrediction {
    #[serde(rename = "Customer ID")]
    pub customer_id: CustomerId,
    pub recency: f64,
    #[serde(rename = "T")]
    pub t: f64,
    pub frequency: u32,
    pub monetary: f64,
    pub expected_purc_1_week: f64,
    pub expected_purc_1_month: f64,
    pub expected_average_profit: f64,
    pub clv: f64,
    pub scaled_clv: f64,
    pub segment: String,
}

impl CustomerPrediction {
    /// Names of the columns aggregated per segment.
    pub const NUMERIC_COLUMNS: [&'static str; 9] = [
        "recency",
        "T",
        "frequency",
        "monetary",
        "expected_purc_1_week",
        "expected_purc_1_month",
        "expected_average_profit",
        "clv",
        "scaled_clv",
    ];

    /// Values of [`Self::NUMERIC_COLUMNS`], in the same order.
    #[must_use]
    pub fn numeric_values(&self) -> [f64; 9] {
        [
            self.recency,
            self.t,
            f64::from(self.frequency),
            self.monetary,
            self.expected_purc_1_week,
            self.expected_purc_1_month,
            self.expected_average_profit,
            self.clv,
            self.scaled_clv,
        ]
    }

}
