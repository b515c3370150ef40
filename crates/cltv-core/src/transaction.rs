use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Customer identifier as found in the `Customer ID` column.
pub type CustomerId = u64;

/// Invoice prefix marking a return or cancellation.
pub const RETURN_MARKER: char = 'C';

/// Columns of the transaction table.
///
/// The header names are a contract with the input files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransactionColumn {
    Invoice,
    StockCode,
    Description,
    Quantity,
    InvoiceDate,
    Price,
    CustomerId,
    Country,
}

impl TransactionColumn {
    pub const ALL: [Self; 8] = [
        Self::Invoice,
        Self::StockCode,
        Self::Description,
        Self::Quantity,
        Self::InvoiceDate,
        Self::Price,
        Self::CustomerId,
        Self::Country,
    ];

    /// Columns a row must have to survive cleaning.
    pub const MANDATORY: [Self; 5] = [
        Self::CustomerId,
        Self::InvoiceDate,
        Self::Invoice,
        Self::Quantity,
        Self::Price,
    ];

    /// Header name of the column in input files.
    #[must_use]
    pub const fn header(self) -> &'static str {
        match self {
            Self::Invoice => "Invoice",
            Self::StockCode => "StockCode",
            Self::Description => "Description",
            Self::Quantity => "Quantity",
            Self::InvoiceDate => "InvoiceDate",
            Self::Price => "Price",
            Self::CustomerId => "Customer ID",
            Self::Country => "Country",
        }
    }
}

/// One line item as read from the sales log, before any validation.
///
/// Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub invoice: Option<String>,
    pub stock_code: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub invoice_date: Option<NaiveDateTime>,
    pub price: Option<f64>,
    pub customer_id: Option<CustomerId>,
    pub country: Option<String>,
}

impl RawTransaction {
    /// Builds a row with every mandatory field present and the descriptive
    /// fields left empty.
    #[must_use]
    pub fn new(
        invoice: impl Into<String>,
        quantity: i64,
        invoice_date: NaiveDateTime,
        price: f64,
        customer_id: CustomerId,
    ) -> Self {
        Self {
            invoice: Some(invoice.into()),
            quantity: Some(quantity),
            invoice_date: Some(invoice_date),
            price: Some(price),
            customer_id: Some(customer_id),
            ..Self::default()
        }
    }

    /// Returns the first mandatory column that is missing, if any.
    ///
    /// A non-finite price counts as missing.
    #[must_use]
    pub fn missing_mandatory(&self) -> Option<TransactionColumn> {
        TransactionColumn::MANDATORY
            .into_iter()
            .find(|column| match column {
                TransactionColumn::CustomerId => self.customer_id.is_none(),
                TransactionColumn::InvoiceDate => self.invoice_date.is_none(),
                TransactionColumn::Invoice => self.invoice.is_none(),
                TransactionColumn::Quantity => self.quantity.is_none(),
                TransactionColumn::Price => !self.price.is_some_and(f64::is_finite),
                _ => false,
            })
    }

    /// Whether the invoice carries the return marker.
    #[must_use]
    pub fn is_return(&self) -> bool {
        self.invoice
            .as_deref()
            .is_some_and(|invoice| invoice.contains(RETURN_MARKER))
    }
}

/// A validated line item.
///
/// `quantity` is real-valued because winsorization may move it onto a
/// fractional bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub invoice: String,
    pub stock_code: Option<String>,
    pub description: Option<String>,
    pub quantity: f64,
    pub invoice_date: NaiveDateTime,
    pub price: f64,
    pub customer_id: CustomerId,
    pub country: Option<String>,
}

impl Transaction {
    /// Converts a raw row whose mandatory fields are all present.
    ///
    /// Returns `None` if any mandatory field is missing.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_raw(raw: &RawTransaction) -> Option<Self> {
        if raw.missing_mandatory().is_some() {
            return None;
        }
        Some(Self {
            invoice: raw.invoice.clone()?,
            stock_code: raw.stock_code.clone(),
            description: raw.description.clone(),
            quantity: raw.quantity? as f64,
            invoice_date: raw.invoice_date?,
            price: raw.price?,
            customer_id: raw.customer_id?,
            country: raw.country.clone(),
        })
    }

    /// Line total, `quantity * price`.
    #[must_use]
    pub fn total_price(&self) -> f64 {
        self.quantity * self.price
    }
}
