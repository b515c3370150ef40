//! Customer lifetime value analysis: configuration, the end-to-end pipeline
//! and value-based segmentation.
//!
//! # Example
//!
//! ```no_run
//! use cltv_analysis::{config::PipelineConfig, pipeline::Pipeline};
//! use cltv_core::transaction::RawTransaction;
//!
//! let rows: Vec<RawTransaction> = todo!();
//! let report = Pipeline::new(PipelineConfig::default())?.run(&rows)?;
//! for customer in report.analysis.top_customers(10) {
//!     println!("{} {:.2} {}", customer.customer_id, customer.clv, customer.segment);
//! }
//! # Ok::<(), cltv_core::CltvError>(())
//! ```

pub mod config;
pub mod pipeline;
pub mod prediction;
pub mod segmentation;
