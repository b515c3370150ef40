//! Purchase and spend models for customer lifetime value.
//!
//! - [`bg_nbd`]: BG/NBD model of how many purchases a customer will make
//! - [`gamma_gamma`]: Gamma-Gamma model of how much each purchase is worth
//! - [`lifetime_value`]: combines both into a discounted value over a horizon
//! - [`simulate`]: draws synthetic transaction logs from the same generative
//!   process
//!
//! Both fitters minimize a penalized negative log-likelihood with the
//! Nelder–Mead method in [`optimizer`].
//!
//! # Example
//!
//! ```
//! use cltv_models::{
//!     bg_nbd::{BgNbdModel, BgNbdParams},
//!     gamma_gamma::{GammaGammaModel, GammaGammaParams},
//! };
//!
//! let bg = BgNbdModel::from_params(BgNbdParams { r: 0.243, alpha: 4.414, a: 0.793, b: 2.426 })?;
//! let week = bg.predict(1.0, 5, 30.0, 38.0);
//! let month = bg.predict(4.0, 5, 30.0, 38.0);
//! assert!(month >= week && week > 0.0);
//!
//! let gg = GammaGammaModel::from_params(GammaGammaParams { p: 6.25, q: 3.74, v: 15.44 })?;
//! assert!(gg.conditional_expected_average_profit(5, 40.0)? > 0.0);
//! # Ok::<(), cltv_core::CltvError>(())
//! ```

pub mod bg_nbd;
pub mod gamma_gamma;
pub mod lifetime_value;
pub mod optimizer;
pub mod simulate;
