//! Derived-field engine behind the appraisal price-analysis worksheets.
//!
//! The crate keeps computed cells of a pricing worksheet (weighted scores, adjusted survey
//! values, totals, regression-based final values) consistent with the raw inputs a user edits.
//! Hosts own the form tree; rule-set builders in [`valuation`] describe what to derive and the
//! [`derived`] evaluator keeps those cells in sync until a fixed point is reached.

pub mod config;
pub mod derived;
pub mod error;
pub mod form;
pub mod stats;
pub mod valuation;
