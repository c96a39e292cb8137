//! `lexledger-calc` — the monetary calculator.
//!
//! Pure, infallible fixed-point decimal arithmetic for line and sheet totals.
//! Both the rule engine and the historical aggregator call through here, so
//! the two can never diverge on a number.

pub mod totals;

pub use totals::{SheetTotals, line_amounts, line_net, line_total, line_vat, round2, sheet_totals};
