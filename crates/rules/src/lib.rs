//! `lexledger-rules` — the rule/validation engine.
//!
//! Evaluates structural correctness and insurer policy against a
//! sheet+lines+attachments snapshot. Idempotent and side-effect free: it
//! always returns a result object, even when every check fails. Expected
//! business-rule violations are issues, not errors.

pub mod decision;
pub mod engine;

pub use decision::{DecisionChecks, DecisionLog};
pub use engine::{ReportSnapshot, ValidationMode, ValidationOutcome, validate};
