//! Insurer-specific attachment policy, read-only input to validation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::id::RulesetId;

/// How strictly an insurer demands evidentiary attachments.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyFamily {
    /// Attachment required on every included expense at/above the threshold
    /// (no threshold set means always).
    Strict,
    /// Attachment required when the expense type is listed or the amount is
    /// at/above the threshold.
    Partial,
    /// Same trigger as STRICT but advisory only (WARNING, non-blocking).
    Flexible,
}

/// Per-insurer validation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsurerRuleset {
    pub id: RulesetId,
    pub insurer: String,
    pub version: u32,
    pub policy_family: PolicyFamily,
    /// Document categories the insurer expects on a sheet.
    pub required_attachment_types: Vec<String>,
    /// Expense types that always need an attachment under PARTIAL.
    pub required_expense_types: Vec<String>,
    /// Line amount at/above which an attachment is mandatory.
    pub amount_threshold: Option<Decimal>,
}

impl InsurerRuleset {
    pub fn requires_expense_type(&self, expense_type: Option<&str>) -> bool {
        match expense_type {
            Some(t) => self
                .required_expense_types
                .iter()
                .any(|required| required.eq_ignore_ascii_case(t)),
            None => false,
        }
    }

    pub fn over_threshold(&self, amount: Decimal) -> bool {
        match self.amount_threshold {
            Some(threshold) => amount >= threshold,
            None => true,
        }
    }
}
