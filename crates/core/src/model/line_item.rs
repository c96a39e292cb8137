//! Line items: expense, adjustment and compensation entries inside a sheet.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::id::{AttachmentId, LineItemId, SheetId};

/// Where a compensation amount originated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompensationSource {
    Settlement,
    Court,
}

/// Line kind as a tagged union so the calculator and validator match
/// exhaustively; adding a kind is a compile-time exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineKind {
    /// A real out-of-pocket expense. The provider is who was paid.
    Expense { provider_name: String },
    /// A manual correction against the requested amount.
    Adjustment,
    /// Money already recovered for the case.
    Compensation { source: CompensationSource },
}

impl LineKind {
    pub fn is_expense(&self) -> bool {
        matches!(self, LineKind::Expense { .. })
    }

    pub fn provider_name(&self) -> Option<&str> {
        match self {
            LineKind::Expense { provider_name } => Some(provider_name),
            LineKind::Adjustment | LineKind::Compensation { .. } => None,
        }
    }
}

/// One entry inside a sheet. Owned exclusively by its sheet; deleting the
/// sheet deletes its line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub sheet_id: SheetId,
    #[serde(flatten)]
    pub kind: LineKind,
    pub description: String,
    /// Free-text expense category used by PARTIAL ruleset matching.
    pub expense_type: Option<String>,
    pub date: Option<NaiveDate>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Percentage, e.g. 17 for 17% VAT.
    pub vat_rate: Decimal,
    /// Whether this line counts toward the requested amount. Defaults to true.
    pub included_in_request: bool,
    /// Stored amounts, recomputed by the store on every edit.
    pub net_amount: Decimal,
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
    /// Mirror of `Attachment::linked_line_item_id`; both sides stay consistent.
    pub attachment_id: Option<AttachmentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LineItem {
    pub fn is_expense(&self) -> bool {
        self.kind.is_expense()
    }
}
