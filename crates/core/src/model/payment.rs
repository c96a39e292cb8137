//! Case-scoped payment ledger events.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::id::{CaseRef, PaymentEventId};

/// A self-reported payment against a case (not a sheet). Drives the
/// "paid to date as of an instant" computation; once any payment events exist
/// for a case they supersede the legacy per-sheet `already_paid_amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub id: PaymentEventId,
    pub case_ref: CaseRef,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub reference: Option<String>,
    pub note: Option<String>,
    /// Soft delete. Deleted events are kept for the audit trail but excluded
    /// from paid-to-date sums.
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl PaymentEvent {
    /// Whether this event counts toward paid-to-date at `as_of`.
    pub fn counts_at(&self, as_of: DateTime<Utc>) -> bool {
        !self.deleted && self.paid_at <= as_of
    }
}
