//! Expense sheet: one versioned expense declaration for a case/insurer/period.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::id::{CaseRef, ReportId, SheetId, UserId};

/// Sheet lifecycle status.
///
/// Transitions are explicit store operations, never side effects of field
/// edits: DRAFT → READY_FOR_REPORT (after a successful ready attempt),
/// READY_FOR_REPORT → DRAFT (revert), READY/ATTACHED → ATTACHED_TO_REPORT
/// (link to report).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SheetStatus {
    Draft,
    ReadyForReport,
    AttachedToReport,
    Archived,
}

/// Why an archived/attached sheet left active circulation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchivedReason {
    UsedInReport,
    Cancelled,
    Superseded,
}

/// One versioned expense declaration (a "report round") for a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub id: SheetId,
    pub case_ref: CaseRef,
    pub insurer: String,
    pub period_label: String,
    /// Sequential per case: each new report round for the same case gets the
    /// next index.
    pub version_index: u32,
    pub status: SheetStatus,
    pub archived_reason: Option<ArchivedReason>,
    /// Single currency per sheet (ISO code).
    pub currency: String,
    pub deductible_amount: Decimal,
    /// Legacy fallback; superseded by the payment ledger once any payment
    /// events exist for the case.
    pub already_paid_amount: Decimal,
    /// Forces the requested amount to zero regardless of computed totals.
    pub info_only: bool,
    pub attached_report_id: Option<ReportId>,
    /// Monotonic per mutation; the optimistic-concurrency token.
    pub sheet_version_number: u64,
    /// Content-derived fingerprint of sheet fields + line items + attachments.
    /// Must always match a recomputation over current state; drift is a
    /// data-corruption signal.
    pub sheet_version_hash: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub attached_at: Option<DateTime<Utc>>,
}

impl Sheet {
    pub fn is_draft(&self) -> bool {
        self.status == SheetStatus::Draft
    }

    /// Line items and attachments may only be edited while the sheet is DRAFT.
    pub fn is_mutable(&self) -> bool {
        self.is_draft()
    }

    pub fn can_revert_to_draft(&self) -> bool {
        self.status == SheetStatus::ReadyForReport
    }

    pub fn can_attach_to_report(&self) -> bool {
        matches!(
            self.status,
            SheetStatus::ReadyForReport | SheetStatus::AttachedToReport
        )
    }
}
