//! Validation issue vocabulary shared by the rule engine, the store and the
//! outbound views.

use serde::{Deserialize, Serialize};

/// Stable issue code surfaced to consumers and recorded in decision logs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    MissingProviderName,
    MissingDescription,
    InvalidDateFuture,
    InvalidQuantity,
    NegativeUnitPrice,
    NegativeVatRate,
    NegativeStoredAmount,
    InfoOnlyInconsistent,
    MissingAttachmentRequired,
    SheetStatusInvalidForReady,
    SheetStatusInvalidForAttach,
    SheetStatusInvalidForSend,
    SnapshotHashMismatch,
    SheetNotEditable,
    AttachmentLinkInvalid,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::MissingProviderName => "MISSING_PROVIDER_NAME",
            IssueCode::MissingDescription => "MISSING_DESCRIPTION",
            IssueCode::InvalidDateFuture => "INVALID_DATE_FUTURE",
            IssueCode::InvalidQuantity => "INVALID_QUANTITY",
            IssueCode::NegativeUnitPrice => "NEGATIVE_UNIT_PRICE",
            IssueCode::NegativeVatRate => "NEGATIVE_VAT_RATE",
            IssueCode::NegativeStoredAmount => "NEGATIVE_STORED_AMOUNT",
            IssueCode::InfoOnlyInconsistent => "INFO_ONLY_INCONSISTENT",
            IssueCode::MissingAttachmentRequired => "MISSING_ATTACHMENT_REQUIRED",
            IssueCode::SheetStatusInvalidForReady => "SHEET_STATUS_INVALID_FOR_READY",
            IssueCode::SheetStatusInvalidForAttach => "SHEET_STATUS_INVALID_FOR_ATTACH",
            IssueCode::SheetStatusInvalidForSend => "SHEET_STATUS_INVALID_FOR_SEND",
            IssueCode::SnapshotHashMismatch => "SNAPSHOT_HASH_MISMATCH",
            IssueCode::SheetNotEditable => "SHEET_NOT_EDITABLE",
            IssueCode::AttachmentLinkInvalid => "ATTACHMENT_LINK_INVALID",
        }
    }
}

impl core::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue severity. Consumers render `Error` as a hard stop; `Warning` and
/// `Info` are advisories that never block progress.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

/// Which entity an issue is about.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueScope {
    Sheet,
    LineItem,
    Attachment,
}

/// One typed finding from a validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub severity: IssueSeverity,
    pub scope: IssueScope,
    /// Id of the affected line item/attachment; absent for sheet-level issues.
    pub entity_id: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn sheet(code: IssueCode, severity: IssueSeverity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            scope: IssueScope::Sheet,
            entity_id: None,
            message: message.into(),
        }
    }

    pub fn line(
        code: IssueCode,
        severity: IssueSeverity,
        line_id: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            severity,
            scope: IssueScope::LineItem,
            entity_id: Some(line_id.to_string()),
            message: message.into(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == IssueSeverity::Error
    }
}
