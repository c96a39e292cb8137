//! The validation engine proper.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lexledger_calc::sheet_totals;
use lexledger_core::model::{Attachment, InsurerRuleset, LineItem, LineKind, PolicyFamily, Sheet};
use lexledger_core::{IssueCode, IssueSeverity, ValidationIssue};

use crate::decision::DecisionLog;

/// What the caller is trying to do with the sheet. Mode selects the
/// precondition gates; the per-line and sheet-level content checks run in
/// every mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationMode {
    Draft,
    ReadyForReport,
    AttachToReport,
    Send,
}

/// The immutable fingerprint taken when a report snapshot was produced.
/// Supplied on SEND so silent edits after snapshotting are detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub sheet_version_number: u64,
    pub sheet_version_hash: String,
}

/// Issues plus their summarized decision log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub issues: Vec<ValidationIssue>,
    pub decision_log: DecisionLog,
}

impl ValidationOutcome {
    pub fn passed(&self) -> bool {
        self.decision_log.passed()
    }

    pub fn blocking_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_blocking())
    }
}

/// Validate a sheet snapshot for the given mode.
///
/// Pure function of its inputs; `now` is passed in so future-date checks and
/// the decision log timestamp are reproducible. Never panics, never errors:
/// every finding is an issue in the returned outcome.
pub fn validate(
    mode: ValidationMode,
    sheet: &Sheet,
    lines: &[LineItem],
    attachments: &[Attachment],
    ruleset: Option<&InsurerRuleset>,
    prior_snapshot: Option<&ReportSnapshot>,
    now: DateTime<Utc>,
) -> ValidationOutcome {
    let mut issues = Vec::new();

    for line in lines {
        check_line(line, now, &mut issues);
    }
    check_info_only(sheet, lines, &mut issues);
    if let Some(ruleset) = ruleset {
        check_attachment_policy(ruleset, lines, attachments, &mut issues);
    }
    check_mode_preconditions(mode, sheet, prior_snapshot, &mut issues);

    let decision_log = DecisionLog::from_issues(mode, &issues, ruleset, now);
    ValidationOutcome {
        issues,
        decision_log,
    }
}

fn check_line(line: &LineItem, now: DateTime<Utc>, issues: &mut Vec<ValidationIssue>) {
    if line.description.trim().is_empty() {
        issues.push(ValidationIssue::line(
            IssueCode::MissingDescription,
            IssueSeverity::Error,
            line.id,
            "line item has no description",
        ));
    }

    match &line.kind {
        LineKind::Expense { provider_name } => {
            if provider_name.trim().is_empty() {
                issues.push(ValidationIssue::line(
                    IssueCode::MissingProviderName,
                    IssueSeverity::Error,
                    line.id,
                    "expense line has no provider name",
                ));
            }
        }
        LineKind::Adjustment | LineKind::Compensation { .. } => {}
    }

    if let Some(date) = line.date {
        if date > now.date_naive() {
            issues.push(ValidationIssue::line(
                IssueCode::InvalidDateFuture,
                IssueSeverity::Warning,
                line.id,
                format!("line is dated in the future ({date})"),
            ));
        }
    }

    if line.quantity <= Decimal::ZERO {
        issues.push(ValidationIssue::line(
            IssueCode::InvalidQuantity,
            IssueSeverity::Error,
            line.id,
            "quantity must be positive",
        ));
    }
    if line.unit_price < Decimal::ZERO {
        issues.push(ValidationIssue::line(
            IssueCode::NegativeUnitPrice,
            IssueSeverity::Error,
            line.id,
            "unit price must not be negative",
        ));
    }
    if line.vat_rate < Decimal::ZERO {
        issues.push(ValidationIssue::line(
            IssueCode::NegativeVatRate,
            IssueSeverity::Error,
            line.id,
            "VAT rate must not be negative",
        ));
    }
    if line.net_amount < Decimal::ZERO
        || line.vat_amount < Decimal::ZERO
        || line.total_amount < Decimal::ZERO
    {
        issues.push(ValidationIssue::line(
            IssueCode::NegativeStoredAmount,
            IssueSeverity::Error,
            line.id,
            "stored line amounts must not be negative",
        ));
    }
}

/// An info-only sheet must not carry a positive would-be request. The clamp in
/// the calculator already forces `amount_to_request` to zero; the check looks
/// at what the request would have been without the flag.
fn check_info_only(sheet: &Sheet, lines: &[LineItem], issues: &mut Vec<ValidationIssue>) {
    if !sheet.info_only {
        return;
    }
    let totals = sheet_totals(sheet, lines);
    if totals.amount_before_info_only.max(Decimal::ZERO) > Decimal::ZERO {
        issues.push(ValidationIssue::sheet(
            IssueCode::InfoOnlyInconsistent,
            IssueSeverity::Error,
            format!(
                "info-only sheet would request {} before the flag",
                totals.amount_before_info_only
            ),
        ));
    }
}

fn check_attachment_policy(
    ruleset: &InsurerRuleset,
    lines: &[LineItem],
    attachments: &[Attachment],
    issues: &mut Vec<ValidationIssue>,
) {
    for line in lines {
        if !line.included_in_request || !line.is_expense() {
            continue;
        }

        let required = match ruleset.policy_family {
            // No threshold configured means the insurer always wants evidence.
            PolicyFamily::Strict | PolicyFamily::Flexible => {
                ruleset.over_threshold(line.total_amount)
            }
            PolicyFamily::Partial => {
                ruleset.requires_expense_type(line.expense_type.as_deref())
                    || ruleset
                        .amount_threshold
                        .is_some_and(|t| line.total_amount >= t)
            }
        };
        if !required {
            continue;
        }

        let has_attachment = line.attachment_id.is_some()
            || attachments
                .iter()
                .any(|a| a.linked_line_item_id == Some(line.id));
        if has_attachment {
            continue;
        }

        let severity = match ruleset.policy_family {
            PolicyFamily::Flexible => IssueSeverity::Warning,
            PolicyFamily::Strict | PolicyFamily::Partial => IssueSeverity::Error,
        };
        issues.push(ValidationIssue::line(
            IssueCode::MissingAttachmentRequired,
            severity,
            line.id,
            format!(
                "insurer policy {:?} requires an attachment for this expense",
                ruleset.policy_family
            ),
        ));
    }
}

fn check_mode_preconditions(
    mode: ValidationMode,
    sheet: &Sheet,
    prior_snapshot: Option<&ReportSnapshot>,
    issues: &mut Vec<ValidationIssue>,
) {
    use lexledger_core::model::SheetStatus;

    match mode {
        ValidationMode::Draft => {}
        ValidationMode::ReadyForReport => {
            if sheet.status != SheetStatus::ReadyForReport {
                issues.push(ValidationIssue::sheet(
                    IssueCode::SheetStatusInvalidForReady,
                    IssueSeverity::Error,
                    format!("sheet is {:?}, expected READY_FOR_REPORT", sheet.status),
                ));
            }
        }
        ValidationMode::AttachToReport => {
            if !sheet.can_attach_to_report() {
                issues.push(ValidationIssue::sheet(
                    IssueCode::SheetStatusInvalidForAttach,
                    IssueSeverity::Error,
                    format!("sheet is {:?}, cannot attach to a report", sheet.status),
                ));
            }
        }
        ValidationMode::Send => {
            if sheet.status != SheetStatus::AttachedToReport {
                issues.push(ValidationIssue::sheet(
                    IssueCode::SheetStatusInvalidForSend,
                    IssueSeverity::Error,
                    format!("sheet is {:?}, expected ATTACHED_TO_REPORT", sheet.status),
                ));
            }
            if let Some(snapshot) = prior_snapshot {
                if snapshot.sheet_version_hash != sheet.sheet_version_hash {
                    issues.push(ValidationIssue::sheet(
                        IssueCode::SnapshotHashMismatch,
                        IssueSeverity::Error,
                        "sheet content changed after the report snapshot was taken",
                    ));
                }
            }
        }
    }
}
