//! Decision log: the structured summary of one validation run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lexledger_core::model::InsurerRuleset;
use lexledger_core::{IssueCode, RulesetId, ValidationIssue};

use crate::engine::ValidationMode;

/// Pass/fail booleans per check topic. A boolean flips to false only on an
/// ERROR for that topic; warnings never flip a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionChecks {
    pub sums_valid: bool,
    pub attachments_ok: bool,
    pub required_fields_ok: bool,
    pub info_only_consistent: bool,
}

impl Default for DecisionChecks {
    fn default() -> Self {
        Self {
            sums_valid: true,
            attachments_ok: true,
            required_fields_ok: true,
            info_only_consistent: true,
        }
    }
}

/// Deterministic summary of a validation run, persisted inside the ready
/// attempt audit entry whether the attempt succeeded or failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionLog {
    pub evaluated_at: DateTime<Utc>,
    pub mode: ValidationMode,
    pub insurer: Option<String>,
    pub ruleset_id: Option<RulesetId>,
    pub ruleset_version: Option<u32>,
    pub checks: DecisionChecks,
    pub blocking_issue_codes: Vec<IssueCode>,
    pub warning_issue_codes: Vec<IssueCode>,
}

impl DecisionLog {
    /// Derive the log from an issue list. Same issues in, same log out,
    /// regardless of issue order within a severity.
    pub fn from_issues(
        mode: ValidationMode,
        issues: &[ValidationIssue],
        ruleset: Option<&InsurerRuleset>,
        evaluated_at: DateTime<Utc>,
    ) -> Self {
        let mut checks = DecisionChecks::default();
        let mut blocking = Vec::new();
        let mut warnings = Vec::new();

        for issue in issues {
            if issue.is_blocking() {
                if !blocking.contains(&issue.code) {
                    blocking.push(issue.code);
                }
                match issue.code {
                    IssueCode::MissingProviderName | IssueCode::MissingDescription => {
                        checks.required_fields_ok = false;
                    }
                    IssueCode::InvalidQuantity
                    | IssueCode::NegativeUnitPrice
                    | IssueCode::NegativeVatRate
                    | IssueCode::NegativeStoredAmount => {
                        checks.sums_valid = false;
                    }
                    IssueCode::MissingAttachmentRequired => {
                        checks.attachments_ok = false;
                    }
                    IssueCode::InfoOnlyInconsistent => {
                        checks.info_only_consistent = false;
                    }
                    // Status/snapshot gates block the transition but do not
                    // belong to any content check topic.
                    IssueCode::InvalidDateFuture
                    | IssueCode::SheetStatusInvalidForReady
                    | IssueCode::SheetStatusInvalidForAttach
                    | IssueCode::SheetStatusInvalidForSend
                    | IssueCode::SnapshotHashMismatch
                    | IssueCode::SheetNotEditable
                    | IssueCode::AttachmentLinkInvalid => {}
                }
            } else if !warnings.contains(&issue.code) {
                warnings.push(issue.code);
            }
        }

        Self {
            evaluated_at,
            mode,
            insurer: ruleset.map(|r| r.insurer.clone()),
            ruleset_id: ruleset.map(|r| r.id),
            ruleset_version: ruleset.map(|r| r.version),
            checks,
            blocking_issue_codes: blocking,
            warning_issue_codes: warnings,
        }
    }

    pub fn passed(&self) -> bool {
        self.blocking_issue_codes.is_empty()
    }
}
