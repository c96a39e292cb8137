//! Admin-gated operational KPI views over the ledger.
//!
//! Read-only aggregates for dashboards: SLA durations between status
//! transitions, total requested amount, and exception buckets. Restricted to
//! admin-class roles.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use lexledger_calc::sheet_totals;
use lexledger_core::model::{Sheet, SheetStatus};
use lexledger_core::{Actor, LedgerError, LedgerResult, ReportDirectory, SheetId};
use lexledger_store::LedgerStore;

/// Sheets flagged for operational attention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExceptionBuckets {
    /// Stored version hash no longer matches a recomputation.
    pub hash_divergence: Vec<SheetId>,
    /// Latest ready attempt was blocked on missing attachments.
    pub missing_attachments: Vec<SheetId>,
    /// Requested amount at or above the configured threshold.
    pub high_amounts: Vec<SheetId>,
    /// Repeatedly failed ready attempts.
    pub repeated_blocks: Vec<SheetId>,
}

/// Aggregate dashboard figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialKpis {
    pub sheet_count: usize,
    pub total_requested_amount: Decimal,
    /// Average seconds between transitions; `None` when no sheet completed
    /// the leg yet.
    pub avg_draft_to_ready_secs: Option<i64>,
    pub avg_ready_to_attached_secs: Option<i64>,
    pub avg_attached_to_sent_secs: Option<i64>,
    pub exceptions: ExceptionBuckets,
}

/// One row of the operational sheet list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialSheetListItem {
    pub sheet_id: SheetId,
    pub case_ref: String,
    pub insurer: String,
    pub period_label: String,
    pub status: SheetStatus,
    pub version_index: u32,
    pub amount_to_request: Decimal,
    pub gross_expenses_total: Decimal,
    pub ready_at: Option<DateTime<Utc>>,
    pub attached_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Thresholds for the exception buckets.
#[derive(Debug, Clone, Copy)]
pub struct KpiThresholds {
    pub high_amount: Decimal,
    pub repeated_block_attempts: usize,
}

impl Default for KpiThresholds {
    fn default() -> Self {
        Self {
            high_amount: Decimal::from(10_000),
            repeated_block_attempts: 3,
        }
    }
}

fn require_admin(actor: &Actor, what: &str) -> LedgerResult<()> {
    if actor.role.is_admin_class() {
        Ok(())
    } else {
        Err(LedgerError::permission_denied(format!(
            "{what} requires an admin-class role, actor {} is {:?}",
            actor.name, actor.role
        )))
    }
}

/// Compute the dashboard KPIs over every sheet in the store.
pub fn financial_kpis(
    store: &LedgerStore,
    reports: Option<&dyn ReportDirectory>,
    thresholds: KpiThresholds,
    actor: &Actor,
) -> LedgerResult<FinancialKpis> {
    require_admin(actor, "financial KPI query")?;

    let sheets = store.all_sheets()?;
    let mut total_requested = Decimal::ZERO;
    let mut exceptions = ExceptionBuckets::default();

    let mut draft_to_ready: Vec<i64> = Vec::new();
    let mut ready_to_attached: Vec<i64> = Vec::new();
    let mut attached_to_sent: Vec<i64> = Vec::new();

    for sheet in &sheets {
        let relations = store.sheet_with_relations(sheet.id)?;
        let totals = sheet_totals(&relations.sheet, &relations.line_items);
        total_requested += totals.amount_to_request;

        if totals.amount_to_request >= thresholds.high_amount {
            exceptions.high_amounts.push(sheet.id);
        }
        if let Err(err) = store.verify_sheet_integrity(sheet.id) {
            warn!(sheet_id = %sheet.id, %err, "sheet excluded as hash-divergent");
            exceptions.hash_divergence.push(sheet.id);
        }

        if let Some(ready_at) = sheet.ready_at {
            draft_to_ready.push((ready_at - sheet.created_at).num_seconds());
        }
        if let (Some(ready_at), Some(attached_at)) = (sheet.ready_at, sheet.attached_at) {
            ready_to_attached.push((attached_at - ready_at).num_seconds());
        }
        if let (Some(attached_at), Some(sent_at)) = (sheet.attached_at, sent_at(sheet, reports)) {
            attached_to_sent.push((sent_at - attached_at).num_seconds());
        }
    }

    classify_ready_attempts(store, thresholds.repeated_block_attempts, &mut exceptions)?;

    Ok(FinancialKpis {
        sheet_count: sheets.len(),
        total_requested_amount: total_requested,
        avg_draft_to_ready_secs: average(&draft_to_ready),
        avg_ready_to_attached_secs: average(&ready_to_attached),
        avg_attached_to_sent_secs: average(&attached_to_sent),
        exceptions,
    })
}

/// Per-sheet rows for the operational list view.
pub fn sheet_list(
    store: &LedgerStore,
    reports: Option<&dyn ReportDirectory>,
    actor: &Actor,
) -> LedgerResult<Vec<FinancialSheetListItem>> {
    require_admin(actor, "financial sheet list")?;

    let mut items = Vec::new();
    for sheet in store.all_sheets()? {
        let relations = store.sheet_with_relations(sheet.id)?;
        let totals = sheet_totals(&relations.sheet, &relations.line_items);
        items.push(FinancialSheetListItem {
            sheet_id: sheet.id,
            case_ref: sheet.case_ref.as_str().to_string(),
            insurer: sheet.insurer.clone(),
            period_label: sheet.period_label.clone(),
            status: sheet.status,
            version_index: sheet.version_index,
            amount_to_request: totals.amount_to_request,
            gross_expenses_total: totals.gross_expenses_total,
            ready_at: sheet.ready_at,
            attached_at: sheet.attached_at,
            sent_at: sent_at(&sheet, reports),
        });
    }
    Ok(items)
}

fn sent_at(sheet: &Sheet, reports: Option<&dyn ReportDirectory>) -> Option<DateTime<Utc>> {
    let report_id = sheet.attached_report_id?;
    reports?.report_status(report_id)?.sent_at
}

/// Walk ready attempt audit entries: bucket sheets whose latest attempt was
/// blocked on attachments, and sheets with repeated failed attempts.
fn classify_ready_attempts(
    store: &LedgerStore,
    repeated_threshold: usize,
    exceptions: &mut ExceptionBuckets,
) -> LedgerResult<()> {
    use std::collections::HashMap;

    let mut failures: HashMap<SheetId, usize> = HashMap::new();
    let mut latest_blocked_on_attachments: HashMap<SheetId, bool> = HashMap::new();

    for event in store.audit_log()? {
        if event.event_type != "sheet.ready_attempt" {
            continue;
        }
        let Some(sheet_id) = event.sheet_id else {
            continue;
        };
        let success = event.payload["success"].as_bool().unwrap_or(false);
        if !success {
            *failures.entry(sheet_id).or_default() += 1;
        }
        let blocked_on_attachments = event.payload["decision_log"]["blocking_issue_codes"]
            .as_array()
            .map(|codes| {
                codes
                    .iter()
                    .any(|c| c.as_str() == Some("MISSING_ATTACHMENT_REQUIRED"))
            })
            .unwrap_or(false);
        // Audit entries arrive in append order; the last one wins.
        latest_blocked_on_attachments.insert(sheet_id, blocked_on_attachments);
    }

    for (sheet_id, blocked) in latest_blocked_on_attachments {
        if blocked && store.sheet(sheet_id).is_ok() {
            exceptions.missing_attachments.push(sheet_id);
        }
    }
    for (sheet_id, count) in failures {
        if count >= repeated_threshold && store.sheet(sheet_id).is_ok() {
            exceptions.repeated_blocks.push(sheet_id);
        }
    }
    exceptions.missing_attachments.sort_by_key(|id| id.to_string());
    exceptions.repeated_blocks.sort_by_key(|id| id.to_string());
    Ok(())
}

fn average(samples: &[i64]) -> Option<i64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<i64>() / samples.len() as i64)
    }
}
