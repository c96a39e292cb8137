//! Cumulative point-in-time snapshots across a case's report rounds.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use lexledger_core::model::{LineItem, LineKind, Sheet};
use lexledger_core::{LedgerError, LedgerResult, SheetId};
use lexledger_store::LedgerStore;

/// Presentation hints for the report-rendering collaborator. Rendering only;
/// no amounts are recomputed downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderOptions {
    pub as_of: DateTime<Utc>,
    pub include_historical: bool,
    pub historical_sheet_count: usize,
}

/// The merged, time-bounded view of a case's expense history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeSnapshot {
    /// The requested sheet with `already_paid_amount` overridden by the
    /// payment-ledger paid-to-date (when the case has any payment events).
    pub effective_sheet: Sheet,
    pub current_lines: Vec<LineItem>,
    pub historical_lines: Vec<LineItem>,
    /// Current + historical, in the stable total order.
    pub all_lines: Vec<LineItem>,
    pub render_options: RenderOptions,
}

/// Build the cumulative snapshot for a sheet as of an instant.
///
/// Historical sheets are every *other* sheet of the same (normalized) case
/// whose `updated_at` is at or before `as_of`; only their EXPENSE lines merge
/// in — adjustments and compensations belong to one sheet's request only.
/// The merged set is sorted by a stable total order (line date, falling back
/// to line creation time, tie-broken by `"{sheet_id}-{line_id}"`), so the
/// same inputs always produce byte-identical ordering.
///
/// Returns `Ok(None)` for an unknown sheet.
pub fn build_cumulative_snapshot(
    store: &LedgerStore,
    sheet_id: SheetId,
    as_of: DateTime<Utc>,
) -> LedgerResult<Option<CumulativeSnapshot>> {
    let relations = match store.sheet_with_relations(sheet_id) {
        Ok(relations) => relations,
        Err(LedgerError::NotFound { .. }) => return Ok(None),
        Err(err) => return Err(err),
    };
    let sheet = relations.sheet;
    let current_lines = relations.line_items;

    let mut historical_lines: Vec<LineItem> = Vec::new();
    let mut historical_sheet_count = 0usize;
    for other in store.sheets_for_case(&sheet.case_ref)? {
        if other.id == sheet.id || other.updated_at > as_of {
            continue;
        }
        historical_sheet_count += 1;
        let other_relations = store.sheet_with_relations(other.id)?;
        historical_lines.extend(
            other_relations
                .line_items
                .into_iter()
                .filter(|line| matches!(line.kind, LineKind::Expense { .. })),
        );
    }

    let mut all_lines: Vec<LineItem> = current_lines
        .iter()
        .chain(historical_lines.iter())
        .cloned()
        .collect();
    all_lines.sort_by_key(sort_key);

    let mut effective_sheet = sheet;
    if let Some(paid) = store.paid_to_date(&effective_sheet.case_ref, as_of)? {
        effective_sheet.already_paid_amount = paid;
    }

    debug!(
        sheet_id = %sheet_id,
        historical_sheets = historical_sheet_count,
        merged_lines = all_lines.len(),
        "cumulative snapshot built"
    );

    Ok(Some(CumulativeSnapshot {
        effective_sheet,
        current_lines,
        historical_lines,
        all_lines,
        render_options: RenderOptions {
            as_of,
            include_historical: historical_sheet_count > 0,
            historical_sheet_count,
        },
    }))
}

/// Stable total order: line date at midnight UTC, else line creation time,
/// else the epoch; ties broken lexically by `"{sheet_id}-{line_id}"`.
fn sort_key(line: &LineItem) -> (i64, String) {
    let primary = line
        .date
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_else(|| line.created_at.timestamp_millis());
    (primary, format!("{}-{}", line.sheet_id, line.id))
}
