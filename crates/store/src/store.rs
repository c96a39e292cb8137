//! The ledger store: keyed tables per entity, per-sheet optimistic
//! concurrency, explicit status transitions and an append-only audit log.
//!
//! One `RwLock` guards all tables, so a mutation (apply change + version bump
//! + hash recompute + audit append) is atomic and readers never observe a
//! partially-mutated sheet. Audit appends happen after the version bump they
//! describe, and are never skipped: failed ready attempts are recorded too.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info, warn};

use lexledger_calc::line_amounts;
use lexledger_core::model::{
    ArchivedReason, Attachment, AuditEntityType, AuditEvent, InsurerRuleset, LineItem, LineKind,
    PaymentEvent, Sheet, SheetStatus,
};
use lexledger_core::{
    Actor, AttachmentId, AuditEventId, CaseRef, IssueCode, IssueSeverity, LedgerError,
    LedgerResult, LineItemId, PaymentEventId, ReportDirectory, ReportId, RulesetId, SheetId,
    ValidationIssue,
};
use lexledger_rules::DecisionLog;

use crate::audit::entity_diff;
use crate::fingerprint::sheet_fingerprint;

/// Optimistic concurrency expectation against a sheet's version number.
///
/// Two concurrent editors must not both succeed against a stale version: the
/// second writer receives `ConcurrencyConflict` and must re-read.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (trusted single-writer callers, migrations).
    Any,
    /// Require the sheet to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }
}

/// Parameters for creating a sheet.
#[derive(Debug, Clone)]
pub struct NewSheet {
    pub case_ref: CaseRef,
    pub insurer: String,
    pub period_label: String,
    pub currency: String,
    pub deductible_amount: Decimal,
    pub already_paid_amount: Decimal,
    pub info_only: bool,
}

/// Partial update of sheet metadata; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct SheetMetaPatch {
    pub insurer: Option<String>,
    pub period_label: Option<String>,
    pub currency: Option<String>,
    pub deductible_amount: Option<Decimal>,
    pub already_paid_amount: Option<Decimal>,
    pub info_only: Option<bool>,
}

/// Parameters for creating a line item. Stored amounts are always computed by
/// the store via the calculator, never accepted from callers.
#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub kind: LineKind,
    pub description: String,
    pub expense_type: Option<String>,
    pub date: Option<NaiveDate>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate: Decimal,
    pub included_in_request: bool,
}

impl NewLineItem {
    /// Convenience for the common case: an included expense line.
    pub fn expense(
        provider_name: impl Into<String>,
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
        vat_rate: Decimal,
    ) -> Self {
        Self {
            kind: LineKind::Expense {
                provider_name: provider_name.into(),
            },
            description: description.into(),
            expense_type: None,
            date: None,
            quantity,
            unit_price,
            vat_rate,
            included_in_request: true,
        }
    }
}

/// Partial update of a line item; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct LineItemPatch {
    pub kind: Option<LineKind>,
    pub description: Option<String>,
    pub expense_type: Option<String>,
    pub date: Option<NaiveDate>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub vat_rate: Option<Decimal>,
    pub included_in_request: Option<bool>,
}

/// Parameters for registering an attachment.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub file_name: String,
    pub attachment_type: String,
    /// Optionally link to a line of the same sheet on upload.
    pub link_to_line: Option<LineItemId>,
}

/// Parameters for recording a payment event.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub case_ref: CaseRef,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub reference: Option<String>,
    pub note: Option<String>,
}

/// A sheet together with its children, read as one consistent unit.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SheetWithRelations {
    pub sheet: Sheet,
    pub line_items: Vec<LineItem>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Default)]
struct State {
    sheets: HashMap<SheetId, Sheet>,
    lines: HashMap<LineItemId, LineItem>,
    attachments: HashMap<AttachmentId, Attachment>,
    payments: HashMap<PaymentEventId, PaymentEvent>,
    rulesets: HashMap<RulesetId, InsurerRuleset>,
    audit: Vec<AuditEvent>,
    /// Normalized case ref -> sheets, so cross-sheet scans avoid walking every
    /// sheet in the store.
    case_index: HashMap<String, Vec<SheetId>>,
    /// Bumped on every successful mutation; snapshot caches validate against
    /// it.
    mutation_seq: u64,
}

impl State {
    fn require_sheet(&self, sheet_id: SheetId) -> LedgerResult<&Sheet> {
        self.sheets
            .get(&sheet_id)
            .ok_or_else(|| LedgerError::not_found("sheet", sheet_id))
    }

    fn require_line(&self, line_id: LineItemId) -> LedgerResult<&LineItem> {
        self.lines
            .get(&line_id)
            .ok_or_else(|| LedgerError::not_found("line item", line_id))
    }

    fn require_attachment(&self, attachment_id: AttachmentId) -> LedgerResult<&Attachment> {
        self.attachments
            .get(&attachment_id)
            .ok_or_else(|| LedgerError::not_found("attachment", attachment_id))
    }

    fn lines_of(&self, sheet_id: SheetId) -> Vec<LineItem> {
        let mut lines: Vec<LineItem> = self
            .lines
            .values()
            .filter(|l| l.sheet_id == sheet_id)
            .cloned()
            .collect();
        lines.sort_by(|a, b| (a.created_at, a.id.to_string()).cmp(&(b.created_at, b.id.to_string())));
        lines
    }

    fn attachments_of(&self, sheet_id: SheetId) -> Vec<Attachment> {
        let mut attachments: Vec<Attachment> = self
            .attachments
            .values()
            .filter(|a| a.sheet_id == sheet_id)
            .cloned()
            .collect();
        attachments.sort_by(|a, b| (a.uploaded_at, a.id.to_string()).cmp(&(b.uploaded_at, b.id.to_string())));
        attachments
    }

    fn payments_of(&self, case_ref: &CaseRef) -> Vec<PaymentEvent> {
        let key = case_ref.normalized();
        let mut payments: Vec<PaymentEvent> = self
            .payments
            .values()
            .filter(|p| p.case_ref.normalized() == key)
            .cloned()
            .collect();
        payments.sort_by(|a, b| (a.paid_at, a.id.to_string()).cmp(&(b.paid_at, b.id.to_string())));
        payments
    }

    /// Recompute the sheet's fingerprint and bump its version. Must run after
    /// the mutation it accounts for and before the audit append.
    fn bump_sheet(&mut self, sheet_id: SheetId, now: DateTime<Utc>) {
        let lines = self.lines_of(sheet_id);
        let attachments = self.attachments_of(sheet_id);
        if let Some(sheet) = self.sheets.get_mut(&sheet_id) {
            sheet.sheet_version_number += 1;
            sheet.sheet_version_hash = sheet_fingerprint(sheet, &lines, &attachments);
            sheet.updated_at = now;
        }
    }

    fn append_audit(
        &mut self,
        actor: &Actor,
        event_type: &str,
        entity_type: AuditEntityType,
        entity_id: String,
        payload: JsonValue,
        sheet: Option<&Sheet>,
        now: DateTime<Utc>,
    ) {
        let seq = self.audit.len() as u64 + 1;
        self.audit.push(AuditEvent {
            id: AuditEventId::new(),
            seq,
            actor: actor.into(),
            event_type: event_type.to_string(),
            entity_type,
            entity_id,
            payload,
            sheet_id: sheet.map(|s| s.id),
            sheet_version_number: sheet.map(|s| s.sheet_version_number),
            sheet_version_hash: sheet.map(|s| s.sheet_version_hash.clone()),
            occurred_at: now,
        });
    }
}

/// The versioned, audit-logged record store. Cheap to share behind an `Arc`.
pub struct LedgerStore {
    state: RwLock<State>,
    reports: Option<Arc<dyn ReportDirectory>>,
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            reports: None,
        }
    }

    /// Attach the read-only report directory used for delete annotations and
    /// SLA timings.
    pub fn with_report_directory(reports: Arc<dyn ReportDirectory>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            reports: Some(reports),
        }
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| LedgerError::integrity("ledger store lock poisoned"))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| LedgerError::integrity("ledger store lock poisoned"))
    }

    // ---- sheets -----------------------------------------------------------

    pub fn create_sheet(&self, new: NewSheet, actor: &Actor) -> LedgerResult<Sheet> {
        let now = Utc::now();
        let mut state = self.write()?;

        let case_key = new.case_ref.normalized();
        let version_index = state
            .case_index
            .get(&case_key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.sheets.get(id))
                    .map(|s| s.version_index)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
            + 1;

        let mut sheet = Sheet {
            id: SheetId::new(),
            case_ref: new.case_ref,
            insurer: new.insurer,
            period_label: new.period_label,
            version_index,
            status: SheetStatus::Draft,
            archived_reason: None,
            currency: new.currency,
            deductible_amount: new.deductible_amount,
            already_paid_amount: new.already_paid_amount,
            info_only: new.info_only,
            attached_report_id: None,
            sheet_version_number: 1,
            sheet_version_hash: String::new(),
            created_by: actor.id,
            created_at: now,
            updated_at: now,
            ready_at: None,
            attached_at: None,
        };
        sheet.sheet_version_hash = sheet_fingerprint(&sheet, &[], &[]);

        state.case_index.entry(case_key).or_default().push(sheet.id);
        state.sheets.insert(sheet.id, sheet.clone());
        state.mutation_seq += 1;
        let diff = entity_diff(None, Some(&sheet));
        state.append_audit(
            actor,
            "sheet.created",
            AuditEntityType::Sheet,
            sheet.id.to_string(),
            diff,
            Some(&sheet),
            now,
        );

        info!(sheet_id = %sheet.id, case = %sheet.case_ref, "sheet created");
        Ok(sheet)
    }

    pub fn update_sheet_meta(
        &self,
        sheet_id: SheetId,
        patch: SheetMetaPatch,
        expected: ExpectedVersion,
        actor: &Actor,
    ) -> LedgerResult<Sheet> {
        let now = Utc::now();
        let mut state = self.write()?;

        let sheet = state.require_sheet(sheet_id)?.clone();
        check_version(&sheet, expected)?;
        require_editable(&sheet)?;

        let before = sheet.clone();
        let updated = {
            let sheet = state
                .sheets
                .get_mut(&sheet_id)
                .ok_or_else(|| LedgerError::not_found("sheet", sheet_id))?;
            if let Some(insurer) = patch.insurer {
                sheet.insurer = insurer;
            }
            if let Some(period_label) = patch.period_label {
                sheet.period_label = period_label;
            }
            if let Some(currency) = patch.currency {
                sheet.currency = currency;
            }
            if let Some(deductible) = patch.deductible_amount {
                sheet.deductible_amount = deductible;
            }
            if let Some(already_paid) = patch.already_paid_amount {
                sheet.already_paid_amount = already_paid;
            }
            if let Some(info_only) = patch.info_only {
                sheet.info_only = info_only;
            }
            sheet.clone()
        };

        state.bump_sheet(sheet_id, now);
        state.mutation_seq += 1;
        let after = state.require_sheet(sheet_id)?.clone();
        let diff = entity_diff(Some(&before), Some(&updated));
        state.append_audit(
            actor,
            "sheet.updated",
            AuditEntityType::Sheet,
            sheet_id.to_string(),
            diff,
            Some(&after),
            now,
        );

        debug!(sheet_id = %sheet_id, version = after.sheet_version_number, "sheet meta updated");
        Ok(after)
    }

    pub fn sheet(&self, sheet_id: SheetId) -> LedgerResult<Sheet> {
        Ok(self.read()?.require_sheet(sheet_id)?.clone())
    }

    /// Read a sheet with its children as one consistent unit.
    pub fn sheet_with_relations(&self, sheet_id: SheetId) -> LedgerResult<SheetWithRelations> {
        let state = self.read()?;
        let sheet = state.require_sheet(sheet_id)?.clone();
        Ok(SheetWithRelations {
            line_items: state.lines_of(sheet_id),
            attachments: state.attachments_of(sheet_id),
            sheet,
        })
    }

    /// All sheets of a case, oldest report round first.
    pub fn sheets_for_case(&self, case_ref: &CaseRef) -> LedgerResult<Vec<Sheet>> {
        let state = self.read()?;
        let mut sheets: Vec<Sheet> = state
            .case_index
            .get(&case_ref.normalized())
            .into_iter()
            .flatten()
            .filter_map(|id| state.sheets.get(id))
            .cloned()
            .collect();
        sheets.sort_by_key(|s| s.version_index);
        Ok(sheets)
    }

    pub fn all_sheets(&self) -> LedgerResult<Vec<Sheet>> {
        let state = self.read()?;
        let mut sheets: Vec<Sheet> = state.sheets.values().cloned().collect();
        sheets.sort_by_key(|s| (s.created_at, s.id.to_string()));
        Ok(sheets)
    }

    /// Recompute the sheet fingerprint and compare against the stored one.
    /// Drift is a data-corruption signal: logged loudly, never repaired.
    pub fn verify_sheet_integrity(&self, sheet_id: SheetId) -> LedgerResult<()> {
        let state = self.read()?;
        let sheet = state.require_sheet(sheet_id)?;
        let recomputed = sheet_fingerprint(
            sheet,
            &state.lines_of(sheet_id),
            &state.attachments_of(sheet_id),
        );
        if recomputed != sheet.sheet_version_hash {
            warn!(
                sheet_id = %sheet_id,
                stored = %sheet.sheet_version_hash,
                recomputed = %recomputed,
                "sheet version hash drift detected"
            );
            return Err(LedgerError::integrity(format!(
                "sheet {sheet_id} hash drift: stored {} != recomputed {recomputed}",
                sheet.sheet_version_hash
            )));
        }
        Ok(())
    }

    // ---- status transitions ----------------------------------------------

    /// Record a ready attempt. On success the sheet moves DRAFT →
    /// READY_FOR_REPORT; on failure nothing changes except the audit log, so
    /// failed attempts remain durable for operational analytics.
    pub fn record_ready_attempt(
        &self,
        sheet_id: SheetId,
        success: bool,
        decision_log: &DecisionLog,
        expected: ExpectedVersion,
        actor: &Actor,
    ) -> LedgerResult<Sheet> {
        let now = Utc::now();
        let mut state = self.write()?;
        let sheet = state.require_sheet(sheet_id)?.clone();
        check_version(&sheet, expected)?;

        let payload = json!({
            "success": success,
            "decision_log": decision_log,
        });

        if !success {
            state.mutation_seq += 1;
            state.append_audit(
                actor,
                "sheet.ready_attempt",
                AuditEntityType::Sheet,
                sheet_id.to_string(),
                payload,
                Some(&sheet),
                now,
            );
            info!(sheet_id = %sheet_id, "ready attempt failed; audit recorded");
            return Ok(sheet);
        }

        if sheet.status != SheetStatus::Draft {
            return Err(transition_rejected(
                IssueCode::SheetStatusInvalidForReady,
                format!("sheet is {:?}, only DRAFT can become ready", sheet.status),
            ));
        }

        if let Some(sheet) = state.sheets.get_mut(&sheet_id) {
            sheet.status = SheetStatus::ReadyForReport;
            sheet.ready_at = Some(now);
        }
        state.bump_sheet(sheet_id, now);
        state.mutation_seq += 1;
        let after = state.require_sheet(sheet_id)?.clone();
        state.append_audit(
            actor,
            "sheet.ready_attempt",
            AuditEntityType::Sheet,
            sheet_id.to_string(),
            payload,
            Some(&after),
            now,
        );

        info!(sheet_id = %sheet_id, "sheet marked ready for report");
        Ok(after)
    }

    /// READY_FOR_REPORT → DRAFT. The only legal revert.
    pub fn revert_to_draft(
        &self,
        sheet_id: SheetId,
        expected: ExpectedVersion,
        actor: &Actor,
    ) -> LedgerResult<Sheet> {
        let now = Utc::now();
        let mut state = self.write()?;
        let sheet = state.require_sheet(sheet_id)?.clone();
        check_version(&sheet, expected)?;

        if !sheet.can_revert_to_draft() {
            return Err(transition_rejected(
                IssueCode::SheetStatusInvalidForReady,
                format!("sheet is {:?}, only READY_FOR_REPORT reverts to draft", sheet.status),
            ));
        }

        let before = sheet.clone();
        if let Some(sheet) = state.sheets.get_mut(&sheet_id) {
            sheet.status = SheetStatus::Draft;
            sheet.ready_at = None;
        }
        state.bump_sheet(sheet_id, now);
        state.mutation_seq += 1;
        let after = state.require_sheet(sheet_id)?.clone();
        let diff = entity_diff(Some(&before), Some(&after));
        state.append_audit(
            actor,
            "sheet.reverted_to_draft",
            AuditEntityType::Sheet,
            sheet_id.to_string(),
            diff,
            Some(&after),
            now,
        );
        Ok(after)
    }

    /// READY_FOR_REPORT / ATTACHED_TO_REPORT → ATTACHED_TO_REPORT.
    pub fn link_to_report(
        &self,
        sheet_id: SheetId,
        report_id: ReportId,
        expected: ExpectedVersion,
        actor: &Actor,
    ) -> LedgerResult<Sheet> {
        let now = Utc::now();
        let mut state = self.write()?;
        let sheet = state.require_sheet(sheet_id)?.clone();
        check_version(&sheet, expected)?;

        if !sheet.can_attach_to_report() {
            return Err(transition_rejected(
                IssueCode::SheetStatusInvalidForAttach,
                format!("sheet is {:?}, cannot attach to a report", sheet.status),
            ));
        }

        let before = sheet.clone();
        if let Some(sheet) = state.sheets.get_mut(&sheet_id) {
            sheet.status = SheetStatus::AttachedToReport;
            sheet.attached_report_id = Some(report_id);
            sheet.archived_reason = Some(ArchivedReason::UsedInReport);
            sheet.attached_at = Some(now);
        }
        state.bump_sheet(sheet_id, now);
        state.mutation_seq += 1;
        let after = state.require_sheet(sheet_id)?.clone();
        let diff = entity_diff(Some(&before), Some(&after));
        state.append_audit(
            actor,
            "sheet.linked_to_report",
            AuditEntityType::Sheet,
            sheet_id.to_string(),
            diff,
            Some(&after),
            now,
        );

        info!(sheet_id = %sheet_id, report_id = %report_id, "sheet attached to report");
        Ok(after)
    }

    /// Delete a sheet, cascading to its line items and attachments.
    ///
    /// Deletion always succeeds once authorized upstream. When the sheet is
    /// linked to a report already marked paid, the supplied reason is captured
    /// as a separate audit annotation.
    pub fn delete_sheet(
        &self,
        sheet_id: SheetId,
        reason: Option<String>,
        expected: ExpectedVersion,
        actor: &Actor,
    ) -> LedgerResult<()> {
        let now = Utc::now();
        let mut state = self.write()?;
        let sheet = state.require_sheet(sheet_id)?.clone();
        check_version(&sheet, expected)?;

        let lines = state.lines_of(sheet_id);
        let attachments = state.attachments_of(sheet_id);
        for line in &lines {
            state.lines.remove(&line.id);
        }
        for attachment in &attachments {
            state.attachments.remove(&attachment.id);
        }
        state.sheets.remove(&sheet_id);
        if let Some(ids) = state.case_index.get_mut(&sheet.case_ref.normalized()) {
            ids.retain(|id| *id != sheet_id);
        }
        state.mutation_seq += 1;

        let diff = json!({
            "sheet": entity_diff(Some(&sheet), None),
            "cascaded_line_items": lines.len(),
            "cascaded_attachments": attachments.len(),
        });
        state.append_audit(
            actor,
            "sheet.deleted",
            AuditEntityType::Sheet,
            sheet_id.to_string(),
            diff,
            Some(&sheet),
            now,
        );

        let linked_paid = sheet.attached_report_id.and_then(|report_id| {
            self.reports
                .as_ref()
                .and_then(|r| r.report_status(report_id))
                .filter(|status| status.paid)
                .map(|_| report_id)
        });
        if let Some(report_id) = linked_paid {
            state.append_audit(
                actor,
                "sheet.delete_annotation",
                AuditEntityType::Sheet,
                sheet_id.to_string(),
                json!({
                    "report_id": report_id,
                    "report_paid": true,
                    "reason": reason,
                }),
                Some(&sheet),
                now,
            );
        }

        info!(sheet_id = %sheet_id, lines = lines.len(), attachments = attachments.len(), "sheet deleted with cascade");
        Ok(())
    }

    // ---- line items -------------------------------------------------------

    pub fn add_line_item(
        &self,
        sheet_id: SheetId,
        new: NewLineItem,
        expected: ExpectedVersion,
        actor: &Actor,
    ) -> LedgerResult<LineItem> {
        let now = Utc::now();
        let mut state = self.write()?;
        let sheet = state.require_sheet(sheet_id)?.clone();
        check_version(&sheet, expected)?;
        require_editable(&sheet)?;

        let (net, vat, total) = line_amounts(new.quantity, new.unit_price, new.vat_rate);
        let line = LineItem {
            id: LineItemId::new(),
            sheet_id,
            kind: new.kind,
            description: new.description,
            expense_type: new.expense_type,
            date: new.date,
            quantity: new.quantity,
            unit_price: new.unit_price,
            vat_rate: new.vat_rate,
            included_in_request: new.included_in_request,
            net_amount: net,
            vat_amount: vat,
            total_amount: total,
            attachment_id: None,
            created_at: now,
            updated_at: now,
        };
        state.lines.insert(line.id, line.clone());
        state.bump_sheet(sheet_id, now);
        state.mutation_seq += 1;
        let after = state.require_sheet(sheet_id)?.clone();
        let diff = entity_diff(None, Some(&line));
        state.append_audit(
            actor,
            "line_item.created",
            AuditEntityType::LineItem,
            line.id.to_string(),
            diff,
            Some(&after),
            now,
        );
        Ok(line)
    }

    pub fn update_line_item(
        &self,
        line_id: LineItemId,
        patch: LineItemPatch,
        expected: ExpectedVersion,
        actor: &Actor,
    ) -> LedgerResult<LineItem> {
        let now = Utc::now();
        let mut state = self.write()?;
        let before = state.require_line(line_id)?.clone();
        let sheet = state.require_sheet(before.sheet_id)?.clone();
        check_version(&sheet, expected)?;
        require_editable(&sheet)?;

        let updated = {
            let line = state
                .lines
                .get_mut(&line_id)
                .ok_or_else(|| LedgerError::not_found("line item", line_id))?;
            if let Some(kind) = patch.kind {
                line.kind = kind;
            }
            if let Some(description) = patch.description {
                line.description = description;
            }
            if let Some(expense_type) = patch.expense_type {
                line.expense_type = Some(expense_type);
            }
            if let Some(date) = patch.date {
                line.date = Some(date);
            }
            if let Some(quantity) = patch.quantity {
                line.quantity = quantity;
            }
            if let Some(unit_price) = patch.unit_price {
                line.unit_price = unit_price;
            }
            if let Some(vat_rate) = patch.vat_rate {
                line.vat_rate = vat_rate;
            }
            if let Some(included) = patch.included_in_request {
                line.included_in_request = included;
            }
            let (net, vat, total) = line_amounts(line.quantity, line.unit_price, line.vat_rate);
            line.net_amount = net;
            line.vat_amount = vat;
            line.total_amount = total;
            line.updated_at = now;
            line.clone()
        };

        state.bump_sheet(before.sheet_id, now);
        state.mutation_seq += 1;
        let after_sheet = state.require_sheet(before.sheet_id)?.clone();
        let diff = entity_diff(Some(&before), Some(&updated));
        state.append_audit(
            actor,
            "line_item.updated",
            AuditEntityType::LineItem,
            line_id.to_string(),
            diff,
            Some(&after_sheet),
            now,
        );
        Ok(updated)
    }

    pub fn remove_line_item(
        &self,
        line_id: LineItemId,
        expected: ExpectedVersion,
        actor: &Actor,
    ) -> LedgerResult<()> {
        let now = Utc::now();
        let mut state = self.write()?;
        let line = state.require_line(line_id)?.clone();
        let sheet = state.require_sheet(line.sheet_id)?.clone();
        check_version(&sheet, expected)?;
        require_editable(&sheet)?;

        // Keep the 1:1 link mirror consistent.
        if let Some(attachment_id) = line.attachment_id {
            if let Some(attachment) = state.attachments.get_mut(&attachment_id) {
                attachment.linked_line_item_id = None;
            }
        }
        state.lines.remove(&line_id);
        state.bump_sheet(line.sheet_id, now);
        state.mutation_seq += 1;
        let after_sheet = state.require_sheet(line.sheet_id)?.clone();
        let diff = entity_diff(Some(&line), None);
        state.append_audit(
            actor,
            "line_item.deleted",
            AuditEntityType::LineItem,
            line_id.to_string(),
            diff,
            Some(&after_sheet),
            now,
        );
        Ok(())
    }

    // ---- attachments ------------------------------------------------------

    pub fn add_attachment(
        &self,
        sheet_id: SheetId,
        new: NewAttachment,
        expected: ExpectedVersion,
        actor: &Actor,
    ) -> LedgerResult<Attachment> {
        let now = Utc::now();
        let mut state = self.write()?;
        let sheet = state.require_sheet(sheet_id)?.clone();
        check_version(&sheet, expected)?;
        require_editable(&sheet)?;

        if let Some(line_id) = new.link_to_line {
            let line = state.require_line(line_id)?;
            if line.sheet_id != sheet_id {
                return Err(link_rejected(line_id, sheet_id));
            }
        }

        let attachment = Attachment {
            id: AttachmentId::new(),
            sheet_id,
            file_name: new.file_name,
            attachment_type: new.attachment_type,
            linked_line_item_id: None,
            uploaded_by: actor.id,
            uploaded_at: now,
        };
        state.attachments.insert(attachment.id, attachment.clone());
        if let Some(line_id) = new.link_to_line {
            relink(&mut state, attachment.id, line_id);
        }
        state.bump_sheet(sheet_id, now);
        state.mutation_seq += 1;
        let after_sheet = state.require_sheet(sheet_id)?.clone();
        let stored = state
            .attachments
            .get(&attachment.id)
            .cloned()
            .unwrap_or(attachment);
        let diff = entity_diff(None, Some(&stored));
        state.append_audit(
            actor,
            "attachment.created",
            AuditEntityType::Attachment,
            stored.id.to_string(),
            diff,
            Some(&after_sheet),
            now,
        );
        Ok(stored)
    }

    /// Link an attachment 1:1 to a line item of the same sheet, atomically
    /// clearing any previous link on either side.
    pub fn link_attachment(
        &self,
        attachment_id: AttachmentId,
        line_id: LineItemId,
        expected: ExpectedVersion,
        actor: &Actor,
    ) -> LedgerResult<Attachment> {
        let now = Utc::now();
        let mut state = self.write()?;
        let attachment = state.require_attachment(attachment_id)?.clone();
        let line = state.require_line(line_id)?.clone();
        let sheet = state.require_sheet(attachment.sheet_id)?.clone();
        check_version(&sheet, expected)?;
        require_editable(&sheet)?;
        if line.sheet_id != attachment.sheet_id {
            return Err(link_rejected(line_id, attachment.sheet_id));
        }

        relink(&mut state, attachment_id, line_id);
        state.bump_sheet(sheet.id, now);
        state.mutation_seq += 1;
        let after_sheet = state.require_sheet(sheet.id)?.clone();
        let stored = state.require_attachment(attachment_id)?.clone();
        let diff = entity_diff(Some(&attachment), Some(&stored));
        state.append_audit(
            actor,
            "attachment.linked",
            AuditEntityType::Attachment,
            attachment_id.to_string(),
            diff,
            Some(&after_sheet),
            now,
        );
        Ok(stored)
    }

    pub fn unlink_attachment(
        &self,
        attachment_id: AttachmentId,
        expected: ExpectedVersion,
        actor: &Actor,
    ) -> LedgerResult<Attachment> {
        let now = Utc::now();
        let mut state = self.write()?;
        let before = state.require_attachment(attachment_id)?.clone();
        let sheet = state.require_sheet(before.sheet_id)?.clone();
        check_version(&sheet, expected)?;
        require_editable(&sheet)?;

        if let Some(line_id) = before.linked_line_item_id {
            if let Some(line) = state.lines.get_mut(&line_id) {
                line.attachment_id = None;
            }
        }
        if let Some(attachment) = state.attachments.get_mut(&attachment_id) {
            attachment.linked_line_item_id = None;
        }
        state.bump_sheet(sheet.id, now);
        state.mutation_seq += 1;
        let after_sheet = state.require_sheet(sheet.id)?.clone();
        let stored = state.require_attachment(attachment_id)?.clone();
        let diff = entity_diff(Some(&before), Some(&stored));
        state.append_audit(
            actor,
            "attachment.unlinked",
            AuditEntityType::Attachment,
            attachment_id.to_string(),
            diff,
            Some(&after_sheet),
            now,
        );
        Ok(stored)
    }

    pub fn remove_attachment(
        &self,
        attachment_id: AttachmentId,
        expected: ExpectedVersion,
        actor: &Actor,
    ) -> LedgerResult<()> {
        let now = Utc::now();
        let mut state = self.write()?;
        let attachment = state.require_attachment(attachment_id)?.clone();
        let sheet = state.require_sheet(attachment.sheet_id)?.clone();
        check_version(&sheet, expected)?;
        require_editable(&sheet)?;

        if let Some(line_id) = attachment.linked_line_item_id {
            if let Some(line) = state.lines.get_mut(&line_id) {
                line.attachment_id = None;
            }
        }
        state.attachments.remove(&attachment_id);
        state.bump_sheet(sheet.id, now);
        state.mutation_seq += 1;
        let after_sheet = state.require_sheet(sheet.id)?.clone();
        let diff = entity_diff(Some(&attachment), None);
        state.append_audit(
            actor,
            "attachment.deleted",
            AuditEntityType::Attachment,
            attachment_id.to_string(),
            diff,
            Some(&after_sheet),
            now,
        );
        Ok(())
    }

    // ---- payment events ---------------------------------------------------

    /// Record a case-scoped payment event. Payments belong to the case, not a
    /// sheet, so no sheet version is bumped.
    pub fn record_payment(&self, new: NewPayment, actor: &Actor) -> LedgerResult<PaymentEvent> {
        let now = Utc::now();
        let mut state = self.write()?;
        let payment = PaymentEvent {
            id: PaymentEventId::new(),
            case_ref: new.case_ref,
            amount: new.amount,
            paid_at: new.paid_at,
            reference: new.reference,
            note: new.note,
            deleted: false,
            created_at: now,
        };
        state.payments.insert(payment.id, payment.clone());
        state.mutation_seq += 1;
        let diff = entity_diff(None, Some(&payment));
        state.append_audit(
            actor,
            "payment.recorded",
            AuditEntityType::PaymentEvent,
            payment.id.to_string(),
            diff,
            None,
            now,
        );
        Ok(payment)
    }

    /// Soft-delete a payment event. The record stays for the audit trail but
    /// stops counting toward paid-to-date.
    pub fn soft_delete_payment(
        &self,
        payment_id: PaymentEventId,
        actor: &Actor,
    ) -> LedgerResult<PaymentEvent> {
        let now = Utc::now();
        let mut state = self.write()?;
        let before = state
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("payment event", payment_id))?;

        let after = {
            let payment = state
                .payments
                .get_mut(&payment_id)
                .ok_or_else(|| LedgerError::not_found("payment event", payment_id))?;
            payment.deleted = true;
            payment.clone()
        };
        state.mutation_seq += 1;
        let diff = entity_diff(Some(&before), Some(&after));
        state.append_audit(
            actor,
            "payment.deleted",
            AuditEntityType::PaymentEvent,
            payment_id.to_string(),
            diff,
            None,
            now,
        );
        Ok(after)
    }

    pub fn payments_for_case(&self, case_ref: &CaseRef) -> LedgerResult<Vec<PaymentEvent>> {
        Ok(self.read()?.payments_of(case_ref))
    }

    /// Paid-to-date for a case as of an instant: sum of non-deleted payment
    /// events with `paid_at <= as_of`. `None` when the case has no payment
    /// events at all (callers fall back to the legacy per-sheet amount).
    pub fn paid_to_date(
        &self,
        case_ref: &CaseRef,
        as_of: DateTime<Utc>,
    ) -> LedgerResult<Option<Decimal>> {
        let payments = self.payments_for_case(case_ref)?;
        if payments.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            payments
                .iter()
                .filter(|p| p.counts_at(as_of))
                .map(|p| p.amount)
                .sum(),
        ))
    }

    // ---- rulesets ---------------------------------------------------------

    pub fn register_ruleset(&self, ruleset: InsurerRuleset) -> LedgerResult<InsurerRuleset> {
        let mut state = self.write()?;
        state.rulesets.insert(ruleset.id, ruleset.clone());
        Ok(ruleset)
    }

    /// Latest ruleset version registered for an insurer, matched
    /// case-insensitively.
    pub fn ruleset_for_insurer(&self, insurer: &str) -> LedgerResult<Option<InsurerRuleset>> {
        let state = self.read()?;
        Ok(state
            .rulesets
            .values()
            .filter(|r| r.insurer.eq_ignore_ascii_case(insurer))
            .max_by_key(|r| r.version)
            .cloned())
    }

    // ---- audit ------------------------------------------------------------

    /// Full audit trail for one sheet, in append order.
    pub fn audit_trail(&self, sheet_id: SheetId) -> LedgerResult<Vec<AuditEvent>> {
        let state = self.read()?;
        Ok(state
            .audit
            .iter()
            .filter(|e| e.sheet_id == Some(sheet_id))
            .cloned()
            .collect())
    }

    pub fn audit_log(&self) -> LedgerResult<Vec<AuditEvent>> {
        Ok(self.read()?.audit.clone())
    }

    /// Monotonic count of successful mutations; snapshot caches validate
    /// against it.
    pub fn mutation_seq(&self) -> u64 {
        self.read().map(|s| s.mutation_seq).unwrap_or(0)
    }
}

fn check_version(sheet: &Sheet, expected: ExpectedVersion) -> LedgerResult<()> {
    match expected {
        ExpectedVersion::Any => Ok(()),
        ExpectedVersion::Exact(v) if v == sheet.sheet_version_number => Ok(()),
        ExpectedVersion::Exact(v) => Err(LedgerError::ConcurrencyConflict {
            sheet_id: sheet.id.to_string(),
            expected: v,
            actual: sheet.sheet_version_number,
        }),
    }
}

fn require_editable(sheet: &Sheet) -> LedgerResult<()> {
    if sheet.is_mutable() {
        Ok(())
    } else {
        Err(LedgerError::ValidationFailed(vec![ValidationIssue::sheet(
            IssueCode::SheetNotEditable,
            IssueSeverity::Error,
            format!("sheet is {:?}, content edits require DRAFT", sheet.status),
        )]))
    }
}

fn transition_rejected(code: IssueCode, message: String) -> LedgerError {
    LedgerError::ValidationFailed(vec![ValidationIssue::sheet(
        code,
        IssueSeverity::Error,
        message,
    )])
}

fn link_rejected(line_id: LineItemId, sheet_id: SheetId) -> LedgerError {
    LedgerError::ValidationFailed(vec![ValidationIssue::line(
        IssueCode::AttachmentLinkInvalid,
        IssueSeverity::Error,
        line_id,
        format!("line does not belong to sheet {sheet_id}"),
    )])
}

/// Set the attachment<->line 1:1 link, clearing the previous link on both
/// sides in the same write.
fn relink(state: &mut State, attachment_id: AttachmentId, line_id: LineItemId) {
    // Clear the line this attachment used to point at.
    if let Some(previous_line) = state
        .attachments
        .get(&attachment_id)
        .and_then(|a| a.linked_line_item_id)
    {
        if let Some(line) = state.lines.get_mut(&previous_line) {
            line.attachment_id = None;
        }
    }
    // Clear the attachment the target line used to point at.
    if let Some(previous_attachment) = state.lines.get(&line_id).and_then(|l| l.attachment_id) {
        if let Some(attachment) = state.attachments.get_mut(&previous_attachment) {
            attachment.linked_line_item_id = None;
        }
    }
    if let Some(attachment) = state.attachments.get_mut(&attachment_id) {
        attachment.linked_line_item_id = Some(line_id);
    }
    if let Some(line) = state.lines.get_mut(&line_id) {
        line.attachment_id = Some(attachment_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    use lexledger_core::model::PolicyFamily;
    use lexledger_core::{InMemoryReportDirectory, Role, UserId};
    use lexledger_rules::{ValidationMode, validate};

    fn preparer() -> Actor {
        Actor::new(UserId::new(), "Dana", Role::Preparer)
    }

    fn new_sheet(case: &str) -> NewSheet {
        NewSheet {
            case_ref: CaseRef::new(case),
            insurer: "Migdal".to_string(),
            period_label: "2024-H1".to_string(),
            currency: "ILS".to_string(),
            deductible_amount: Decimal::ZERO,
            already_paid_amount: Decimal::ZERO,
            info_only: false,
        }
    }

    fn passing_decision_log() -> DecisionLog {
        DecisionLog::from_issues(ValidationMode::ReadyForReport, &[], None, Utc::now())
    }

    #[test]
    fn create_sheet_assigns_version_index_per_case() {
        let store = LedgerStore::new();
        let actor = preparer();

        let first = store.create_sheet(new_sheet("CASE-9"), &actor).unwrap();
        let second = store.create_sheet(new_sheet("case 9"), &actor).unwrap();
        let other = store.create_sheet(new_sheet("CASE-10"), &actor).unwrap();

        assert_eq!(first.version_index, 1);
        assert_eq!(second.version_index, 2);
        assert_eq!(other.version_index, 1);
    }

    #[test]
    fn every_mutation_bumps_version_and_appends_audit() {
        let store = LedgerStore::new();
        let actor = preparer();
        let sheet = store.create_sheet(new_sheet("1"), &actor).unwrap();
        assert_eq!(sheet.sheet_version_number, 1);

        let line = store
            .add_line_item(
                sheet.id,
                NewLineItem::expense("Clinic", "x-ray", dec!(1), dec!(300), dec!(17)),
                ExpectedVersion::Exact(1),
                &actor,
            )
            .unwrap();
        assert_eq!(line.total_amount, dec!(351.00));

        let after = store.sheet(sheet.id).unwrap();
        assert_eq!(after.sheet_version_number, 2);
        assert_ne!(after.sheet_version_hash, sheet.sheet_version_hash);

        let trail = store.audit_trail(sheet.id).unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].event_type, "sheet.created");
        assert_eq!(trail[1].event_type, "line_item.created");
        assert_eq!(trail[1].sheet_version_number, Some(2));
        assert_eq!(
            trail[1].sheet_version_hash.as_deref(),
            Some(after.sheet_version_hash.as_str())
        );
    }

    #[test]
    fn hash_unchanged_when_content_identical() {
        let store = LedgerStore::new();
        let actor = preparer();
        let sheet = store.create_sheet(new_sheet("1"), &actor).unwrap();

        // A no-op meta patch still bumps the version but not the hash.
        let after = store
            .update_sheet_meta(
                sheet.id,
                SheetMetaPatch::default(),
                ExpectedVersion::Exact(1),
                &actor,
            )
            .unwrap();
        assert_eq!(after.sheet_version_number, 2);
        assert_eq!(after.sheet_version_hash, sheet.sheet_version_hash);
    }

    #[test]
    fn stale_writer_receives_concurrency_conflict() {
        let store = LedgerStore::new();
        let actor = preparer();
        let sheet = store.create_sheet(new_sheet("1"), &actor).unwrap();

        let mut patch = SheetMetaPatch::default();
        patch.deductible_amount = Some(dec!(100));
        store
            .update_sheet_meta(sheet.id, patch.clone(), ExpectedVersion::Exact(1), &actor)
            .unwrap();

        let err = store
            .update_sheet_meta(sheet.id, patch, ExpectedVersion::Exact(1), &actor)
            .unwrap_err();
        match err {
            LedgerError::ConcurrencyConflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
    }

    #[test]
    fn line_for_unknown_sheet_is_not_found() {
        let store = LedgerStore::new();
        let err = store
            .add_line_item(
                SheetId::new(),
                NewLineItem::expense("P", "d", dec!(1), dec!(1), dec!(0)),
                ExpectedVersion::Any,
                &preparer(),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "sheet", .. }));
    }

    #[test]
    fn ready_attempt_success_transitions_and_records() {
        let store = LedgerStore::new();
        let actor = preparer();
        let sheet = store.create_sheet(new_sheet("1"), &actor).unwrap();

        let after = store
            .record_ready_attempt(
                sheet.id,
                true,
                &passing_decision_log(),
                ExpectedVersion::Exact(1),
                &actor,
            )
            .unwrap();
        assert_eq!(after.status, SheetStatus::ReadyForReport);
        assert!(after.ready_at.is_some());
        assert_eq!(after.sheet_version_number, 2);

        let trail = store.audit_trail(sheet.id).unwrap();
        let attempt = trail.last().unwrap();
        assert_eq!(attempt.event_type, "sheet.ready_attempt");
        assert_eq!(attempt.payload["success"], serde_json::json!(true));
    }

    #[test]
    fn ready_attempt_failure_only_appends_audit() {
        let store = LedgerStore::new();
        let actor = preparer();
        let sheet = store.create_sheet(new_sheet("1"), &actor).unwrap();

        let after = store
            .record_ready_attempt(
                sheet.id,
                false,
                &passing_decision_log(),
                ExpectedVersion::Exact(1),
                &actor,
            )
            .unwrap();
        assert_eq!(after.status, SheetStatus::Draft);
        assert_eq!(after.sheet_version_number, 1);

        let trail = store.audit_trail(sheet.id).unwrap();
        assert_eq!(trail.last().unwrap().event_type, "sheet.ready_attempt");
        assert_eq!(
            trail.last().unwrap().payload["success"],
            serde_json::json!(false)
        );
    }

    #[test]
    fn revert_is_only_legal_from_ready() {
        let store = LedgerStore::new();
        let actor = preparer();
        let sheet = store.create_sheet(new_sheet("1"), &actor).unwrap();

        let err = store
            .revert_to_draft(sheet.id, ExpectedVersion::Any, &actor)
            .unwrap_err();
        assert!(matches!(err, LedgerError::ValidationFailed(_)));

        store
            .record_ready_attempt(sheet.id, true, &passing_decision_log(), ExpectedVersion::Any, &actor)
            .unwrap();
        let after = store
            .revert_to_draft(sheet.id, ExpectedVersion::Any, &actor)
            .unwrap();
        assert_eq!(after.status, SheetStatus::Draft);
        assert!(after.ready_at.is_none());
    }

    #[test]
    fn link_to_report_sets_archival_fields() {
        let store = LedgerStore::new();
        let actor = preparer();
        let sheet = store.create_sheet(new_sheet("1"), &actor).unwrap();
        store
            .record_ready_attempt(sheet.id, true, &passing_decision_log(), ExpectedVersion::Any, &actor)
            .unwrap();

        let report_id = ReportId::new();
        let after = store
            .link_to_report(sheet.id, report_id, ExpectedVersion::Any, &actor)
            .unwrap();
        assert_eq!(after.status, SheetStatus::AttachedToReport);
        assert_eq!(after.attached_report_id, Some(report_id));
        assert_eq!(after.archived_reason, Some(ArchivedReason::UsedInReport));
        assert!(after.attached_at.is_some());
    }

    #[test]
    fn non_draft_sheets_reject_content_edits() {
        let store = LedgerStore::new();
        let actor = preparer();
        let sheet = store.create_sheet(new_sheet("1"), &actor).unwrap();
        store
            .record_ready_attempt(sheet.id, true, &passing_decision_log(), ExpectedVersion::Any, &actor)
            .unwrap();

        let err = store
            .add_line_item(
                sheet.id,
                NewLineItem::expense("P", "d", dec!(1), dec!(1), dec!(0)),
                ExpectedVersion::Any,
                &actor,
            )
            .unwrap_err();
        let issues = err.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::SheetNotEditable);
    }

    #[test]
    fn relink_clears_previous_links_on_both_sides() {
        let store = LedgerStore::new();
        let actor = preparer();
        let sheet = store.create_sheet(new_sheet("1"), &actor).unwrap();
        let line_a = store
            .add_line_item(
                sheet.id,
                NewLineItem::expense("A", "a", dec!(1), dec!(10), dec!(0)),
                ExpectedVersion::Any,
                &actor,
            )
            .unwrap();
        let line_b = store
            .add_line_item(
                sheet.id,
                NewLineItem::expense("B", "b", dec!(1), dec!(20), dec!(0)),
                ExpectedVersion::Any,
                &actor,
            )
            .unwrap();
        let attachment = store
            .add_attachment(
                sheet.id,
                NewAttachment {
                    file_name: "receipt.pdf".to_string(),
                    attachment_type: "RECEIPT".to_string(),
                    link_to_line: Some(line_a.id),
                },
                ExpectedVersion::Any,
                &actor,
            )
            .unwrap();
        assert_eq!(attachment.linked_line_item_id, Some(line_a.id));

        store
            .link_attachment(attachment.id, line_b.id, ExpectedVersion::Any, &actor)
            .unwrap();

        let relations = store.sheet_with_relations(sheet.id).unwrap();
        let a = relations.line_items.iter().find(|l| l.id == line_a.id).unwrap();
        let b = relations.line_items.iter().find(|l| l.id == line_b.id).unwrap();
        assert_eq!(a.attachment_id, None);
        assert_eq!(b.attachment_id, Some(attachment.id));
        assert_eq!(
            relations.attachments[0].linked_line_item_id,
            Some(line_b.id)
        );
    }

    #[test]
    fn cross_sheet_link_is_rejected() {
        let store = LedgerStore::new();
        let actor = preparer();
        let sheet_a = store.create_sheet(new_sheet("1"), &actor).unwrap();
        let sheet_b = store.create_sheet(new_sheet("2"), &actor).unwrap();
        let foreign_line = store
            .add_line_item(
                sheet_b.id,
                NewLineItem::expense("P", "d", dec!(1), dec!(1), dec!(0)),
                ExpectedVersion::Any,
                &actor,
            )
            .unwrap();
        let attachment = store
            .add_attachment(
                sheet_a.id,
                NewAttachment {
                    file_name: "f".to_string(),
                    attachment_type: "RECEIPT".to_string(),
                    link_to_line: None,
                },
                ExpectedVersion::Any,
                &actor,
            )
            .unwrap();

        let err = store
            .link_attachment(attachment.id, foreign_line.id, ExpectedVersion::Any, &actor)
            .unwrap_err();
        assert_eq!(err.issues()[0].code, IssueCode::AttachmentLinkInvalid);
    }

    #[test]
    fn delete_cascades_and_annotates_paid_reports() {
        let reports = Arc::new(InMemoryReportDirectory::new());
        let store = LedgerStore::with_report_directory(reports.clone());
        let actor = preparer();
        let sheet = store.create_sheet(new_sheet("1"), &actor).unwrap();
        store
            .add_line_item(
                sheet.id,
                NewLineItem::expense("P", "d", dec!(1), dec!(1), dec!(0)),
                ExpectedVersion::Any,
                &actor,
            )
            .unwrap();
        store
            .record_ready_attempt(sheet.id, true, &passing_decision_log(), ExpectedVersion::Any, &actor)
            .unwrap();
        let report_id = ReportId::new();
        store
            .link_to_report(sheet.id, report_id, ExpectedVersion::Any, &actor)
            .unwrap();
        reports.mark_paid(report_id);

        store
            .delete_sheet(
                sheet.id,
                Some("filed in error".to_string()),
                ExpectedVersion::Any,
                &actor,
            )
            .unwrap();

        assert!(matches!(
            store.sheet(sheet.id).unwrap_err(),
            LedgerError::NotFound { .. }
        ));
        let trail = store.audit_trail(sheet.id).unwrap();
        let annotation = trail.last().unwrap();
        assert_eq!(annotation.event_type, "sheet.delete_annotation");
        assert_eq!(
            annotation.payload["reason"],
            serde_json::json!("filed in error")
        );
        // Children are gone with the sheet.
        assert!(store
            .sheets_for_case(&CaseRef::new("1"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn paid_to_date_ignores_deleted_and_future_payments() {
        let store = LedgerStore::new();
        let actor = preparer();
        let case = CaseRef::new("77");
        let now = Utc::now();

        assert_eq!(store.paid_to_date(&case, now).unwrap(), None);

        store
            .record_payment(
                NewPayment {
                    case_ref: case.clone(),
                    amount: dec!(100),
                    paid_at: now - Duration::days(10),
                    reference: None,
                    note: None,
                },
                &actor,
            )
            .unwrap();
        let late = store
            .record_payment(
                NewPayment {
                    case_ref: case.clone(),
                    amount: dec!(50),
                    paid_at: now + Duration::days(10),
                    reference: None,
                    note: None,
                },
                &actor,
            )
            .unwrap();
        let removed = store
            .record_payment(
                NewPayment {
                    case_ref: case.clone(),
                    amount: dec!(30),
                    paid_at: now - Duration::days(5),
                    reference: None,
                    note: None,
                },
                &actor,
            )
            .unwrap();
        store.soft_delete_payment(removed.id, &actor).unwrap();

        assert_eq!(store.paid_to_date(&case, now).unwrap(), Some(dec!(100)));
        assert_eq!(
            store
                .paid_to_date(&case, now + Duration::days(30))
                .unwrap(),
            Some(dec!(150))
        );
        let _ = late;
    }

    #[test]
    fn integrity_check_passes_on_untampered_sheets() {
        let store = LedgerStore::new();
        let actor = preparer();
        let sheet = store.create_sheet(new_sheet("1"), &actor).unwrap();
        store
            .add_line_item(
                sheet.id,
                NewLineItem::expense("P", "d", dec!(2), dec!(50), dec!(17)),
                ExpectedVersion::Any,
                &actor,
            )
            .unwrap();
        store.verify_sheet_integrity(sheet.id).unwrap();
    }

    #[test]
    fn store_round_trips_with_the_validation_engine() {
        let store = LedgerStore::new();
        let actor = preparer();
        let sheet = store.create_sheet(new_sheet("1"), &actor).unwrap();
        store
            .register_ruleset(InsurerRuleset {
                id: RulesetId::new(),
                insurer: "Migdal".to_string(),
                version: 1,
                policy_family: PolicyFamily::Strict,
                required_attachment_types: vec!["RECEIPT".to_string()],
                required_expense_types: vec![],
                amount_threshold: Some(dec!(200)),
            })
            .unwrap();
        store
            .add_line_item(
                sheet.id,
                NewLineItem::expense("Clinic", "MRI", dec!(1), dec!(900), dec!(17)),
                ExpectedVersion::Any,
                &actor,
            )
            .unwrap();

        let relations = store.sheet_with_relations(sheet.id).unwrap();
        let ruleset = store.ruleset_for_insurer("migdal").unwrap().unwrap();
        let outcome = validate(
            ValidationMode::Draft,
            &relations.sheet,
            &relations.line_items,
            &relations.attachments,
            Some(&ruleset),
            None,
            Utc::now(),
        );
        assert!(!outcome.passed());

        // Record the failed attempt; it must not change sheet state.
        let before = store.sheet(sheet.id).unwrap();
        store
            .record_ready_attempt(
                sheet.id,
                outcome.passed(),
                &outcome.decision_log,
                ExpectedVersion::Exact(before.sheet_version_number),
                &actor,
            )
            .unwrap();
        let after = store.sheet(sheet.id).unwrap();
        assert_eq!(after.status, SheetStatus::Draft);
        assert_eq!(after.sheet_version_number, before.sheet_version_number);
    }
}
