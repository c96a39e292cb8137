//! End-to-end flow across the store, the rule engine and the aggregator:
//! prepare a sheet, validate it, take it through its lifecycle, and build the
//! cumulative table the final report renders from.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use lexledger_calc::sheet_totals;
use lexledger_core::model::{InsurerRuleset, PolicyFamily, SheetStatus};
use lexledger_core::{Actor, CaseRef, LedgerError, ReportId, RulesetId};
use lexledger_reporting::build_cumulative_snapshot;
use lexledger_rules::{ReportSnapshot, ValidationMode, validate};
use lexledger_store::{
    ExpectedVersion, LedgerStore, NewAttachment, NewLineItem, NewPayment, NewSheet,
};

fn new_sheet(case: &str) -> NewSheet {
    NewSheet {
        case_ref: CaseRef::new(case),
        insurer: "Menora".to_string(),
        period_label: "2024-H1".to_string(),
        currency: "ILS".to_string(),
        deductible_amount: Decimal::ZERO,
        already_paid_amount: Decimal::ZERO,
        info_only: false,
    }
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn strict_ruleset() -> InsurerRuleset {
    InsurerRuleset {
        id: RulesetId::new(),
        insurer: "Menora".to_string(),
        version: 1,
        policy_family: PolicyFamily::Strict,
        required_attachment_types: vec!["RECEIPT".to_string()],
        required_expense_types: vec![],
        amount_threshold: Some(dec!(500)),
    }
}

#[test]
fn full_report_round_from_draft_to_cumulative_table() {
    let store = LedgerStore::new();
    let preparer = Actor::preparer("Noa");
    store.register_ruleset(strict_ruleset()).unwrap();

    // Round one: a sheet that was already used in an earlier report.
    let old_sheet = store.create_sheet(new_sheet("123"), &preparer).unwrap();
    let mut old_line =
        NewLineItem::expense("Pharmacy", "medication", dec!(1), dec!(50), Decimal::ZERO);
    old_line.date = Some(date("2024-01-01"));
    store
        .add_line_item(old_sheet.id, old_line, ExpectedVersion::Any, &preparer)
        .unwrap();

    // Round two: the sheet being prepared now.
    let sheet = store.create_sheet(new_sheet("123"), &preparer).unwrap();
    assert_eq!(sheet.version_index, 2);
    let mut line = NewLineItem::expense("Hospital", "imaging", dec!(2), dec!(35), dec!(0));
    line.date = Some(date("2024-02-01"));
    let line = store
        .add_line_item(sheet.id, line, ExpectedVersion::Any, &preparer)
        .unwrap();
    assert_eq!(line.total_amount, dec!(70.00));

    // First ready attempt: blocked, the line is under threshold but a big one
    // without evidence is not.
    let mut big = NewLineItem::expense("Hospital", "surgery", dec!(1), dec!(800), dec!(0));
    big.date = Some(date("2024-02-10"));
    let big = store
        .add_line_item(sheet.id, big, ExpectedVersion::Any, &preparer)
        .unwrap();

    let relations = store.sheet_with_relations(sheet.id).unwrap();
    let ruleset = store.ruleset_for_insurer("Menora").unwrap().unwrap();
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
    store
        .record_ready_attempt(
            sheet.id,
            outcome.passed(),
            &outcome.decision_log,
            ExpectedVersion::Any,
            &preparer,
        )
        .unwrap();
    assert_eq!(store.sheet(sheet.id).unwrap().status, SheetStatus::Draft);

    // Attach the receipt and retry: passes now.
    store
        .add_attachment(
            sheet.id,
            NewAttachment {
                file_name: "surgery-receipt.pdf".to_string(),
                attachment_type: "RECEIPT".to_string(),
                link_to_line: Some(big.id),
            },
            ExpectedVersion::Any,
            &preparer,
        )
        .unwrap();
    let relations = store.sheet_with_relations(sheet.id).unwrap();
    let outcome = validate(
        ValidationMode::Draft,
        &relations.sheet,
        &relations.line_items,
        &relations.attachments,
        Some(&ruleset),
        None,
        Utc::now(),
    );
    assert!(outcome.passed());
    let ready = store
        .record_ready_attempt(
            sheet.id,
            true,
            &outcome.decision_log,
            ExpectedVersion::Exact(relations.sheet.sheet_version_number),
            &preparer,
        )
        .unwrap();
    assert_eq!(ready.status, SheetStatus::ReadyForReport);

    // Link to the outgoing report and snapshot the hash for SEND.
    let report_id = ReportId::new();
    let attached = store
        .link_to_report(sheet.id, report_id, ExpectedVersion::Any, &preparer)
        .unwrap();
    let frozen = ReportSnapshot {
        sheet_version_number: attached.sheet_version_number,
        sheet_version_hash: attached.sheet_version_hash.clone(),
    };
    let send_check = validate(
        ValidationMode::Send,
        &attached,
        &relations.line_items,
        &relations.attachments,
        None,
        Some(&frozen),
        Utc::now(),
    );
    assert!(send_check.passed());

    // A payment arrives on the case ledger.
    store
        .record_payment(
            NewPayment {
                case_ref: CaseRef::new("123"),
                amount: dec!(200),
                paid_at: Utc::now(),
                reference: Some("bank 4471".to_string()),
                note: None,
            },
            &preparer,
        )
        .unwrap();

    // The cumulative table: old round's expense line first, then this
    // round's, with paid-to-date from the payment ledger.
    let snapshot = build_cumulative_snapshot(&store, sheet.id, Utc::now())
        .unwrap()
        .expect("sheet exists");
    assert_eq!(snapshot.all_lines.len(), 3);
    assert_eq!(snapshot.all_lines[0].date, Some(date("2024-01-01")));
    assert_eq!(snapshot.effective_sheet.already_paid_amount, dec!(200));

    let totals = sheet_totals(&snapshot.effective_sheet, &snapshot.all_lines);
    assert_eq!(totals.gross_expenses_total, dec!(920.00));
    // 920 included minus the 200 paid to date.
    assert_eq!(totals.amount_to_request, dec!(720.00));

    // The audit trail tells the whole story, ready attempts included.
    let trail = store.audit_trail(sheet.id).unwrap();
    let event_types: Vec<&str> = trail.iter().map(|e| e.event_type.as_str()).collect();
    assert!(event_types.contains(&"sheet.created"));
    assert!(event_types.contains(&"sheet.ready_attempt"));
    assert!(event_types.contains(&"attachment.created"));
    assert!(event_types.contains(&"sheet.linked_to_report"));
    assert_eq!(
        trail
            .iter()
            .filter(|e| e.event_type == "sheet.ready_attempt")
            .count(),
        2
    );
}

#[test]
fn concurrent_editors_cannot_both_win() {
    let store = LedgerStore::new();
    let preparer = Actor::preparer("Noa");
    let admin = Actor::admin("Omer");

    let sheet = store.create_sheet(new_sheet("9"), &preparer).unwrap();
    let seen_by_both = store.sheet(sheet.id).unwrap().sheet_version_number;

    store
        .add_line_item(
            sheet.id,
            NewLineItem::expense("A", "first", dec!(1), dec!(10), Decimal::ZERO),
            ExpectedVersion::Exact(seen_by_both),
            &preparer,
        )
        .unwrap();

    let err = store
        .add_line_item(
            sheet.id,
            NewLineItem::expense("B", "second", dec!(1), dec!(20), Decimal::ZERO),
            ExpectedVersion::Exact(seen_by_both),
            &admin,
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::ConcurrencyConflict { .. }));

    // The loser re-reads and retries.
    let fresh = store.sheet(sheet.id).unwrap();
    store
        .add_line_item(
            sheet.id,
            NewLineItem::expense("B", "second", dec!(1), dec!(20), Decimal::ZERO),
            ExpectedVersion::Exact(fresh.sheet_version_number),
            &admin,
        )
        .unwrap();
    assert_eq!(
        store.sheet_with_relations(sheet.id).unwrap().line_items.len(),
        2
    );
}
