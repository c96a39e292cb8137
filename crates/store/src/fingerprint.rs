//! Content fingerprint of a sheet and its children.
//!
//! The fingerprint is the version hash stored on the sheet: SHA-256 over a
//! canonical JSON rendering of the sheet's content fields plus its line items
//! and attachments in id order. Bookkeeping fields (version number, the hash
//! itself, timestamps) are excluded so the hash changes if and only if the
//! content does.

use serde_json::json;
use sha2::{Digest, Sha256};

use lexledger_core::model::{Attachment, LineItem, Sheet};

/// Compute the content hash for a sheet snapshot.
///
/// `serde_json::Value` objects serialize with sorted keys, and children are
/// sorted by id here, so the rendering is canonical: identical content always
/// produces an identical hash regardless of map iteration order.
pub fn sheet_fingerprint(sheet: &Sheet, lines: &[LineItem], attachments: &[Attachment]) -> String {
    let mut lines: Vec<&LineItem> = lines.iter().collect();
    lines.sort_by_key(|l| l.id.to_string());
    let mut attachments: Vec<&Attachment> = attachments.iter().collect();
    attachments.sort_by_key(|a| a.id.to_string());

    let content = json!({
        "sheet": {
            "id": sheet.id,
            "case_ref": sheet.case_ref.normalized(),
            "insurer": sheet.insurer,
            "period_label": sheet.period_label,
            "version_index": sheet.version_index,
            "status": sheet.status,
            "archived_reason": sheet.archived_reason,
            "currency": sheet.currency,
            "deductible_amount": sheet.deductible_amount,
            "already_paid_amount": sheet.already_paid_amount,
            "info_only": sheet.info_only,
            "attached_report_id": sheet.attached_report_id,
        },
        "lines": lines.iter().map(|l| json!({
            "id": l.id,
            "kind": l.kind,
            "description": l.description,
            "expense_type": l.expense_type,
            "date": l.date,
            "quantity": l.quantity,
            "unit_price": l.unit_price,
            "vat_rate": l.vat_rate,
            "included_in_request": l.included_in_request,
            "net_amount": l.net_amount,
            "vat_amount": l.vat_amount,
            "total_amount": l.total_amount,
            "attachment_id": l.attachment_id,
        })).collect::<Vec<_>>(),
        "attachments": attachments.iter().map(|a| json!({
            "id": a.id,
            "file_name": a.file_name,
            "attachment_type": a.attachment_type,
            "linked_line_item_id": a.linked_line_item_id,
        })).collect::<Vec<_>>(),
    });

    let rendered = content.to_string();
    let digest = Sha256::digest(rendered.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use core::fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use lexledger_core::model::SheetStatus;
    use lexledger_core::{CaseRef, SheetId, UserId};

    fn sheet() -> Sheet {
        Sheet {
            id: SheetId::new(),
            case_ref: CaseRef::new("AB 12"),
            insurer: "Harel".to_string(),
            period_label: "2024".to_string(),
            version_index: 1,
            status: SheetStatus::Draft,
            archived_reason: None,
            currency: "ILS".to_string(),
            deductible_amount: Decimal::ZERO,
            already_paid_amount: Decimal::ZERO,
            info_only: false,
            attached_report_id: None,
            sheet_version_number: 1,
            sheet_version_hash: String::new(),
            created_by: UserId::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            ready_at: None,
            attached_at: None,
        }
    }

    #[test]
    fn fingerprint_is_stable_for_identical_content() {
        let s = sheet();
        assert_eq!(
            sheet_fingerprint(&s, &[], &[]),
            sheet_fingerprint(&s, &[], &[])
        );
    }

    #[test]
    fn fingerprint_ignores_bookkeeping_fields() {
        let a = sheet();
        let mut b = a.clone();
        b.sheet_version_number = 99;
        b.sheet_version_hash = "whatever".to_string();
        b.updated_at = Utc::now();
        assert_eq!(
            sheet_fingerprint(&a, &[], &[]),
            sheet_fingerprint(&b, &[], &[])
        );
    }

    #[test]
    fn fingerprint_tracks_content_changes() {
        let a = sheet();
        let mut b = a.clone();
        b.deductible_amount = Decimal::ONE;
        assert_ne!(
            sheet_fingerprint(&a, &[], &[]),
            sheet_fingerprint(&b, &[], &[])
        );
    }
}
