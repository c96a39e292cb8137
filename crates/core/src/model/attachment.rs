//! Evidentiary attachments uploaded against a sheet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{AttachmentId, LineItemId, SheetId, UserId};

/// Uploaded evidentiary file, owned by a sheet, optionally linked 1:1 to one
/// line item. The link is mirrored by `LineItem::attachment_id`; relinking
/// atomically clears the previous link on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub sheet_id: SheetId,
    pub file_name: String,
    /// Insurer-facing document category, e.g. "RECEIPT" or "INVOICE".
    pub attachment_type: String,
    pub linked_line_item_id: Option<LineItemId>,
    pub uploaded_by: UserId,
    pub uploaded_at: DateTime<Utc>,
}
