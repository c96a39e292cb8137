//! Append-only audit log entries.
//!
//! The sole mechanism for reconstructing "what happened and when". Entries are
//! never updated or deleted; failed ready attempts are recorded just like
//! successful ones, with the decision log embedded in the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::actor::{Actor, Role};
use crate::id::{AuditEventId, SheetId, UserId};

/// What kind of entity a mutation touched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEntityType {
    Sheet,
    LineItem,
    Attachment,
    PaymentEvent,
}

/// Actor identity frozen at event time (names and roles change; the log does
/// not).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditActor {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

impl From<&Actor> for AuditActor {
    fn from(actor: &Actor) -> Self {
        Self {
            id: actor.id,
            name: actor.name.clone(),
            role: actor.role,
        }
    }
}

/// One immutable record per mutation or validation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    /// Global append order across the whole store.
    pub seq: u64,
    pub actor: AuditActor,
    /// Dotted event type, e.g. `sheet.created`, `line_item.updated`,
    /// `sheet.ready_attempt`.
    pub event_type: String,
    pub entity_type: AuditEntityType,
    pub entity_id: String,
    /// Before/after diff of only the changed fields, or an embedded decision
    /// log for ready attempts.
    pub payload: JsonValue,
    /// Owning sheet, when the entity is sheet-scoped. Payment events are
    /// case-scoped and carry no sheet context.
    pub sheet_id: Option<SheetId>,
    /// Sheet version bookkeeping *at the time of the event*.
    pub sheet_version_number: Option<u64>,
    pub sheet_version_hash: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
