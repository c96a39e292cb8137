//! Entity model of the expense ledger.

pub mod attachment;
pub mod audit;
pub mod line_item;
pub mod payment;
pub mod ruleset;
pub mod sheet;

pub use attachment::Attachment;
pub use audit::{AuditActor, AuditEntityType, AuditEvent};
pub use line_item::{CompensationSource, LineItem, LineKind};
pub use payment::PaymentEvent;
pub use ruleset::{InsurerRuleset, PolicyFamily};
pub use sheet::{ArchivedReason, Sheet, SheetStatus};
