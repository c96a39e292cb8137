//! `lexledger-core` — domain foundation for the expense ledger engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the error taxonomy, the actor/role model, the
//! validation-issue vocabulary, the entity model, and the read-only boundary
//! trait toward the report store.

pub mod actor;
pub mod boundary;
pub mod error;
pub mod id;
pub mod issue;
pub mod model;

pub use actor::{Actor, Role};
pub use boundary::{InMemoryReportDirectory, ReportDirectory, ReportStatus};
pub use error::{LedgerError, LedgerResult};
pub use id::{
    AttachmentId, AuditEventId, CaseRef, LineItemId, PaymentEventId, ReportId, RulesetId, SheetId,
    UserId,
};
pub use issue::{IssueCode, IssueScope, IssueSeverity, ValidationIssue};
