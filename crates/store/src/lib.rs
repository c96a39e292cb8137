//! `lexledger-store` — the versioned, audit-logged ledger store.
//!
//! Single writer of truth for sheets, line items, attachments and payment
//! events. Every mutation atomically applies the change, bumps the sheet
//! version, recomputes the content fingerprint and appends one immutable
//! audit entry. Readers always observe a consistent snapshot.

pub mod audit;
pub mod fingerprint;
pub mod store;

pub use store::{
    ExpectedVersion, LedgerStore, LineItemPatch, NewAttachment, NewLineItem, NewPayment, NewSheet,
    SheetMetaPatch, SheetWithRelations,
};
