//! Strongly-typed identifiers used across the ledger engine.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// Identifier of an expense sheet (one "report round" for a case).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(Uuid);

/// Identifier of a line item inside a sheet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItemId(Uuid);

/// Identifier of an uploaded evidentiary attachment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(Uuid);

/// Identifier of a case-scoped payment ledger event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentEventId(Uuid);

/// Identifier of an outgoing report (owned by the report store, consumed read-only).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(Uuid);

/// Identifier of an insurer ruleset.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RulesetId(Uuid);

/// Identifier of an audit log entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEventId(Uuid);

/// Identifier of a user (actor identity).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| LedgerError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(SheetId, "SheetId");
impl_uuid_newtype!(LineItemId, "LineItemId");
impl_uuid_newtype!(AttachmentId, "AttachmentId");
impl_uuid_newtype!(PaymentEventId, "PaymentEventId");
impl_uuid_newtype!(ReportId, "ReportId");
impl_uuid_newtype!(RulesetId, "RulesetId");
impl_uuid_newtype!(AuditEventId, "AuditEventId");
impl_uuid_newtype!(UserId, "UserId");

/// Free-text case identifier as entered by users.
///
/// Case numbers arrive from the case-folder store with inconsistent casing and
/// whitespace ("AB 123 / 4" vs "ab123/4"-style variants). Equality, hashing
/// and case-grouping all go through [`CaseRef::normalized`]; the raw text is
/// preserved for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseRef(String);

impl CaseRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw text as entered.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical comparison form: trimmed, inner whitespace removed, lowercased.
    pub fn normalized(&self) -> String {
        self.0
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(|c| c.to_lowercase())
            .collect()
    }

    pub fn same_case(&self, other: &CaseRef) -> bool {
        self.normalized() == other.normalized()
    }
}

impl PartialEq for CaseRef {
    fn eq(&self, other: &Self) -> bool {
        self.same_case(other)
    }
}

impl Eq for CaseRef {}

impl core::hash::Hash for CaseRef {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl core::fmt::Display for CaseRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaseRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_refs_compare_normalized() {
        let a = CaseRef::new("  AB 123/4 ");
        let b = CaseRef::new("ab123/4");
        assert_eq!(a, b);
        assert_eq!(a.normalized(), "ab123/4");
        assert_eq!(a.as_str(), "  AB 123/4 ");
    }

    #[test]
    fn distinct_cases_stay_distinct() {
        assert_ne!(CaseRef::new("123"), CaseRef::new("124"));
    }
}
