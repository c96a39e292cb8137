//! Read-only boundary toward the report/case-folder collaborator.
//!
//! The ledger never writes report state; it only reads the attached report's
//! send/paid status to gate delete-with-reason annotations and to compute SLA
//! timings.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ReportId;

/// Snapshot of an outgoing report's lifecycle as known to the report store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStatus {
    pub sent_at: Option<DateTime<Utc>>,
    pub paid: bool,
}

/// Read-only lookup of report send/paid status.
pub trait ReportDirectory: Send + Sync {
    /// Returns `None` when the report id is unknown to the report store.
    fn report_status(&self, report_id: ReportId) -> Option<ReportStatus>;
}

impl<R> ReportDirectory for Arc<R>
where
    R: ReportDirectory + ?Sized,
{
    fn report_status(&self, report_id: ReportId) -> Option<ReportStatus> {
        (**self).report_status(report_id)
    }
}

/// In-memory report directory for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryReportDirectory {
    reports: RwLock<HashMap<ReportId, ReportStatus>>,
}

impl InMemoryReportDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, report_id: ReportId, status: ReportStatus) {
        if let Ok(mut reports) = self.reports.write() {
            reports.insert(report_id, status);
        }
    }

    pub fn mark_sent(&self, report_id: ReportId, sent_at: DateTime<Utc>) {
        if let Ok(mut reports) = self.reports.write() {
            let entry = reports.entry(report_id).or_insert(ReportStatus {
                sent_at: None,
                paid: false,
            });
            entry.sent_at = Some(sent_at);
        }
    }

    pub fn mark_paid(&self, report_id: ReportId) {
        if let Ok(mut reports) = self.reports.write() {
            let entry = reports.entry(report_id).or_insert(ReportStatus {
                sent_at: None,
                paid: false,
            });
            entry.paid = true;
        }
    }
}

impl ReportDirectory for InMemoryReportDirectory {
    fn report_status(&self, report_id: ReportId) -> Option<ReportStatus> {
        self.reports
            .read()
            .ok()
            .and_then(|reports| reports.get(&report_id).cloned())
    }
}
