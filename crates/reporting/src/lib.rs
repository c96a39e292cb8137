//! `lexledger-reporting` — point-in-time aggregation and operational views.
//!
//! Builds the cumulative, legally-reportable expense table for a case as of
//! any instant, plus the admin-gated KPI views dashboards consume. Everything
//! here is a pure read over the ledger store; formatting stays with the
//! excluded report-rendering collaborator.

pub mod cache;
pub mod kpis;
pub mod snapshot;

pub use cache::SnapshotCache;
pub use kpis::{
    ExceptionBuckets, FinancialKpis, FinancialSheetListItem, KpiThresholds, financial_kpis,
    sheet_list,
};
pub use snapshot::{CumulativeSnapshot, RenderOptions, build_cumulative_snapshot};
