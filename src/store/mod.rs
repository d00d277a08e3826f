//! Storage seam for reports, flocks, weight samples and cached FCR series.
//!
//! Every method that mutates state does so atomically: a report is resolved
//! and its mortality applied to the flock in one unit, and a flock's cached
//! series is replaced as a whole or not at all. Resolving a report drops the
//! flock's cached series in the same unit, so a view never serves a series
//! older than the last resolution.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::fcr::FcrPoint;
use crate::models::{DiagnosisCategory, Flock, Report, ReportStatus, WeightSample};

#[cfg(test)]
pub mod memory;
mod postgres;

pub use postgres::PgStore;

// ---

/// A terminal decision on a pending report.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    // ---
    pub target: ReportStatus,
    pub approver_id: Uuid,
    pub vet_notes: Option<String>,
    pub diagnosis_category: Option<DiagnosisCategory>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// The guarded update won. `flock` holds the ledger after any mortality
    /// was applied.
    Applied { report: Report, flock: Flock },
    /// The report was no longer pending; nothing changed.
    AlreadyResolved(Report),
    ReportMissing,
    FlockMissing,
}

/// Consistent read of everything the aggregator needs for one flock.
#[derive(Debug, Clone)]
pub struct FlockSnapshot {
    // ---
    pub flock: Flock,
    pub reports: Vec<Report>,
    pub samples: Vec<WeightSample>,
}

/// A published series and when it was computed.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSeries {
    // ---
    pub points: Vec<FcrPoint>,
    pub computed_at: DateTime<Utc>,
}

#[async_trait]
pub trait FarmStore: Send + Sync {
    // ---
    fn backend_tag(&self) -> &'static str;

    async fn find_report(&self, id: Uuid) -> Result<Option<Report>, StoreError>;

    async fn find_flock(&self, id: Uuid) -> Result<Option<Flock>, StoreError>;

    /// Persist a validated pending report.
    async fn insert_report(&self, report: &Report) -> Result<(), StoreError>;

    async fn insert_sample(&self, sample: &WeightSample) -> Result<(), StoreError>;

    /// Move a report out of `pending` only if it is still `pending`, applying
    /// an approval's mortality to its flock and dropping the flock's cached
    /// series in the same atomic unit.
    async fn resolve_report(
        &self,
        id: Uuid,
        resolution: &Resolution,
    ) -> Result<ResolveOutcome, StoreError>;

    /// Read the flock, its reports and its weight samples from one snapshot.
    /// `None` when the flock does not exist.
    async fn load_snapshot(&self, flock_id: Uuid) -> Result<Option<FlockSnapshot>, StoreError>;

    /// Flocks with at least one report, in a stable order.
    async fn flocks_with_reports(&self) -> Result<Vec<Uuid>, StoreError>;

    /// Replace the whole cached series for a flock, returning its timestamp.
    async fn replace_series(
        &self,
        flock_id: Uuid,
        points: &[FcrPoint],
    ) -> Result<DateTime<Utc>, StoreError>;

    /// `None` when the series was never computed or has been invalidated.
    async fn cached_series(&self, flock_id: Uuid) -> Result<Option<CachedSeries>, StoreError>;
}
