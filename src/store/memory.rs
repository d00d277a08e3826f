//! In-memory `FarmStore` used by unit tests.
//!
//! A single async mutex guards all tables, so every trait method observes and
//! mutates one consistent state, mirroring the transactional Postgres store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CachedSeries, FarmStore, FlockSnapshot, ResolveOutcome, Resolution};
use crate::config::GrowthCurveOverride;
use crate::error::{FcrError, StoreError};
use crate::fcr::FcrPoint;
use crate::ledger::MortalityDelta;
use crate::models::{
    Flock, FlockStatus, NewReport, NewWeightSample, Report, ReportStatus, WeightSample,
};

#[derive(Default)]
struct Tables {
    flocks: HashMap<Uuid, Flock>,
    reports: HashMap<Uuid, Report>,
    samples: Vec<WeightSample>,
    series: HashMap<Uuid, CachedSeries>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Flocks whose snapshot loads fail with `Unavailable`.
    pub failing_loads: Mutex<HashSet<Uuid>>,
    pub series_writes: AtomicU64,
    /// Artificial latency inside `resolve_report`, while the lock is held.
    pub resolve_delay: Duration,
}

impl MemoryStore {
    // ---
    pub fn with_resolve_delay(resolve_delay: Duration) -> Self {
        Self {
            resolve_delay,
            ..Self::default()
        }
    }

    pub async fn add_flock(&self, batch_size: i32) -> Uuid {
        self.add_flock_started(batch_size, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default())
            .await
    }

    pub async fn add_flock_started(&self, batch_size: i32, start_date: NaiveDate) -> Uuid {
        // ---
        let flock = Flock {
            id: Uuid::new_v4(),
            batch_size,
            current_count: batch_size,
            mortality_count: 0,
            start_date,
            status: FlockStatus::Growing,
            growth_override: GrowthCurveOverride::default(),
        };
        let id = flock.id;
        self.tables.lock().await.flocks.insert(id, flock);
        id
    }

    pub async fn set_growth_override(&self, flock_id: Uuid, over: GrowthCurveOverride) {
        if let Some(flock) = self.tables.lock().await.flocks.get_mut(&flock_id) {
            flock.growth_override = over;
        }
    }

    pub async fn submit_report(&self, new: NewReport) -> Result<Uuid, FcrError> {
        // ---
        let report = new.into_pending()?;
        self.insert_report(&report).await?;
        Ok(report.id)
    }

    pub async fn add_sample(&self, new: NewWeightSample) -> Result<(), FcrError> {
        // ---
        let sample = new.into_sample()?;
        self.insert_sample(&sample).await?;
        Ok(())
    }

    pub async fn fail_loads_for(&self, flock_id: Uuid) {
        self.failing_loads.lock().await.insert(flock_id);
    }

    pub async fn heal(&self, flock_id: Uuid) {
        self.failing_loads.lock().await.remove(&flock_id);
    }
}

#[async_trait]
impl FarmStore for MemoryStore {
    // ---
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn find_report(&self, id: Uuid) -> Result<Option<Report>, StoreError> {
        Ok(self.tables.lock().await.reports.get(&id).cloned())
    }

    async fn find_flock(&self, id: Uuid) -> Result<Option<Flock>, StoreError> {
        Ok(self.tables.lock().await.flocks.get(&id).cloned())
    }

    async fn insert_report(&self, report: &Report) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .reports
            .insert(report.id, report.clone());
        Ok(())
    }

    async fn insert_sample(&self, sample: &WeightSample) -> Result<(), StoreError> {
        self.tables.lock().await.samples.push(sample.clone());
        Ok(())
    }

    async fn resolve_report(
        &self,
        id: Uuid,
        resolution: &Resolution,
    ) -> Result<ResolveOutcome, StoreError> {
        // ---
        let mut tables = self.tables.lock().await;
        if !self.resolve_delay.is_zero() {
            tokio::time::sleep(self.resolve_delay).await;
        }

        let Some(report) = tables.reports.get(&id).cloned() else {
            return Ok(ResolveOutcome::ReportMissing);
        };
        if report.status != ReportStatus::Pending {
            return Ok(ResolveOutcome::AlreadyResolved(report));
        }
        let Some(mut flock) = tables.flocks.get(&report.flock_id).cloned() else {
            return Ok(ResolveOutcome::FlockMissing);
        };

        let mut report = report;
        report.status = resolution.target;
        report.approver_id = Some(resolution.approver_id);
        report.vet_notes = resolution.vet_notes.clone();
        report.diagnosis_category = resolution.diagnosis_category;

        if report.status == ReportStatus::Approved {
            MortalityDelta::from_reported(report.mortality_count).apply(&mut flock);
        }

        tables.flocks.insert(flock.id, flock.clone());
        tables.reports.insert(id, report.clone());
        tables.series.remove(&flock.id);
        Ok(ResolveOutcome::Applied { report, flock })
    }

    async fn load_snapshot(&self, flock_id: Uuid) -> Result<Option<FlockSnapshot>, StoreError> {
        // ---
        if self.failing_loads.lock().await.contains(&flock_id) {
            return Err(StoreError::Unavailable(format!(
                "injected failure for flock {flock_id}"
            )));
        }

        let tables = self.tables.lock().await;
        let Some(flock) = tables.flocks.get(&flock_id).cloned() else {
            return Ok(None);
        };
        let reports = tables
            .reports
            .values()
            .filter(|r| r.flock_id == flock_id && r.status.counts_toward_analytics())
            .cloned()
            .collect();
        let samples = tables
            .samples
            .iter()
            .filter(|s| s.flock_id == flock_id)
            .cloned()
            .collect();

        Ok(Some(FlockSnapshot {
            flock,
            reports,
            samples,
        }))
    }

    async fn flocks_with_reports(&self) -> Result<Vec<Uuid>, StoreError> {
        // ---
        let tables = self.tables.lock().await;
        let ids: BTreeMap<Uuid, ()> = tables.reports.values().map(|r| (r.flock_id, ())).collect();
        Ok(ids.into_keys().collect())
    }

    async fn replace_series(
        &self,
        flock_id: Uuid,
        points: &[FcrPoint],
    ) -> Result<DateTime<Utc>, StoreError> {
        // ---
        self.series_writes.fetch_add(1, Ordering::Relaxed);
        let computed_at = Utc::now();
        self.tables.lock().await.series.insert(
            flock_id,
            CachedSeries {
                points: points.to_vec(),
                computed_at,
            },
        );
        Ok(computed_at)
    }

    async fn cached_series(&self, flock_id: Uuid) -> Result<Option<CachedSeries>, StoreError> {
        Ok(self.tables.lock().await.series.get(&flock_id).cloned())
    }
}
