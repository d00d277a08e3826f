//! FCR recomputation and the derived-series cache.
//!
//! The cached series per flock is a pull-based view: readers get the last
//! published series, recomputing on a cache miss. Resolving a report drops
//! the cached series and approvals trigger a recompute. Recomputes for one flock are
//! serialised so a stale snapshot never overwrites a fresher one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cohort::{self, WeekCohort};
use crate::config::GrowthCurve;
use crate::error::FcrError;
use crate::fcr::{self, FcrClass, FcrPoint, FcrSummary};
use crate::ledger::FlockHealth;
use crate::store::FarmStore;

// ---

/// Result of a single flock recompute.
#[derive(Debug)]
pub enum Recomputed {
    Published {
        cohorts: Vec<WeekCohort>,
        points: Vec<FcrPoint>,
        computed_at: DateTime<Utc>,
    },
    /// Cancelled before publishing; the prior series is untouched.
    Abandoned,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlockOutcome {
    /// `weeks` can exceed `points` when zero-weight weeks were left out.
    Updated {
        flock_id: Uuid,
        weeks: usize,
        points: usize,
    },
    Failed { flock_id: Uuid, error: String },
    Cancelled { flock_id: Uuid },
}

impl FlockOutcome {
    pub fn flock_id(&self) -> Uuid {
        match self {
            Self::Updated { flock_id, .. }
            | Self::Failed { flock_id, .. }
            | Self::Cancelled { flock_id } => *flock_id,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecalcReport {
    // ---
    pub results: Vec<FlockOutcome>,
    /// Flocks never started because the run was cancelled.
    pub skipped: Vec<Uuid>,
    pub cancelled: bool,
}

impl RecalcReport {
    // ---
    pub fn failed(&self) -> Vec<Uuid> {
        self.results
            .iter()
            .filter(|o| matches!(o, FlockOutcome::Failed { .. }))
            .map(FlockOutcome::flock_id)
            .collect()
    }

    /// `Err(PartialRecomputeFailure)` when any flock failed.
    pub fn ensure_complete(&self) -> Result<(), FcrError> {
        let failed = self.failed();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(FcrError::PartialRecomputeFailure { failed })
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PointView {
    #[serde(flatten)]
    pub point: FcrPoint,
    pub class: FcrClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStatus {
    Ok,
    NoData,
}

/// Dashboard-facing view of one flock's analytics.
#[derive(Debug, Clone, Serialize)]
pub struct FlockFcrView {
    // ---
    pub flock_id: Uuid,
    pub status: SeriesStatus,
    pub points: Vec<PointView>,
    pub summary: Option<FcrSummary>,
    pub health: FlockHealth,
    /// When the served series was published; `None` if nothing was.
    pub computed_at: Option<DateTime<Utc>>,
}

pub struct Recalculator {
    store: Arc<dyn FarmStore>,
    curve: GrowthCurve,
    flock_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    shutdown: Arc<AtomicBool>,
}

impl Recalculator {
    // ---
    pub fn new(store: Arc<dyn FarmStore>, curve: GrowthCurve) -> Self {
        Self {
            store,
            curve,
            flock_locks: Mutex::new(HashMap::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag raised on shutdown; global runs stop at the next flock boundary.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    async fn flock_lock(&self, flock_id: Uuid) -> Arc<Mutex<()>> {
        self.flock_locks
            .lock()
            .await
            .entry(flock_id)
            .or_default()
            .clone()
    }

    /// Drop the flock's lock entry once no other task holds or waits on it.
    async fn release_lock(&self, flock_id: Uuid, lock: Arc<Mutex<()>>) {
        // ---
        let mut locks = self.flock_locks.lock().await;
        // Clones are only handed out under `flock_locks`, so the map's copy
        // plus ours means nobody else can reach this entry.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&flock_id);
        }
    }

    /// Rebuild and publish one flock's series from a consistent snapshot.
    pub async fn recompute_flock(
        &self,
        flock_id: Uuid,
        cancelled: &AtomicBool,
    ) -> Result<Recomputed, FcrError> {
        // ---
        let lock = self.flock_lock(flock_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.recompute_locked(flock_id, cancelled).await
        };
        self.release_lock(flock_id, lock).await;
        result
    }

    async fn recompute_locked(
        &self,
        flock_id: Uuid,
        cancelled: &AtomicBool,
    ) -> Result<Recomputed, FcrError> {
        // ---
        let snapshot = self
            .store
            .load_snapshot(flock_id)
            .await?
            .ok_or_else(|| FcrError::flock_not_found(flock_id))?;

        let curve = GrowthCurve::resolve(&self.curve, &snapshot.flock.growth_override);
        let cohorts = cohort::aggregate(flock_id, &snapshot.reports, &snapshot.samples, &curve)?;
        let points = fcr::compute(&cohorts);

        if cancelled.load(Ordering::Relaxed) {
            debug!(%flock_id, "recompute cancelled before publish");
            return Ok(Recomputed::Abandoned);
        }

        let computed_at = self.store.replace_series(flock_id, &points).await?;
        debug!(%flock_id, weeks = cohorts.len(), points = points.len(), "published FCR series");
        Ok(Recomputed::Published {
            cohorts,
            points,
            computed_at,
        })
    }

    /// Recompute one flock, or every flock with reports when `scope` is `None`.
    ///
    /// A scoped run on an unknown flock fails with `NotFound`. Otherwise
    /// per-flock failures are collected in the report and never abort the run.
    pub async fn recalculate(
        &self,
        scope: Option<Uuid>,
        cancelled: &AtomicBool,
    ) -> Result<RecalcReport, FcrError> {
        // ---
        let flocks = match scope {
            Some(flock_id) => vec![flock_id],
            None => self.store.flocks_with_reports().await?,
        };
        info!(
            scope = ?scope,
            flocks = flocks.len(),
            backend = self.store.backend_tag(),
            "starting FCR recalculation"
        );

        let mut report = RecalcReport::default();
        for (i, flock_id) in flocks.iter().copied().enumerate() {
            if cancelled.load(Ordering::Relaxed) {
                warn!(remaining = flocks.len() - i, "recalculation cancelled");
                report.cancelled = true;
                report.skipped.extend_from_slice(&flocks[i..]);
                break;
            }

            match self.recompute_flock(flock_id, cancelled).await {
                Ok(Recomputed::Published {
                    cohorts, points, ..
                }) => {
                    report.results.push(FlockOutcome::Updated {
                        flock_id,
                        weeks: cohorts.len(),
                        points: points.len(),
                    });
                }
                Ok(Recomputed::Abandoned) => {
                    report.results.push(FlockOutcome::Cancelled { flock_id });
                    report.cancelled = true;
                    report.skipped.extend_from_slice(&flocks[i + 1..]);
                    break;
                }
                Err(e @ FcrError::NotFound { .. }) if scope.is_some() => return Err(e),
                Err(e) => {
                    error!(%flock_id, error = %e, "FCR recompute failed, keeping previous series");
                    report.results.push(FlockOutcome::Failed {
                        flock_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            updated = report.results.len() - report.failed().len(),
            failed = report.failed().len(),
            cancelled = report.cancelled,
            "FCR recalculation finished"
        );
        Ok(report)
    }

    /// Fire-and-forget recompute after an approval. If it fails or is
    /// abandoned the flock's cache stays empty and the next view recomputes.
    pub fn spawn_recompute(self: &Arc<Self>, flock_id: Uuid) -> JoinHandle<()> {
        // ---
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let shutdown = this.shutdown_flag();
            match this.recompute_flock(flock_id, &shutdown).await {
                Ok(Recomputed::Published { .. }) => {}
                Ok(Recomputed::Abandoned) => {
                    warn!(%flock_id, "background FCR recompute abandoned at shutdown");
                }
                Err(e) => error!(%flock_id, error = %e, "background FCR recompute failed"),
            }
        })
    }

    /// Cached series with summary and flock health; recomputes on a miss.
    pub async fn flock_view(&self, flock_id: Uuid) -> Result<FlockFcrView, FcrError> {
        // ---
        let flock = self
            .store
            .find_flock(flock_id)
            .await?
            .ok_or_else(|| FcrError::flock_not_found(flock_id))?;

        let (points, computed_at) = match self.store.cached_series(flock_id).await? {
            Some(cached) => (cached.points, Some(cached.computed_at)),
            None => {
                debug!(%flock_id, "FCR cache miss");
                match self.recompute_flock(flock_id, &AtomicBool::new(false)).await? {
                    Recomputed::Published {
                        points,
                        computed_at,
                        ..
                    } => (points, Some(computed_at)),
                    Recomputed::Abandoned => (Vec::new(), None),
                }
            }
        };

        let summary = fcr::summarize(&points);
        let status = if points.is_empty() {
            SeriesStatus::NoData
        } else {
            SeriesStatus::Ok
        };

        Ok(FlockFcrView {
            flock_id,
            status,
            points: points
                .into_iter()
                .map(|point| PointView {
                    class: point.class(),
                    point,
                })
                .collect(),
            summary,
            health: FlockHealth::of(&flock),
            computed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::config::GrowthCurveOverride;
    use crate::models::{NewReport, NewWeightSample, ReportStatus};
    use crate::store::memory::MemoryStore;
    use crate::store::{Resolution, ResolveOutcome};
    use chrono::{Duration, NaiveDate};

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 5).unwrap() + Duration::days(offset)
    }

    async fn submit(store: &MemoryStore, flock_id: Uuid, offset: i64, feed: f64) -> Uuid {
        // ---
        store
            .submit_report(NewReport {
                flock_id,
                report_date: day(offset),
                mortality_count: 0,
                feed_consumed_kg: Some(feed),
                clinical_signs: None,
            })
            .await
            .unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Recalculator) {
        let store = Arc::new(MemoryStore::default());
        let recalc = Recalculator::new(store.clone(), GrowthCurve::default());
        (store, recalc)
    }

    fn not_cancelled() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[tokio::test]
    async fn test_synthetic_series_for_unweighed_flock() {
        // ---
        let (store, recalc) = setup();
        let flock = store.add_flock(1000).await;
        submit(&store, flock, 0, 50.0).await;
        submit(&store, flock, 7, 60.0).await;

        let Recomputed::Published { points, .. } =
            recalc.recompute_flock(flock, &not_cancelled()).await.unwrap()
        else {
            panic!("expected a published series");
        };

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].fcr, 172.41);
        assert_eq!(points[1].cumulative_feed_kg, 110.0);
        assert!((points[1].effective_weight_kg - 0.54).abs() < 1e-9);
        assert_eq!(points[1].fcr, 203.7);
    }

    #[tokio::test]
    async fn test_observed_weight_overrides_fallback_on_recompute() {
        // ---
        let (store, recalc) = setup();
        let flock = store.add_flock(1000).await;
        submit(&store, flock, 0, 50.0).await;
        submit(&store, flock, 7, 60.0).await;
        recalc.recompute_flock(flock, &not_cancelled()).await.unwrap();

        store
            .add_sample(NewWeightSample {
                flock_id: flock,
                sample_date: day(8),
                weight_kg: 0.9,
            })
            .await
            .unwrap();
        recalc.recompute_flock(flock, &not_cancelled()).await.unwrap();

        let cached = store.cached_series(flock).await.unwrap().unwrap().points;
        assert_eq!(cached[0].fcr, 172.41);
        assert_eq!(cached[1].effective_weight_kg, 0.9);
        assert_eq!(cached[1].fcr, 122.22);
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        // ---
        let (store, recalc) = setup();
        let flock = store.add_flock(500).await;
        submit(&store, flock, 0, 20.0).await;
        submit(&store, flock, 12, 25.0).await;

        recalc.recalculate(Some(flock), &not_cancelled()).await.unwrap();
        let first = store.cached_series(flock).await.unwrap().unwrap();
        recalc.recalculate(Some(flock), &not_cancelled()).await.unwrap();
        let second = store.cached_series(flock).await.unwrap().unwrap();

        assert_eq!(first.points, second.points);
        assert!(second.computed_at >= first.computed_at);
    }

    #[tokio::test]
    async fn test_global_run_covers_every_flock_with_reports() {
        // ---
        let (store, recalc) = setup();
        let a = store.add_flock(100).await;
        let b = store.add_flock(200).await;
        let idle = store.add_flock(300).await;
        submit(&store, a, 0, 5.0).await;
        submit(&store, b, 3, 8.0).await;

        let report = recalc.recalculate(None, &not_cancelled()).await.unwrap();

        assert_eq!(report.results.len(), 2);
        assert!(report.ensure_complete().is_ok());
        assert!(store.cached_series(a).await.unwrap().is_some());
        assert!(store.cached_series(b).await.unwrap().is_some());
        assert!(store.cached_series(idle).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_one_failing_flock_does_not_abort_batch() {
        // ---
        let (store, recalc) = setup();
        let good = store.add_flock(100).await;
        let flaky = store.add_flock(100).await;
        submit(&store, good, 0, 5.0).await;
        submit(&store, flaky, 0, 7.0).await;

        recalc.recalculate(None, &not_cancelled()).await.unwrap();
        let before = store.cached_series(flaky).await.unwrap();

        submit(&store, flaky, 7, 9.0).await;
        store.fail_loads_for(flaky).await;
        let report = recalc.recalculate(None, &not_cancelled()).await.unwrap();

        assert_eq!(report.failed(), vec![flaky]);
        assert!(matches!(
            report.ensure_complete(),
            Err(FcrError::PartialRecomputeFailure { ref failed }) if failed == &vec![flaky]
        ));
        assert!(report
            .results
            .iter()
            .any(|o| matches!(o, FlockOutcome::Updated { flock_id, .. } if *flock_id == good)));
        // last-known-good series survives
        assert_eq!(store.cached_series(flaky).await.unwrap(), before);

        store.heal(flaky).await;
        let report = recalc.recalculate(Some(flaky), &not_cancelled()).await.unwrap();
        assert!(report.ensure_complete().is_ok());
        assert_eq!(store.cached_series(flaky).await.unwrap().unwrap().points.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_series_untouched() {
        // ---
        let (store, recalc) = setup();
        let a = store.add_flock(100).await;
        let b = store.add_flock(100).await;
        submit(&store, a, 0, 5.0).await;
        submit(&store, b, 0, 5.0).await;

        let cancelled = AtomicBool::new(true);
        let report = recalc.recalculate(None, &cancelled).await.unwrap();

        assert!(report.cancelled);
        assert!(report.results.is_empty());
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(store.series_writes.load(Ordering::Relaxed), 0);

        let outcome = recalc.recompute_flock(a, &cancelled).await.unwrap();
        assert!(matches!(outcome, Recomputed::Abandoned));
        assert!(store.cached_series(a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scoped_run_on_unknown_flock_is_not_found() {
        // ---
        let (_store, recalc) = setup();
        let err = recalc
            .recalculate(Some(Uuid::new_v4()), &not_cancelled())
            .await
            .unwrap_err();
        assert!(matches!(err, FcrError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_flock_growth_override_changes_fallback() {
        // ---
        let (store, recalc) = setup();
        let flock = store.add_flock(100).await;
        store
            .set_growth_override(
                flock,
                GrowthCurveOverride {
                    base_kg: Some(0.0),
                    kg_per_week: Some(0.5),
                },
            )
            .await;
        submit(&store, flock, 0, 10.0).await;

        let view = recalc.flock_view(flock).await.unwrap();
        assert_eq!(view.points[0].point.effective_weight_kg, 0.5);
        assert_eq!(view.points[0].point.fcr, 20.0);
    }

    #[tokio::test]
    async fn test_zero_growth_curve_publishes_no_points() {
        // ---
        let store = Arc::new(MemoryStore::default());
        let recalc = Recalculator::new(store.clone(), GrowthCurve::new(0.0, 0.0).unwrap());
        let flock = store.add_flock(100).await;
        submit(&store, flock, 0, 10.0).await;

        let view = recalc.flock_view(flock).await.unwrap();
        assert_eq!(view.status, SeriesStatus::NoData);
        assert!(view.summary.is_none());
    }

    #[tokio::test]
    async fn test_view_of_flock_without_reports_is_no_data() {
        // ---
        let (store, recalc) = setup();
        let flock = store.add_flock(250).await;

        let view = recalc.flock_view(flock).await.unwrap();
        assert_eq!(view.status, SeriesStatus::NoData);
        assert!(view.points.is_empty());
        assert_eq!(view.health.current_count, 250);
    }

    #[tokio::test]
    async fn test_rejected_reports_stay_out_of_recompute() {
        // ---
        let (store, recalc) = setup();
        let flock = store.add_flock(100).await;
        let rejected = submit(&store, flock, 0, 400.0).await;
        submit(&store, flock, 1, 10.0).await;
        let outcome = store
            .resolve_report(
                rejected,
                &Resolution {
                    target: ReportStatus::Rejected,
                    approver_id: Uuid::new_v4(),
                    vet_notes: None,
                    diagnosis_category: None,
                },
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ResolveOutcome::Applied { .. }));

        let view = recalc.flock_view(flock).await.unwrap();
        assert_eq!(view.points.len(), 1);
        assert_eq!(view.points[0].point.cumulative_feed_kg, 10.0);
    }

    #[tokio::test]
    async fn test_flock_locks_are_released_after_recompute() {
        // ---
        let (store, recalc) = setup();
        let a = store.add_flock(100).await;
        let b = store.add_flock(100).await;
        submit(&store, a, 0, 5.0).await;
        submit(&store, b, 0, 5.0).await;

        recalc.recalculate(None, &not_cancelled()).await.unwrap();
        assert!(recalc.flock_locks.lock().await.is_empty());

        store.fail_loads_for(a).await;
        recalc.recalculate(None, &not_cancelled()).await.unwrap();
        assert!(recalc.flock_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_view_reports_when_series_was_computed() {
        // ---
        let (store, recalc) = setup();
        let flock = store.add_flock(100).await;
        submit(&store, flock, 0, 5.0).await;

        let before = Utc::now();
        let view = recalc.flock_view(flock).await.unwrap();
        let computed_at = view.computed_at.unwrap();
        assert!(computed_at >= before);

        // served from cache the second time, same timestamp
        let again = recalc.flock_view(flock).await.unwrap();
        assert_eq!(again.computed_at, Some(computed_at));
        assert_eq!(store.series_writes.load(Ordering::Relaxed), 1);
    }
}
