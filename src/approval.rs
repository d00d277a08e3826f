//! Report approval state machine.
//!
//! `pending -> approved` and `pending -> rejected` are the only legal moves.
//! Approval applies the report's mortality to the flock ledger and triggers
//! an FCR recompute; rejection leaves the ledger alone. Either one drops the
//! flock's cached series, since pending reports feed the analytics.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::FcrError;
use crate::ledger::FlockHealth;
use crate::models::{DiagnosisCategory, Flock, Report, ReportStatus};
use crate::recalc::{Recalculator, Recomputed};
use crate::store::{FarmStore, ResolveOutcome, Resolution};

// ---

/// Whether `from -> to` is a legal report transition.
pub fn can_transition(from: ReportStatus, to: ReportStatus) -> bool {
    matches!(
        (from, to),
        (ReportStatus::Pending, ReportStatus::Approved) | (ReportStatus::Pending, ReportStatus::Rejected)
    )
}

/// What happened to the FCR series after an approval.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecalcDispatch {
    /// Running on a spawned task.
    Scheduled,
    Completed { points: usize },
    /// Stopped by shutdown before publishing. The next read recomputes.
    Abandoned,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalReceipt {
    // ---
    pub report: Report,
    pub flock: FlockHealth,
    pub recalculation: RecalcDispatch,
}

pub struct ApprovalDesk {
    store: Arc<dyn FarmStore>,
    recalculator: Arc<Recalculator>,
    background: bool,
}

impl ApprovalDesk {
    // ---
    pub fn new(store: Arc<dyn FarmStore>, recalculator: Arc<Recalculator>, background: bool) -> Self {
        Self {
            store,
            recalculator,
            background,
        }
    }

    pub async fn approve(
        &self,
        report_id: Uuid,
        approver_id: Uuid,
        vet_notes: Option<String>,
        diagnosis_category: Option<DiagnosisCategory>,
    ) -> Result<ApprovalReceipt, FcrError> {
        // ---
        let resolution = Resolution {
            target: ReportStatus::Approved,
            approver_id,
            vet_notes,
            diagnosis_category,
        };
        let (report, flock) = self.resolve(report_id, &resolution).await?;

        info!(
            %report_id,
            flock_id = %flock.id,
            mortality = report.mortality_count,
            current_count = flock.current_count,
            "report approved"
        );

        let recalculation = self.trigger_recompute(flock.id).await;
        Ok(ApprovalReceipt {
            report,
            flock: FlockHealth::of(&flock),
            recalculation,
        })
    }

    pub async fn reject(
        &self,
        report_id: Uuid,
        approver_id: Uuid,
        vet_notes: Option<String>,
    ) -> Result<Report, FcrError> {
        // ---
        let resolution = Resolution {
            target: ReportStatus::Rejected,
            approver_id,
            vet_notes,
            diagnosis_category: None,
        };
        let (report, _) = self.resolve(report_id, &resolution).await?;
        info!(%report_id, flock_id = %report.flock_id, "report rejected");
        Ok(report)
    }

    async fn resolve(
        &self,
        report_id: Uuid,
        resolution: &Resolution,
    ) -> Result<(Report, Flock), FcrError> {
        // ---
        // Cheap pre-check; the store's guarded update is what settles races.
        let current = self
            .store
            .find_report(report_id)
            .await?
            .ok_or_else(|| FcrError::report_not_found(report_id))?;
        if !can_transition(current.status, resolution.target) {
            return Err(already_resolved(current, resolution.target));
        }

        match self.store.resolve_report(report_id, resolution).await? {
            ResolveOutcome::Applied { report, flock } => Ok((report, flock)),
            ResolveOutcome::AlreadyResolved(current) => Err(already_resolved(current, resolution.target)),
            ResolveOutcome::ReportMissing => Err(FcrError::report_not_found(report_id)),
            ResolveOutcome::FlockMissing => Err(FcrError::flock_not_found(current.flock_id)),
        }
    }

    async fn trigger_recompute(&self, flock_id: Uuid) -> RecalcDispatch {
        // ---
        if self.background {
            self.recalculator.spawn_recompute(flock_id);
            return RecalcDispatch::Scheduled;
        }

        let shutdown = self.recalculator.shutdown_flag();
        match self.recalculator.recompute_flock(flock_id, &shutdown).await {
            Ok(Recomputed::Published { points, .. }) => RecalcDispatch::Completed {
                points: points.len(),
            },
            Ok(Recomputed::Abandoned) => {
                warn!(%flock_id, "FCR recompute after approval abandoned at shutdown");
                RecalcDispatch::Abandoned
            }
            Err(e) => {
                error!(%flock_id, error = %e, "FCR recompute after approval failed");
                RecalcDispatch::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

fn already_resolved(current: Report, attempted: ReportStatus) -> FcrError {
    warn!(
        report_id = %current.id,
        status = %current.status,
        attempted = %attempted,
        "rejected transition on resolved report"
    );
    FcrError::InvalidStateTransition {
        current: Box::new(current),
        attempted,
    }
}
