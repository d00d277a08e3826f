use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{CachedSeries, FarmStore, FlockSnapshot, ResolveOutcome, Resolution};
use crate::config::GrowthCurveOverride;
use crate::error::StoreError;
use crate::fcr::FcrPoint;
use crate::ledger::MortalityDelta;
use crate::models::{Flock, Report, ReportStatus, WeightSample};

const REPORT_COLUMNS: &str = "id, flock_id, report_date, mortality_count, feed_consumed_kg, \
     clinical_signs, status, approver_id, vet_notes, diagnosis_category, created_at";

const FLOCK_COLUMNS: &str = "id, batch_size, current_count, mortality_count, start_date, status, \
     growth_base_kg, growth_kg_per_week";

// ---

/// `FarmStore` backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    // ---
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FarmStore for PgStore {
    // ---
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn find_report(&self, id: Uuid) -> Result<Option<Report>, StoreError> {
        // ---
        let row = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM farm_reports WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(report_from_row).transpose()
    }

    async fn find_flock(&self, id: Uuid) -> Result<Option<Flock>, StoreError> {
        // ---
        let row = sqlx::query(&format!("SELECT {FLOCK_COLUMNS} FROM flocks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(flock_from_row).transpose()
    }

    async fn insert_report(&self, report: &Report) -> Result<(), StoreError> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO farm_reports (
                id, flock_id, report_date, mortality_count, feed_consumed_kg,
                clinical_signs, status, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(report.id)
        .bind(report.flock_id)
        .bind(report.report_date)
        .bind(report.mortality_count)
        .bind(report.feed_consumed_kg)
        .bind(&report.clinical_signs)
        .bind(report.status.as_str())
        .bind(report.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_sample(&self, sample: &WeightSample) -> Result<(), StoreError> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO weight_samples (id, flock_id, sample_date, weight_kg)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(sample.id)
        .bind(sample.flock_id)
        .bind(sample.sample_date)
        .bind(sample.weight_kg)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn resolve_report(
        &self,
        id: Uuid,
        resolution: &Resolution,
    ) -> Result<ResolveOutcome, StoreError> {
        // ---
        let mut tx = self.pool.begin().await?;

        // Guarded transition: only one caller can move a report out of pending.
        let updated = sqlx::query(&format!(
            r#"
            UPDATE farm_reports
               SET status = $2, approver_id = $3, vet_notes = $4, diagnosis_category = $5
             WHERE id = $1 AND status = 'pending'
            RETURNING {REPORT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(resolution.target.as_str())
        .bind(resolution.approver_id)
        .bind(&resolution.vet_notes)
        .bind(resolution.diagnosis_category.map(|d| d.as_str()))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = updated else {
            tx.rollback().await?;
            return Ok(match self.find_report(id).await? {
                Some(current) => ResolveOutcome::AlreadyResolved(current),
                None => ResolveOutcome::ReportMissing,
            });
        };
        let report = report_from_row(&row)?;

        let delta = match report.status {
            ReportStatus::Approved => MortalityDelta::from_reported(report.mortality_count),
            _ => MortalityDelta::from_reported(0),
        };

        // Single conditional increment/decrement; the row lock serialises
        // concurrent approvals for the same flock.
        let flock_row = if !delta.is_zero() {
            sqlx::query(&format!(
                r#"
                UPDATE flocks
                   SET current_count   = GREATEST(current_count - $2, 0),
                       mortality_count = mortality_count + $2
                 WHERE id = $1
                RETURNING {FLOCK_COLUMNS}
                "#
            ))
            .bind(report.flock_id)
            .bind(delta.get())
            .fetch_optional(&mut *tx)
            .await?
        } else {
            sqlx::query(&format!("SELECT {FLOCK_COLUMNS} FROM flocks WHERE id = $1"))
                .bind(report.flock_id)
                .fetch_optional(&mut *tx)
                .await?
        };

        let Some(flock_row) = flock_row else {
            tx.rollback().await?;
            return Ok(ResolveOutcome::FlockMissing);
        };
        let flock = flock_from_row(&flock_row)?;

        // Without the meta row the cached series reads as a miss.
        sqlx::query("DELETE FROM fcr_series_meta WHERE flock_id = $1")
            .bind(flock.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ResolveOutcome::Applied { report, flock })
    }

    async fn load_snapshot(&self, flock_id: Uuid) -> Result<Option<FlockSnapshot>, StoreError> {
        // ---
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let flock_row = sqlx::query(&format!("SELECT {FLOCK_COLUMNS} FROM flocks WHERE id = $1"))
            .bind(flock_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(flock_row) = flock_row else {
            tx.commit().await?;
            return Ok(None);
        };
        let flock = flock_from_row(&flock_row)?;

        let reports = sqlx::query(&format!(
            r#"
            SELECT {REPORT_COLUMNS} FROM farm_reports
             WHERE flock_id = $1 AND status IN ('pending', 'approved')
             ORDER BY report_date, created_at
            "#
        ))
        .bind(flock_id)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(report_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        let samples = sqlx::query(
            r#"
            SELECT id, flock_id, sample_date, weight_kg FROM weight_samples
             WHERE flock_id = $1 AND weight_kg > 0
             ORDER BY sample_date
            "#,
        )
        .bind(flock_id)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(sample_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        tx.commit().await?;
        Ok(Some(FlockSnapshot {
            flock,
            reports,
            samples,
        }))
    }

    async fn flocks_with_reports(&self) -> Result<Vec<Uuid>, StoreError> {
        // ---
        let rows = sqlx::query("SELECT DISTINCT flock_id FROM farm_reports ORDER BY flock_id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| r.try_get::<Uuid, _>("flock_id").map_err(StoreError::from))
            .collect()
    }

    async fn replace_series(
        &self,
        flock_id: Uuid,
        points: &[FcrPoint],
    ) -> Result<DateTime<Utc>, StoreError> {
        // ---
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM fcr_series WHERE flock_id = $1")
            .bind(flock_id)
            .execute(&mut *tx)
            .await?;

        for point in points {
            sqlx::query(
                r#"
                INSERT INTO fcr_series (flock_id, week, cumulative_feed_kg, effective_weight_kg, fcr)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(flock_id)
            .bind(point.week as i32)
            .bind(point.cumulative_feed_kg)
            .bind(point.effective_weight_kg)
            .bind(point.fcr)
            .execute(&mut *tx)
            .await?;
        }

        let computed_at: DateTime<Utc> = sqlx::query(
            r#"
            INSERT INTO fcr_series_meta (flock_id, point_count, computed_at)
            VALUES ($1, $2, now())
            ON CONFLICT (flock_id) DO UPDATE SET
                point_count = EXCLUDED.point_count,
                computed_at = EXCLUDED.computed_at
            RETURNING computed_at
            "#,
        )
        .bind(flock_id)
        .bind(points.len() as i32)
        .fetch_one(&mut *tx)
        .await?
        .try_get("computed_at")?;

        tx.commit().await?;
        Ok(computed_at)
    }

    async fn cached_series(&self, flock_id: Uuid) -> Result<Option<CachedSeries>, StoreError> {
        // ---
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let meta = sqlx::query("SELECT computed_at FROM fcr_series_meta WHERE flock_id = $1")
            .bind(flock_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(meta) = meta else {
            tx.commit().await?;
            return Ok(None);
        };
        let computed_at: DateTime<Utc> = meta.try_get("computed_at")?;

        let rows = sqlx::query(
            r#"
            SELECT week, cumulative_feed_kg, effective_weight_kg, fcr
              FROM fcr_series WHERE flock_id = $1 ORDER BY week
            "#,
        )
        .bind(flock_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            let week: i32 = row.try_get("week")?;
            points.push(FcrPoint {
                week: u32::try_from(week).map_err(|_| corrupt("fcr_series", "negative week"))?,
                cumulative_feed_kg: row.try_get("cumulative_feed_kg")?,
                effective_weight_kg: row.try_get("effective_weight_kg")?,
                fcr: row.try_get("fcr")?,
            });
        }
        Ok(Some(CachedSeries {
            points,
            computed_at,
        }))
    }
}

// ---

fn corrupt(table: &'static str, detail: impl Into<String>) -> StoreError {
    StoreError::CorruptRow {
        table,
        detail: detail.into(),
    }
}

fn report_from_row(row: &PgRow) -> Result<Report, StoreError> {
    // ---
    let status: String = row.try_get("status")?;
    let diagnosis: Option<String> = row.try_get("diagnosis_category")?;

    Ok(Report {
        id: row.try_get("id")?,
        flock_id: row.try_get("flock_id")?,
        report_date: row.try_get("report_date")?,
        mortality_count: row.try_get("mortality_count")?,
        feed_consumed_kg: row.try_get("feed_consumed_kg")?,
        clinical_signs: row.try_get("clinical_signs")?,
        status: status.parse().map_err(|e: String| corrupt("farm_reports", e))?,
        approver_id: row.try_get("approver_id")?,
        vet_notes: row.try_get("vet_notes")?,
        diagnosis_category: diagnosis
            .map(|d| d.parse())
            .transpose()
            .map_err(|e: String| corrupt("farm_reports", e))?,
        created_at: row.try_get("created_at")?,
    })
}

fn flock_from_row(row: &PgRow) -> Result<Flock, StoreError> {
    // ---
    let status: String = row.try_get("status")?;

    Ok(Flock {
        id: row.try_get("id")?,
        batch_size: row.try_get("batch_size")?,
        current_count: row.try_get("current_count")?,
        mortality_count: row.try_get("mortality_count")?,
        start_date: row.try_get("start_date")?,
        status: status.parse().map_err(|e: String| corrupt("flocks", e))?,
        growth_override: GrowthCurveOverride {
            base_kg: row.try_get("growth_base_kg")?,
            kg_per_week: row.try_get("growth_kg_per_week")?,
        },
    })
}

fn sample_from_row(row: &PgRow) -> Result<WeightSample, StoreError> {
    Ok(WeightSample {
        id: row.try_get("id")?,
        flock_id: row.try_get("flock_id")?,
        sample_date: row.try_get("sample_date")?,
        weight_kg: row.try_get("weight_kg")?,
    })
}
