//! Database schema management for `flock-fcr`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// `flocks`, `farm_reports` and `weight_samples` are written by the keeper and
/// flock-management workflows; this service only transitions report status
/// and moves the flock counters. `fcr_series` with `fcr_series_meta` is the
/// derived-series cache, keyed by flock. Safe to call on every startup.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flocks (
            id                 UUID PRIMARY KEY,
            batch_size         INTEGER NOT NULL CHECK (batch_size > 0),
            current_count      INTEGER NOT NULL CHECK (current_count >= 0),
            mortality_count    INTEGER NOT NULL DEFAULT 0 CHECK (mortality_count >= 0),
            start_date         DATE    NOT NULL,
            status             TEXT    NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'growing', 'harvesting', 'completed')),
            growth_base_kg     DOUBLE PRECISION,
            growth_kg_per_week DOUBLE PRECISION,
            created_at         TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Negative quantities never reach this table.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS farm_reports (
            id                 UUID PRIMARY KEY,
            flock_id           UUID        NOT NULL,
            report_date        DATE        NOT NULL,
            mortality_count    INTEGER     NOT NULL DEFAULT 0 CHECK (mortality_count >= 0),
            feed_consumed_kg   DOUBLE PRECISION CHECK (feed_consumed_kg >= 0),
            clinical_signs     TEXT,
            status             TEXT        NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected')),
            approver_id        UUID,
            vet_notes          TEXT,
            diagnosis_category TEXT,
            created_at         TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS weight_samples (
            id          UUID PRIMARY KEY,
            flock_id    UUID             NOT NULL,
            sample_date DATE             NOT NULL,
            weight_kg   DOUBLE PRECISION NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fcr_series (
            flock_id            UUID             NOT NULL,
            week                INTEGER          NOT NULL CHECK (week >= 1),
            cumulative_feed_kg  DOUBLE PRECISION NOT NULL,
            effective_weight_kg DOUBLE PRECISION NOT NULL,
            fcr                 DOUBLE PRECISION NOT NULL,
            PRIMARY KEY (flock_id, week)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fcr_series_meta (
            flock_id    UUID PRIMARY KEY,
            point_count INTEGER     NOT NULL,
            computed_at TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_farm_reports_flock_date
            ON farm_reports (flock_id, report_date);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_weight_samples_flock_date
            ON weight_samples (flock_id, sample_date);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
