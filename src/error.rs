//! Error taxonomy for the approval workflow and the FCR pipeline.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Report, ReportStatus};

// ---

/// Storage-layer failures. Kept separate from domain errors so a transient
/// store fault can be reported per flock during a batch recompute.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row in {table}: {detail}")]
    CorruptRow { table: &'static str, detail: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable(e.to_string())
            }
            other => Self::Database(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Report,
    Flock,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Report => f.write_str("report"),
            Self::Flock => f.write_str("flock"),
        }
    }
}

#[derive(Error, Debug)]
pub enum FcrError {
    /// The report already left `pending`. Carries the report as it is now so
    /// the caller can show the resolved state.
    #[error("report {} is already {} and cannot become {attempted}", .current.id, .current.status)]
    InvalidStateTransition {
        current: Box<Report>,
        attempted: ReportStatus,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: Uuid },

    #[error("{field} must not be negative (got {value})")]
    NegativeQuantity { field: &'static str, value: f64 },

    /// A report or sample dated before its flock started, or in the future.
    #[error("{field} {date} is outside {earliest}..={latest}")]
    DateOutOfRange {
        field: &'static str,
        date: NaiveDate,
        earliest: NaiveDate,
        latest: NaiveDate,
    },

    #[error("week {week} of flock {flock_id} has no resolvable average weight")]
    AggregationGap { flock_id: Uuid, week: u32 },

    #[error("recompute failed for {} flock(s)", .failed.len())]
    PartialRecomputeFailure { failed: Vec<Uuid> },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FcrError {
    // ---
    pub fn report_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: Entity::Report,
            id,
        }
    }

    pub fn flock_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: Entity::Flock,
            id,
        }
    }
}
