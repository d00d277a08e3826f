//! Flock inventory ledger.
//!
//! `current_count` and `mortality_count` only move through approved reports.
//! The arithmetic lives here; stores apply it inside a single atomic update
//! (a conditional `UPDATE ... SET x = x - $n` in Postgres, a held lock in
//! memory), never as a read-then-write pair.

use serde::Serialize;
use uuid::Uuid;

use crate::fcr::round2;
use crate::models::Flock;

// ---

/// Mortality to apply to a flock, clamped to be non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MortalityDelta(i32);

impl MortalityDelta {
    // ---
    pub fn from_reported(mortality_count: i32) -> Self {
        Self(mortality_count.max(0))
    }

    pub fn get(&self) -> i32 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Apply the delta: decrement live birds (floored at 0), increment
    /// cumulative mortality by the same amount. In-process counterpart of the
    /// `GREATEST(current_count - n, 0)` update `PgStore` runs.
    #[cfg(test)]
    pub fn apply(&self, flock: &mut Flock) {
        // ---
        flock.current_count = flock.current_count.saturating_sub(self.0).max(0);
        flock.mortality_count = flock.mortality_count.saturating_add(self.0);
    }
}

/// Read-only health view of a flock for dashboards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FlockHealth {
    // ---
    pub flock_id: Uuid,
    pub batch_size: i32,
    pub current_count: i32,
    pub mortality_count: i32,
    pub mortality_rate_pct: f64,
    pub survival_rate_pct: f64,
    pub conserved: bool,
}

impl FlockHealth {
    // ---
    pub fn of(flock: &Flock) -> Self {
        // ---
        let (mortality_rate_pct, survival_rate_pct) = if flock.batch_size > 0 {
            let batch = f64::from(flock.batch_size);
            (
                round2(f64::from(flock.mortality_count) / batch * 100.0),
                round2(f64::from(flock.current_count) / batch * 100.0),
            )
        } else {
            (0.0, 0.0)
        };

        FlockHealth {
            flock_id: flock.id,
            batch_size: flock.batch_size,
            current_count: flock.current_count,
            mortality_count: flock.mortality_count,
            mortality_rate_pct,
            survival_rate_pct,
            conserved: is_conserved(flock),
        }
    }
}

/// `current_count + mortality_count == batch_size`.
pub fn is_conserved(flock: &Flock) -> bool {
    i64::from(flock.current_count) + i64::from(flock.mortality_count) == i64::from(flock.batch_size)
}
