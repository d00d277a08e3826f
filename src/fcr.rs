//! Feed-conversion ratio series, classification and summaries.

use serde::{Deserialize, Serialize};

use crate::cohort::WeekCohort;

// ---

/// Fixed FCR bands. Lower is better.
pub const EXCELLENT_BELOW: f64 = 1.8;
pub const GOOD_BELOW: f64 = 2.2;
pub const AVERAGE_BELOW: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FcrClass {
    Excellent,
    Good,
    Average,
    Poor,
}

impl FcrClass {
    // ---
    pub fn of(fcr: f64) -> Self {
        if fcr < EXCELLENT_BELOW {
            Self::Excellent
        } else if fcr < GOOD_BELOW {
            Self::Good
        } else if fcr < AVERAGE_BELOW {
            Self::Average
        } else {
            Self::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcrPoint {
    // ---
    pub week: u32,
    pub cumulative_feed_kg: f64,
    pub effective_weight_kg: f64,
    pub fcr: f64,
}

impl FcrPoint {
    pub fn class(&self) -> FcrClass {
        FcrClass::of(self.fcr)
    }
}

/// Convert cohorts into FCR points. Weeks whose effective weight is zero
/// have no defined ratio and are left out.
pub fn compute(cohorts: &[WeekCohort]) -> Vec<FcrPoint> {
    // ---
    cohorts
        .iter()
        .filter(|c| c.effective_weight_kg > 0.0)
        .map(|c| FcrPoint {
            week: c.week,
            cumulative_feed_kg: c.cumulative_feed_kg,
            effective_weight_kg: c.effective_weight_kg,
            fcr: round2(c.cumulative_feed_kg / c.effective_weight_kg),
        })
        .filter(|p| p.fcr.is_finite())
        .collect()
}

/// Scalar KPIs over a series. `None` when the series is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FcrSummary {
    // ---
    pub average_fcr: f64,
    pub best_fcr: f64,
    pub latest_fcr: f64,
    pub latest_class: FcrClass,
    pub latest_weight_kg: f64,
    pub latest_week: u32,
}

pub fn summarize(points: &[FcrPoint]) -> Option<FcrSummary> {
    // ---
    let latest = points.iter().max_by_key(|p| p.week)?;
    let total: f64 = points.iter().map(|p| p.fcr).sum();
    let best = points.iter().map(|p| p.fcr).fold(f64::INFINITY, f64::min);

    Some(FcrSummary {
        average_fcr: round2(total / points.len() as f64),
        best_fcr: best,
        latest_fcr: latest.fcr,
        latest_class: latest.class(),
        latest_weight_kg: latest.effective_weight_kg,
        latest_week: latest.week,
    })
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
