//! Week-indexed cohort aggregation for one flock.
//!
//! Reports and weight samples are bucketed into 7-day windows counted from
//! the flock's earliest analytic report (`t0`). Feed is summed per week and
//! accumulated; weight is averaged per week and gaps are filled by carrying
//! the latest prior observation forward, or by the growth curve when nothing
//! has been weighed yet.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::config::GrowthCurve;
use crate::error::FcrError;
use crate::models::{Report, WeightSample};

// ---

/// Where a week's effective weight came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    Observed,
    CarriedForward { from_week: u32 },
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekCohort {
    // ---
    pub week: u32,
    pub feed_kg: f64,
    pub cumulative_feed_kg: f64,
    pub observed_weight_kg: Option<f64>,
    pub effective_weight_kg: f64,
    pub weight_source: WeightSource,
}

/// 1-based week of `date` relative to `t0`. Dates before `t0` have no week.
pub fn week_index(t0: NaiveDate, date: NaiveDate) -> Option<u32> {
    // ---
    let days = (date - t0).num_days();
    if days < 0 {
        return None;
    }
    u32::try_from(days / 7 + 1).ok()
}

/// Build the ordered cohort series for a single flock.
///
/// Rejected reports are ignored. An empty series means the flock has no
/// analytic data yet.
pub fn aggregate(
    flock_id: Uuid,
    reports: &[Report],
    samples: &[WeightSample],
    curve: &GrowthCurve,
) -> Result<Vec<WeekCohort>, FcrError> {
    // ---
    let mut selected: Vec<&Report> = reports
        .iter()
        .filter(|r| r.flock_id == flock_id && r.status.counts_toward_analytics())
        .collect();
    selected.sort_by_key(|r| r.report_date);

    let Some(t0) = selected.first().map(|r| r.report_date) else {
        return Ok(Vec::new());
    };

    let mut feed_per_week: BTreeMap<u32, f64> = BTreeMap::new();
    for report in &selected {
        let Some(week) = week_index(t0, report.report_date) else {
            continue;
        };
        let feed = report.feed_consumed_kg.unwrap_or(0.0).max(0.0);
        *feed_per_week.entry(week).or_insert(0.0) += feed;
    }

    // Samples taken before t0 cannot be placed in a week and are dropped.
    let mut weight_sums: BTreeMap<u32, (f64, u32)> = BTreeMap::new();
    for sample in samples
        .iter()
        .filter(|s| s.flock_id == flock_id && s.weight_kg > 0.0 && s.weight_kg.is_finite())
    {
        if let Some(week) = week_index(t0, sample.sample_date) {
            let entry = weight_sums.entry(week).or_insert((0.0, 0));
            entry.0 += sample.weight_kg;
            entry.1 += 1;
        }
    }
    let observed: BTreeMap<u32, f64> = weight_sums
        .into_iter()
        .map(|(week, (sum, n))| (week, sum / f64::from(n)))
        .collect();

    let last_week = feed_per_week.keys().next_back().copied().unwrap_or(1);

    let mut cohorts = Vec::with_capacity(last_week as usize);
    let mut cumulative_feed = 0.0;
    for week in 1..=last_week {
        let feed = feed_per_week.get(&week).copied().unwrap_or(0.0);
        cumulative_feed += feed;

        let observed_weight = observed.get(&week).copied();
        let (effective_weight, source) = match observed_weight {
            Some(w) => (w, WeightSource::Observed),
            None => match observed.range(..week).next_back() {
                Some((&from_week, &w)) => (w, WeightSource::CarriedForward { from_week }),
                None => (curve.estimate(week), WeightSource::Synthetic),
            },
        };

        if !effective_weight.is_finite() || effective_weight < 0.0 {
            return Err(FcrError::AggregationGap { flock_id, week });
        }

        cohorts.push(WeekCohort {
            week,
            feed_kg: feed,
            cumulative_feed_kg: cumulative_feed,
            observed_weight_kg: observed_weight,
            effective_weight_kg: effective_weight,
            weight_source: source,
        });
    }

    Ok(cohorts)
}
