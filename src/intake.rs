//! Keeper-side submission of reports and weight samples.
//!
//! Quantities are checked here, before anything reaches the store, so the
//! approval workflow and the aggregator only ever see non-negative mortality
//! and feed, and strictly positive weights. Dates must fall between the
//! flock's start date and tomorrow; a mistyped year would otherwise stretch
//! the weekly series across centuries.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::FcrError;
use crate::models::{Flock, NewReport, NewWeightSample, Report, WeightSample};
use crate::store::FarmStore;

// ---

pub struct Intake {
    store: Arc<dyn FarmStore>,
}

impl Intake {
    // ---
    pub fn new(store: Arc<dyn FarmStore>) -> Self {
        Self { store }
    }

    /// Validate and store a new `pending` report for an existing flock.
    pub async fn submit_report(&self, new: NewReport) -> Result<Report, FcrError> {
        // ---
        new.validate()?;
        let flock = self.existing_flock(new.flock_id).await?;
        check_date("report_date", new.report_date, &flock)?;

        let report = new.into_pending()?;
        self.store.insert_report(&report).await?;
        info!(
            report_id = %report.id,
            flock_id = %report.flock_id,
            date = %report.report_date,
            "report submitted"
        );
        Ok(report)
    }

    pub async fn record_weight(&self, new: NewWeightSample) -> Result<WeightSample, FcrError> {
        // ---
        new.validate()?;
        let flock = self.existing_flock(new.flock_id).await?;
        check_date("sample_date", new.sample_date, &flock)?;

        let sample = new.into_sample()?;
        self.store.insert_sample(&sample).await?;
        Ok(sample)
    }

    async fn existing_flock(&self, flock_id: Uuid) -> Result<Flock, FcrError> {
        self.store
            .find_flock(flock_id)
            .await?
            .ok_or_else(|| FcrError::flock_not_found(flock_id))
    }
}

/// Accept `flock.start_date ..= tomorrow`; one day of slack covers keepers
/// ahead of the server's UTC date.
fn check_date(field: &'static str, date: NaiveDate, flock: &Flock) -> Result<(), FcrError> {
    // ---
    let today = Utc::now().date_naive();
    let latest = today.succ_opt().unwrap_or(today);
    let earliest = flock.start_date;

    if date < earliest || date > latest {
        warn!(flock_id = %flock.id, %date, field, "date outside flock lifetime");
        return Err(FcrError::DateOutOfRange {
            field,
            date,
            earliest,
            latest,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::ReportStatus;
    use crate::store::memory::MemoryStore;
    use chrono::Duration;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    #[tokio::test]
    async fn test_submitted_report_starts_pending() {
        // ---
        let store = Arc::new(MemoryStore::default());
        let intake = Intake::new(store.clone());
        let flock = store.add_flock(800).await;

        let report = intake
            .submit_report(NewReport {
                flock_id: flock,
                report_date: date(),
                mortality_count: 2,
                feed_consumed_kg: Some(41.5),
                clinical_signs: None,
            })
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Pending);
        let stored = store.find_report(report.id).await.unwrap().unwrap();
        assert_eq!(stored, report);
    }

    #[tokio::test]
    async fn test_negative_feed_never_reaches_store() {
        // ---
        let store = Arc::new(MemoryStore::default());
        let intake = Intake::new(store.clone());
        let flock = store.add_flock(800).await;

        let err = intake
            .submit_report(NewReport {
                flock_id: flock,
                report_date: date(),
                mortality_count: 0,
                feed_consumed_kg: Some(-3.0),
                clinical_signs: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, FcrError::NegativeQuantity { .. }));
        assert!(store.flocks_with_reports().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_weight_for_unknown_flock_is_not_found() {
        // ---
        let store = Arc::new(MemoryStore::default());
        let intake = Intake::new(store);

        let err = intake
            .record_weight(NewWeightSample {
                flock_id: Uuid::new_v4(),
                sample_date: date(),
                weight_kg: 1.2,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, FcrError::NotFound { .. }));
    }

    fn report_on(flock_id: Uuid, report_date: NaiveDate) -> NewReport {
        NewReport {
            flock_id,
            report_date,
            mortality_count: 0,
            feed_consumed_kg: Some(10.0),
            clinical_signs: None,
        }
    }

    #[tokio::test]
    async fn test_report_before_flock_start_is_rejected() {
        // ---
        let store = Arc::new(MemoryStore::default());
        let intake = Intake::new(store.clone());
        let flock = store.add_flock_started(800, date()).await;

        let err = intake
            .submit_report(report_on(flock, date() - Duration::days(1)))
            .await
            .unwrap_err();

        match err {
            FcrError::DateOutOfRange {
                field, earliest, ..
            } => {
                assert_eq!(field, "report_date");
                assert_eq!(earliest, date());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.flocks_with_reports().await.unwrap().is_empty());

        // the start date itself is the first valid day
        assert!(intake.submit_report(report_on(flock, date())).await.is_ok());
    }

    #[tokio::test]
    async fn test_mistyped_future_year_is_rejected() {
        // ---
        let store = Arc::new(MemoryStore::default());
        let intake = Intake::new(store.clone());
        let flock = store.add_flock_started(800, date()).await;

        let far_future = NaiveDate::from_ymd_opt(20250, 1, 1).unwrap();
        let err = intake
            .submit_report(report_on(flock, far_future))
            .await
            .unwrap_err();
        assert!(matches!(err, FcrError::DateOutOfRange { .. }));

        let day_after_tomorrow = Utc::now().date_naive() + Duration::days(2);
        let err = intake
            .submit_report(report_on(flock, day_after_tomorrow))
            .await
            .unwrap_err();
        assert!(matches!(err, FcrError::DateOutOfRange { .. }));
        assert!(store.flocks_with_reports().await.unwrap().is_empty());

        let tomorrow = Utc::now().date_naive() + Duration::days(1);
        assert!(intake.submit_report(report_on(flock, tomorrow)).await.is_ok());
    }

    #[tokio::test]
    async fn test_weight_before_flock_start_is_rejected() {
        // ---
        let store = Arc::new(MemoryStore::default());
        let intake = Intake::new(store.clone());
        let flock = store.add_flock_started(800, date()).await;

        let err = intake
            .record_weight(NewWeightSample {
                flock_id: flock,
                sample_date: date() - Duration::days(30),
                weight_kg: 1.2,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FcrError::DateOutOfRange {
                field: "sample_date",
                ..
            }
        ));
    }
}
