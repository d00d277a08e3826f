//! Data models for farm reports, flocks and weight samples.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::GrowthCurveOverride;
use crate::error::FcrError;

// ---

/// Lifecycle of a keeper report. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReportStatus {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Rejected reports never feed the analytics.
    pub fn counts_toward_analytics(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown report status '{other}'")),
        }
    }
}

/// Vet diagnosis recorded on approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisCategory {
    Healthy,
    Respiratory,
    Digestive,
    Parasitic,
    Nutritional,
    Environmental,
    Other,
}

impl DiagnosisCategory {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Respiratory => "respiratory",
            Self::Digestive => "digestive",
            Self::Parasitic => "parasitic",
            Self::Nutritional => "nutritional",
            Self::Environmental => "environmental",
            Self::Other => "other",
        }
    }
}

impl FromStr for DiagnosisCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(Self::Healthy),
            "respiratory" => Ok(Self::Respiratory),
            "digestive" => Ok(Self::Digestive),
            "parasitic" => Ok(Self::Parasitic),
            "nutritional" => Ok(Self::Nutritional),
            "environmental" => Ok(Self::Environmental),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown diagnosis category '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlockStatus {
    Active,
    Growing,
    Harvesting,
    Completed,
}

impl FlockStatus {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Growing => "growing",
            Self::Harvesting => "harvesting",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for FlockStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "growing" => Ok(Self::Growing),
            "harvesting" => Ok(Self::Harvesting),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown flock status '{other}'")),
        }
    }
}

/// One keeper submission for one flock on one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    // ---
    pub id: Uuid,
    pub flock_id: Uuid,
    pub report_date: NaiveDate,
    pub mortality_count: i32,
    pub feed_consumed_kg: Option<f64>,
    pub clinical_signs: Option<String>,
    pub status: ReportStatus,
    pub approver_id: Option<Uuid>,
    pub vet_notes: Option<String>,
    pub diagnosis_category: Option<DiagnosisCategory>,
    pub created_at: DateTime<Utc>,
}

/// One rearing batch and its inventory counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flock {
    // ---
    pub id: Uuid,
    pub batch_size: i32,
    pub current_count: i32,
    pub mortality_count: i32,
    pub start_date: NaiveDate,
    pub status: FlockStatus,
    #[serde(skip)]
    pub growth_override: GrowthCurveOverride,
}

/// Weight observation for a flock on a sample date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightSample {
    // ---
    pub id: Uuid,
    pub flock_id: Uuid,
    pub sample_date: NaiveDate,
    pub weight_kg: f64,
}

/// Keeper-side payload for a new report, checked before it is stored.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReport {
    // ---
    pub flock_id: Uuid,
    pub report_date: NaiveDate,
    pub mortality_count: i32,
    pub feed_consumed_kg: Option<f64>,
    pub clinical_signs: Option<String>,
}

impl NewReport {
    // ---
    pub fn validate(&self) -> Result<(), FcrError> {
        // ---
        if self.mortality_count < 0 {
            return Err(FcrError::NegativeQuantity {
                field: "mortality_count",
                value: f64::from(self.mortality_count),
            });
        }
        if let Some(feed) = self.feed_consumed_kg {
            if feed < 0.0 || !feed.is_finite() {
                return Err(FcrError::NegativeQuantity {
                    field: "feed_consumed_kg",
                    value: feed,
                });
            }
        }
        Ok(())
    }

    /// Materialise a pending report from a validated payload.
    pub fn into_pending(self) -> Result<Report, FcrError> {
        // ---
        self.validate()?;
        Ok(Report {
            id: Uuid::new_v4(),
            flock_id: self.flock_id,
            report_date: self.report_date,
            mortality_count: self.mortality_count,
            feed_consumed_kg: self.feed_consumed_kg,
            clinical_signs: self.clinical_signs,
            status: ReportStatus::Pending,
            approver_id: None,
            vet_notes: None,
            diagnosis_category: None,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWeightSample {
    // ---
    pub flock_id: Uuid,
    pub sample_date: NaiveDate,
    pub weight_kg: f64,
}

impl NewWeightSample {
    // ---
    pub fn validate(&self) -> Result<(), FcrError> {
        // ---
        if self.weight_kg <= 0.0 || !self.weight_kg.is_finite() {
            return Err(FcrError::NegativeQuantity {
                field: "weight_kg",
                value: self.weight_kg,
            });
        }
        Ok(())
    }

    pub fn into_sample(self) -> Result<WeightSample, FcrError> {
        // ---
        self.validate()?;
        Ok(WeightSample {
            id: Uuid::new_v4(),
            flock_id: self.flock_id,
            sample_date: self.sample_date,
            weight_kg: self.weight_kg,
        })
    }
}
