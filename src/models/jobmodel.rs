use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "job_category", rename_all = "snake_case")]
pub enum JobCategory {
    // Home & Yard
    Cleaning,
    YardWork,
    Painting,
    Handyman,
    FurnitureAssembly,

    // Moving & Hauling
    Moving,
    JunkRemoval,
    Delivery,

    // Errands & Care
    Errands,
    PetCare,
    ChildCareSupport,

    // Skills & Help
    TechHelp,
    Tutoring,
    EventHelp,

    Other,
}

impl JobCategory {
    pub fn to_str(&self) -> &str {
        match self {
            JobCategory::Cleaning => "cleaning",
            JobCategory::YardWork => "yard_work",
            JobCategory::Painting => "painting",
            JobCategory::Handyman => "handyman",
            JobCategory::FurnitureAssembly => "furniture_assembly",
            JobCategory::Moving => "moving",
            JobCategory::JunkRemoval => "junk_removal",
            JobCategory::Delivery => "delivery",
            JobCategory::Errands => "errands",
            JobCategory::PetCare => "pet_care",
            JobCategory::ChildCareSupport => "child_care_support",
            JobCategory::TechHelp => "tech_help",
            JobCategory::Tutoring => "tutoring",
            JobCategory::EventHelp => "event_help",
            JobCategory::Other => "other",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Assigned,
    InProgress,
    /// Hustler has marked the work done; waiting on the customer's
    /// completion-code confirmation (or the auto-release window).
    UnderReview,
    /// Funds captured and released. Terminal.
    Completed,
    /// Terminal.
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "pay_type", rename_all = "snake_case")]
pub enum PayType {
    Flat,
    Hourly,
}

/// One verification code slot: single-use once `used_at` is set.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CodeSlot {
    pub code: String,
    pub generated_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl CodeSlot {
    pub fn new(code: String, generated_at: DateTime<Utc>) -> Self {
        Self {
            code,
            generated_at,
            used_at: None,
        }
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }
}

/// Typed verification state for the two lifecycle handshakes.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct JobVerification {
    pub start: Option<CodeSlot>,
    pub completion: Option<CodeSlot>,
}

/// Typed dispute record. An open dispute (resolved_at is None) freezes the
/// auto-release path.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JobDispute {
    pub raised_by: Uuid,
    pub reason: String,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

impl JobDispute {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub hustler_id: Option<Uuid>,
    pub category: JobCategory,
    pub title: String,
    pub description: String,
    pub location_state: String,
    pub location_city: String,
    pub location_address: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: Option<DateTime<Utc>>,
    pub pay_type: PayType,
    /// Flat price, or the estimated total for hourly jobs.
    pub amount: f64,
    pub hourly_rate: Option<f64>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub status: JobStatus,
    pub verification: Json<JobVerification>,
    pub dispute: Option<Json<JobDispute>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.customer_id == user_id || self.hustler_id == Some(user_id)
    }

    pub fn has_open_dispute(&self) -> bool {
        self.dispute.as_ref().map_or(false, |d| d.is_open())
    }
}
