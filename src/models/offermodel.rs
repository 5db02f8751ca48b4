use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "offer_status", rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
}

/// A hustler's bid on a job. Transitions to Accepted or Declined exactly
/// once; immutable after.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Offer {
    pub id: Uuid,
    pub job_id: Uuid,
    pub hustler_id: Uuid,
    pub note: String,
    pub proposed_amount: Option<f64>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}
