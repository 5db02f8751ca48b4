use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messaging channel scoped to a job. One thread per job, two participants.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Thread {
    pub id: Uuid,
    pub job_id: Uuid,
    pub customer_id: Uuid,
    pub hustler_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub job_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewee_id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Stored notification row. Delivery is best-effort; a failed insert never
/// affects the transition that triggered it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub event_type: String,
    pub job_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of privileged financial actions. Never mutated; used
/// for after-the-fact reconciliation, not control flow.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub job_id: Option<Uuid>,
    pub details: Option<serde_json::Value>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
