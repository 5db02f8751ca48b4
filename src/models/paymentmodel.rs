use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Funds reserved on the customer's card, not yet moved.
    Preauthorized,
    /// Authorization finalized; funds moved into platform custody.
    Captured,
    Refunded,
    Voided,
}

/// Escrow record, 1:1 with an assigned job. Status only ever moves forward:
/// Preauthorized -> Captured -> Refunded, or Preauthorized -> Voided.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub job_id: Uuid,
    pub customer_id: Uuid,
    pub hustler_id: Uuid,
    /// Job price at acceptance time (flat price or hourly estimate).
    pub amount: f64,
    pub tip: f64,
    pub fee_customer: f64,
    /// Fixed from the fee calculator at capture time.
    pub fee_hustler: Option<f64>,
    /// Authorized total: amount (+ hourly headroom) + tip + fee_customer.
    pub total: f64,
    pub status: PaymentStatus,
    /// Gateway intent reference, stable across retries.
    pub provider_id: String,
    pub captured_amount: Option<f64>,
    pub refund_amount: Option<f64>,
    pub refund_reason: Option<String>,
    pub receipt_url: Option<String>,
    /// Set when a void/refund failed after the job-side state change and the
    /// payment needs manual reconciliation against the gateway.
    pub needs_reconciliation: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "payout_status", rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Funds transferred to the hustler's external account. At most one row per
/// job; written via upsert keyed on job_id so retries never duplicate a
/// transfer.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payout {
    pub id: Uuid,
    pub job_id: Uuid,
    pub hustler_id: Uuid,
    pub amount: f64,
    pub platform_fee: f64,
    pub net_amount: f64,
    pub status: PayoutStatus,
    pub provider_transfer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
