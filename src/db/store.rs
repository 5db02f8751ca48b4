// db/store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    chatmodels::{AuditLog, Message, Notification, Review, Thread},
    jobmodel::{Job, JobCategory, JobDispute, JobStatus, JobVerification},
    offermodel::Offer,
    paymentmodel::{Payment, Payout, PayoutStatus},
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub category: Option<JobCategory>,
    pub customer_id: Option<Uuid>,
    pub hustler_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

/// Payment-side fields written when funds are captured.
#[derive(Debug, Clone)]
pub struct CaptureUpdate {
    pub captured_amount: f64,
    pub fee_hustler: f64,
    pub receipt_url: Option<String>,
}

/// Persistence seam for the lifecycle engine.
///
/// Every state-claiming mutation takes its status precondition into the
/// store: implementations apply the transition atomically and return `None`
/// when the precondition no longer holds, so callers racing on the same job
/// observe exactly one winner. The engine never holds a lock across these
/// calls; correctness comes from the store's conditional updates.
#[async_trait]
pub trait MarketStore: Send + Sync {
    // Jobs
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError>;
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError>;
    /// Hard delete, permitted only while the job is Open with no offers.
    async fn delete_open_job(&self, job_id: Uuid) -> Result<bool, StoreError>;

    // Offers
    /// Rejects a second pending offer for the same (job, hustler) pair with
    /// `StoreError::Conflict`.
    async fn insert_offer(&self, offer: &Offer) -> Result<(), StoreError>;
    async fn get_offer(&self, offer_id: Uuid) -> Result<Option<Offer>, StoreError>;
    async fn list_offers_for_job(&self, job_id: Uuid) -> Result<Vec<Offer>, StoreError>;
    async fn decline_offer_if_pending(&self, offer_id: Uuid) -> Result<Option<Offer>, StoreError>;

    // Lifecycle transitions. All multi-entity writes are atomic: either the
    // whole transition is visible or none of it.
    /// Accept `offer_id`: job Open -> Assigned, offer -> Accepted, sibling
    /// pending offers -> Declined, payment row inserted, thread upserted.
    #[allow(clippy::too_many_arguments)]
    async fn assign_job(
        &self,
        job_id: Uuid,
        offer_id: Uuid,
        hustler_id: Uuid,
        amount: f64,
        hourly_rate: Option<f64>,
        verification: &JobVerification,
        payment: &Payment,
        thread: &Thread,
    ) -> Result<Option<Job>, StoreError>;

    /// Replace the start-code slot while the job is still Assigned.
    async fn set_start_code(
        &self,
        job_id: Uuid,
        verification: &JobVerification,
    ) -> Result<Option<Job>, StoreError>;

    /// Assigned -> InProgress, consuming the start code.
    async fn start_job(
        &self,
        job_id: Uuid,
        verification: &JobVerification,
        started_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError>;

    /// Assigned/InProgress -> UnderReview with a fresh completion code.
    async fn complete_job(
        &self,
        job_id: Uuid,
        verification: &JobVerification,
        completed_at: DateTime<Utc>,
        actual_hours: Option<f64>,
    ) -> Result<Option<Job>, StoreError>;

    /// UnderReview -> Completed with the payment captured and the payout
    /// upserted, all in one transaction. Fails the claim (returns `None`)
    /// if the job moved on, a dispute is open, or the payment is no longer
    /// Preauthorized.
    async fn release_job(
        &self,
        job_id: Uuid,
        verification: &JobVerification,
        paid_at: DateTime<Utc>,
        capture: &CaptureUpdate,
        payout: &Payout,
    ) -> Result<Option<(Job, Payment)>, StoreError>;

    /// Any non-terminal status -> Cancelled.
    async fn cancel_job(
        &self,
        job_id: Uuid,
        cancelled_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError>;

    async fn write_dispute(
        &self,
        job_id: Uuid,
        dispute: &JobDispute,
    ) -> Result<Option<Job>, StoreError>;

    /// UnderReview jobs whose completion predates `cutoff` and whose dispute
    /// slot is empty or resolved.
    async fn jobs_due_for_release(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError>;

    // Payments / payouts
    async fn get_payment_for_job(&self, job_id: Uuid) -> Result<Option<Payment>, StoreError>;
    async fn mark_payment_voided(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError>;
    async fn mark_payment_refunded(
        &self,
        payment_id: Uuid,
        amount: f64,
        reason: String,
    ) -> Result<Option<Payment>, StoreError>;
    async fn flag_payment_for_reconciliation(&self, payment_id: Uuid) -> Result<(), StoreError>;
    async fn get_payout_for_job(&self, job_id: Uuid) -> Result<Option<Payout>, StoreError>;
    async fn update_payout_status(
        &self,
        job_id: Uuid,
        status: PayoutStatus,
        provider_transfer_id: Option<String>,
    ) -> Result<Option<Payout>, StoreError>;

    // Hustler payout destination (gateway connected-account reference)
    async fn get_payout_account(&self, user_id: Uuid) -> Result<Option<String>, StoreError>;
    async fn upsert_payout_account(
        &self,
        user_id: Uuid,
        provider_account_id: &str,
    ) -> Result<(), StoreError>;

    // Messaging / reviews
    async fn get_thread_for_job(&self, job_id: Uuid) -> Result<Option<Thread>, StoreError>;
    async fn insert_message(&self, message: &Message) -> Result<(), StoreError>;
    async fn list_messages(
        &self,
        thread_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, StoreError>;
    /// Rejects a second review for the same (job, reviewer) pair.
    async fn insert_review(&self, review: &Review) -> Result<(), StoreError>;
    async fn list_reviews_for_job(&self, job_id: Uuid) -> Result<Vec<Review>, StoreError>;

    // Notifications / audit
    async fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError>;
    async fn insert_audit_log(&self, entry: &AuditLog) -> Result<(), StoreError>;
    async fn list_audit_logs_for_job(
        &self,
        job_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, StoreError>;
}
