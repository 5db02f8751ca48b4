// db/memdb.rs
//
// In-memory MarketStore used by the lifecycle tests. One mutex stands in for
// the database's transaction boundary: every trait method takes the lock
// once, so each transition is atomic exactly as the Postgres implementation's
// transactions are.
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::{CaptureUpdate, JobFilter, MarketStore, StoreError};
use crate::models::{
    chatmodels::{AuditLog, Message, Notification, Review, Thread},
    jobmodel::{Job, JobDispute, JobStatus, JobVerification},
    offermodel::{Offer, OfferStatus},
    paymentmodel::{Payment, PaymentStatus, Payout, PayoutStatus},
};

#[derive(Debug, Default)]
struct MemInner {
    jobs: HashMap<Uuid, Job>,
    offers: HashMap<Uuid, Offer>,
    payments: HashMap<Uuid, Payment>,
    payouts: HashMap<Uuid, Payout>,
    threads: HashMap<Uuid, Thread>,
    messages: Vec<Message>,
    reviews: Vec<Review>,
    notifications: Vec<Notification>,
    audit_logs: Vec<AuditLog>,
    payout_accounts: HashMap<Uuid, String>,
}

#[derive(Debug, Default)]
pub struct MemStore {
    inner: Mutex<MemInner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notification_count(&self) -> usize {
        self.inner.lock().await.notifications.len()
    }

    pub async fn audit_log_count(&self) -> usize {
        self.inner.lock().await.audit_logs.len()
    }

    pub async fn payout_count(&self) -> usize {
        self.inner.lock().await.payouts.len()
    }
}

#[async_trait]
impl MarketStore for MemStore {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.jobs.get(&job_id).cloned())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| filter.status.map_or(true, |s| j.status == s))
            .filter(|j| filter.category.map_or(true, |c| j.category == c))
            .filter(|j| filter.customer_id.map_or(true, |id| j.customer_id == id))
            .filter(|j| filter.hustler_id.map_or(true, |id| j.hustler_id == Some(id)))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn delete_open_job(&self, job_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let deletable = match inner.jobs.get(&job_id) {
            Some(job) => {
                job.status == JobStatus::Open
                    && !inner.offers.values().any(|o| o.job_id == job_id)
            }
            None => false,
        };
        if deletable {
            inner.jobs.remove(&job_id);
        }
        Ok(deletable)
    }

    async fn insert_offer(&self, offer: &Offer) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let duplicate = inner.offers.values().any(|o| {
            o.job_id == offer.job_id
                && o.hustler_id == offer.hustler_id
                && o.status == OfferStatus::Pending
        });
        if duplicate {
            return Err(StoreError::Conflict(
                "a pending offer already exists for this job".to_string(),
            ));
        }
        inner.offers.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn get_offer(&self, offer_id: Uuid) -> Result<Option<Offer>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.offers.get(&offer_id).cloned())
    }

    async fn list_offers_for_job(&self, job_id: Uuid) -> Result<Vec<Offer>, StoreError> {
        let inner = self.inner.lock().await;
        let mut offers: Vec<Offer> = inner
            .offers
            .values()
            .filter(|o| o.job_id == job_id)
            .cloned()
            .collect();
        offers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(offers)
    }

    async fn decline_offer_if_pending(&self, offer_id: Uuid) -> Result<Option<Offer>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.offers.get_mut(&offer_id) {
            Some(offer) if offer.status == OfferStatus::Pending => {
                offer.status = OfferStatus::Declined;
                Ok(Some(offer.clone()))
            }
            _ => Ok(None),
        }
    }

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
    ) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.lock().await;

        let offer_pending = inner
            .offers
            .get(&offer_id)
            .map_or(false, |o| o.status == OfferStatus::Pending);
        let job_open = inner
            .jobs
            .get(&job_id)
            .map_or(false, |j| j.status == JobStatus::Open);
        if !offer_pending || !job_open {
            return Ok(None);
        }

        if let Some(offer) = inner.offers.get_mut(&offer_id) {
            offer.status = OfferStatus::Accepted;
        }
        for offer in inner.offers.values_mut() {
            if offer.job_id == job_id
                && offer.id != offer_id
                && offer.status == OfferStatus::Pending
            {
                offer.status = OfferStatus::Declined;
            }
        }

        inner.payments.insert(payment.id, payment.clone());
        inner.threads.entry(thread.job_id).or_insert_with(|| thread.clone());

        let job = inner.jobs.get_mut(&job_id).ok_or_else(|| {
            StoreError::Conflict("job vanished during assignment".to_string())
        })?;
        job.hustler_id = Some(hustler_id);
        job.status = JobStatus::Assigned;
        job.amount = amount;
        job.hourly_rate = hourly_rate;
        job.verification = Json(verification.clone());
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn set_start_code(
        &self,
        job_id: Uuid,
        verification: &JobVerification,
    ) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Assigned => {
                job.verification = Json(verification.clone());
                job.updated_at = Utc::now();
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn start_job(
        &self,
        job_id: Uuid,
        verification: &JobVerification,
        started_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Assigned && job.started_at.is_none() => {
                job.status = JobStatus::InProgress;
                job.verification = Json(verification.clone());
                job.started_at = Some(started_at);
                job.updated_at = Utc::now();
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        verification: &JobVerification,
        completed_at: DateTime<Utc>,
        actual_hours: Option<f64>,
    ) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.jobs.get_mut(&job_id) {
            Some(job)
                if matches!(job.status, JobStatus::Assigned | JobStatus::InProgress) =>
            {
                job.status = JobStatus::UnderReview;
                job.verification = Json(verification.clone());
                job.completed_at = Some(completed_at);
                if actual_hours.is_some() {
                    job.actual_hours = actual_hours;
                }
                job.updated_at = Utc::now();
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn release_job(
        &self,
        job_id: Uuid,
        verification: &JobVerification,
        paid_at: DateTime<Utc>,
        capture: &CaptureUpdate,
        payout: &Payout,
    ) -> Result<Option<(Job, Payment)>, StoreError> {
        let mut inner = self.inner.lock().await;

        let claimable = inner.jobs.get(&job_id).map_or(false, |job| {
            job.status == JobStatus::UnderReview && !job.has_open_dispute()
        });
        let payment_id = inner
            .payments
            .values()
            .find(|p| p.job_id == job_id && p.status == PaymentStatus::Preauthorized)
            .map(|p| p.id);
        let payment_id = match (claimable, payment_id) {
            (true, Some(id)) => id,
            _ => return Ok(None),
        };

        let job = inner.jobs.get_mut(&job_id).ok_or_else(|| {
            StoreError::Conflict("job vanished during release".to_string())
        })?;
        job.status = JobStatus::Completed;
        job.verification = Json(verification.clone());
        job.paid_at = Some(paid_at);
        job.updated_at = Utc::now();
        let job = job.clone();

        let payment = inner.payments.get_mut(&payment_id).ok_or_else(|| {
            StoreError::Conflict("payment vanished during release".to_string())
        })?;
        payment.status = PaymentStatus::Captured;
        payment.captured_amount = Some(capture.captured_amount);
        payment.fee_hustler = Some(capture.fee_hustler);
        payment.receipt_url = capture.receipt_url.clone();
        payment.updated_at = Utc::now();
        let payment = payment.clone();

        inner
            .payouts
            .entry(payout.job_id)
            .or_insert_with(|| payout.clone());

        Ok(Some((job, payment)))
    }

    async fn cancel_job(
        &self,
        job_id: Uuid,
        cancelled_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.jobs.get_mut(&job_id) {
            Some(job) if !job.status.is_terminal() => {
                job.status = JobStatus::Cancelled;
                job.cancelled_at = Some(cancelled_at);
                job.updated_at = Utc::now();
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn write_dispute(
        &self,
        job_id: Uuid,
        dispute: &JobDispute,
    ) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.jobs.get_mut(&job_id) {
            Some(job) => {
                job.dispute = Some(Json(dispute.clone()));
                job.updated_at = Utc::now();
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn jobs_due_for_release(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock().await;
        let mut due: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::UnderReview
                    && j.completed_at.map_or(false, |c| c < cutoff)
                    && !j.has_open_dispute()
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(due.into_iter().take(limit as usize).collect())
    }

    async fn get_payment_for_job(&self, job_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .payments
            .values()
            .find(|p| p.job_id == job_id)
            .cloned())
    }

    async fn mark_payment_voided(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.payments.get_mut(&payment_id) {
            Some(payment) if payment.status == PaymentStatus::Preauthorized => {
                payment.status = PaymentStatus::Voided;
                payment.updated_at = Utc::now();
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_payment_refunded(
        &self,
        payment_id: Uuid,
        amount: f64,
        reason: String,
    ) -> Result<Option<Payment>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.payments.get_mut(&payment_id) {
            Some(payment) if payment.status == PaymentStatus::Captured => {
                payment.status = PaymentStatus::Refunded;
                payment.refund_amount = Some(amount);
                payment.refund_reason = Some(reason);
                payment.updated_at = Utc::now();
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn flag_payment_for_reconciliation(&self, payment_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(payment) = inner.payments.get_mut(&payment_id) {
            payment.needs_reconciliation = true;
            payment.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_payout_for_job(&self, job_id: Uuid) -> Result<Option<Payout>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.payouts.get(&job_id).cloned())
    }

    async fn update_payout_status(
        &self,
        job_id: Uuid,
        status: PayoutStatus,
        provider_transfer_id: Option<String>,
    ) -> Result<Option<Payout>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.payouts.get_mut(&job_id) {
            Some(payout) => {
                payout.status = status;
                if provider_transfer_id.is_some() {
                    payout.provider_transfer_id = provider_transfer_id;
                }
                payout.updated_at = Utc::now();
                Ok(Some(payout.clone()))
            }
            None => Ok(None),
        }
    }

    async fn get_payout_account(&self, user_id: Uuid) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.payout_accounts.get(&user_id).cloned())
    }

    async fn upsert_payout_account(
        &self,
        user_id: Uuid,
        provider_account_id: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .payout_accounts
            .insert(user_id, provider_account_id.to_string());
        Ok(())
    }

    async fn get_thread_for_job(&self, job_id: Uuid) -> Result<Option<Thread>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.threads.get(&job_id).cloned())
    }

    async fn insert_message(&self, message: &Message) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.messages.push(message.clone());
        Ok(())
    }

    async fn list_messages(
        &self,
        thread_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn insert_review(&self, review: &Review) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let duplicate = inner
            .reviews
            .iter()
            .any(|r| r.job_id == review.job_id && r.reviewer_id == review.reviewer_id);
        if duplicate {
            return Err(StoreError::Conflict(
                "a review already exists for this job".to_string(),
            ));
        }
        inner.reviews.push(review.clone());
        Ok(())
    }

    async fn list_reviews_for_job(&self, job_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .reviews
            .iter()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.notifications.push(notification.clone());
        Ok(())
    }

    async fn insert_audit_log(&self, entry: &AuditLog) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.audit_logs.push(entry.clone());
        Ok(())
    }

    async fn list_audit_logs_for_job(
        &self,
        job_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .audit_logs
            .iter()
            .filter(|l| l.job_id == Some(job_id))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
