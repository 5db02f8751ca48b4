// db/marketdb.rs
//
// Postgres implementation of the MarketStore seam. Status preconditions ride
// in the WHERE clause of each UPDATE so concurrent transitions on the same
// job resolve to exactly one winner; multi-entity transitions run in a single
// transaction.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use super::db::DBClient;
use super::store::{CaptureUpdate, JobFilter, MarketStore, StoreError};
use crate::models::{
    chatmodels::{AuditLog, Message, Notification, Review, Thread},
    jobmodel::{Job, JobDispute, JobVerification},
    offermodel::Offer,
    paymentmodel::{Payment, Payout, PayoutStatus},
};

fn map_unique_violation(err: sqlx::Error, message: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(message.to_string())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl MarketStore for DBClient {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs
            (id, customer_id, hustler_id, category, title, description,
             location_state, location_city, location_address, lat, lng,
             scheduled_start, scheduled_end, pay_type, amount, hourly_rate,
             estimated_hours, actual_hours, status, verification, dispute,
             started_at, completed_at, paid_at, cancelled_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)
            "#,
        )
        .bind(job.id)
        .bind(job.customer_id)
        .bind(job.hustler_id)
        .bind(job.category)
        .bind(&job.title)
        .bind(&job.description)
        .bind(&job.location_state)
        .bind(&job.location_city)
        .bind(&job.location_address)
        .bind(job.lat)
        .bind(job.lng)
        .bind(job.scheduled_start)
        .bind(job.scheduled_end)
        .bind(job.pay_type)
        .bind(job.amount)
        .bind(job.hourly_rate)
        .bind(job.estimated_hours)
        .bind(job.actual_hours)
        .bind(job.status)
        .bind(job.verification.clone())
        .bind(job.dispute.clone())
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.paid_at)
        .bind(job.cancelled_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(job)
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE ($1::job_status IS NULL OR status = $1)
              AND ($2::job_category IS NULL OR category = $2)
              AND ($3::uuid IS NULL OR customer_id = $3)
              AND ($4::uuid IS NULL OR hustler_id = $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.status)
        .bind(filter.category)
        .bind(filter.customer_id)
        .bind(filter.hustler_id)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn delete_open_job(&self, job_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE id = $1
              AND status = 'open'
              AND NOT EXISTS (SELECT 1 FROM offers WHERE job_id = $1)
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_offer(&self, offer: &Offer) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO offers
            (id, job_id, hustler_id, note, proposed_amount, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(offer.id)
        .bind(offer.job_id)
        .bind(offer.hustler_id)
        .bind(&offer.note)
        .bind(offer.proposed_amount)
        .bind(offer.status)
        .bind(offer.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "a pending offer already exists for this job"))?;

        Ok(())
    }

    async fn get_offer(&self, offer_id: Uuid) -> Result<Option<Offer>, StoreError> {
        let offer = sqlx::query_as::<_, Offer>("SELECT * FROM offers WHERE id = $1")
            .bind(offer_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(offer)
    }

    async fn list_offers_for_job(&self, job_id: Uuid) -> Result<Vec<Offer>, StoreError> {
        let offers = sqlx::query_as::<_, Offer>(
            "SELECT * FROM offers WHERE job_id = $1 ORDER BY created_at ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(offers)
    }

    async fn decline_offer_if_pending(&self, offer_id: Uuid) -> Result<Option<Offer>, StoreError> {
        let offer = sqlx::query_as::<_, Offer>(
            r#"
            UPDATE offers SET status = 'declined'
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(offer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(offer)
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
        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;

        let accepted = sqlx::query(
            r#"
            UPDATE offers SET status = 'accepted'
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(offer_id)
        .execute(&mut *tx)
        .await?;

        if accepted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET hustler_id = $2, status = 'assigned', amount = $3,
                hourly_rate = $4, verification = $5, updated_at = NOW()
            WHERE id = $1 AND status = 'open'
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(hustler_id)
        .bind(amount)
        .bind(hourly_rate)
        .bind(Json(verification.clone()))
        .fetch_optional(&mut *tx)
        .await?;

        let job = match job {
            Some(job) => job,
            None => {
                tx.rollback().await?;
                return Ok(None);
            }
        };

        sqlx::query(
            r#"
            UPDATE offers SET status = 'declined'
            WHERE job_id = $1 AND status = 'pending' AND id <> $2
            "#,
        )
        .bind(job_id)
        .bind(offer_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO payments
            (id, job_id, customer_id, hustler_id, amount, tip, fee_customer,
             fee_hustler, total, status, provider_id, captured_amount,
             refund_amount, refund_reason, receipt_url, needs_reconciliation,
             created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18)
            "#,
        )
        .bind(payment.id)
        .bind(payment.job_id)
        .bind(payment.customer_id)
        .bind(payment.hustler_id)
        .bind(payment.amount)
        .bind(payment.tip)
        .bind(payment.fee_customer)
        .bind(payment.fee_hustler)
        .bind(payment.total)
        .bind(payment.status)
        .bind(&payment.provider_id)
        .bind(payment.captured_amount)
        .bind(payment.refund_amount)
        .bind(&payment.refund_reason)
        .bind(&payment.receipt_url)
        .bind(payment.needs_reconciliation)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO threads (id, job_id, customer_id, hustler_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(thread.id)
        .bind(thread.job_id)
        .bind(thread.customer_id)
        .bind(thread.hustler_id)
        .bind(thread.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(job))
    }

    async fn set_start_code(
        &self,
        job_id: Uuid,
        verification: &JobVerification,
    ) -> Result<Option<Job>, StoreError> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs SET verification = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'assigned'
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(Json(verification.clone()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn start_job(
        &self,
        job_id: Uuid,
        verification: &JobVerification,
        started_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'in_progress', verification = $2, started_at = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'assigned' AND started_at IS NULL
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(Json(verification.clone()))
        .bind(started_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        verification: &JobVerification,
        completed_at: DateTime<Utc>,
        actual_hours: Option<f64>,
    ) -> Result<Option<Job>, StoreError> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'under_review', verification = $2, completed_at = $3,
                actual_hours = COALESCE($4, actual_hours), updated_at = NOW()
            WHERE id = $1 AND status IN ('assigned', 'in_progress')
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(Json(verification.clone()))
        .bind(completed_at)
        .bind(actual_hours)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn release_job(
        &self,
        job_id: Uuid,
        verification: &JobVerification,
        paid_at: DateTime<Utc>,
        capture: &CaptureUpdate,
        payout: &Payout,
    ) -> Result<Option<(Job, Payment)>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;

        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'completed', verification = $2, paid_at = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'under_review'
              AND (dispute IS NULL OR dispute->>'resolved_at' IS NOT NULL)
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(Json(verification.clone()))
        .bind(paid_at)
        .fetch_optional(&mut *tx)
        .await?;

        let job = match job {
            Some(job) => job,
            None => {
                tx.rollback().await?;
                return Ok(None);
            }
        };

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'captured', captured_amount = $2, fee_hustler = $3,
                receipt_url = $4, updated_at = NOW()
            WHERE job_id = $1 AND status = 'preauthorized'
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(capture.captured_amount)
        .bind(capture.fee_hustler)
        .bind(&capture.receipt_url)
        .fetch_optional(&mut *tx)
        .await?;

        let payment = match payment {
            Some(payment) => payment,
            None => {
                tx.rollback().await?;
                return Ok(None);
            }
        };

        sqlx::query(
            r#"
            INSERT INTO payouts
            (id, job_id, hustler_id, amount, platform_fee, net_amount, status,
             provider_transfer_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(payout.id)
        .bind(payout.job_id)
        .bind(payout.hustler_id)
        .bind(payout.amount)
        .bind(payout.platform_fee)
        .bind(payout.net_amount)
        .bind(payout.status)
        .bind(&payout.provider_transfer_id)
        .bind(payout.created_at)
        .bind(payout.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((job, payment)))
    }

    async fn cancel_job(
        &self,
        job_id: Uuid,
        cancelled_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'cancelled', cancelled_at = $2, updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('completed', 'cancelled')
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(cancelled_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn write_dispute(
        &self,
        job_id: Uuid,
        dispute: &JobDispute,
    ) -> Result<Option<Job>, StoreError> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs SET dispute = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(Json(dispute.clone()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn jobs_due_for_release(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE status = 'under_review'
              AND completed_at < $1
              AND (dispute IS NULL OR dispute->>'resolved_at' IS NOT NULL)
            ORDER BY completed_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn get_payment_for_job(&self, job_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    async fn mark_payment_voided(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments SET status = 'voided', updated_at = NOW()
            WHERE id = $1 AND status = 'preauthorized'
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn mark_payment_refunded(
        &self,
        payment_id: Uuid,
        amount: f64,
        reason: String,
    ) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'refunded', refund_amount = $2, refund_reason = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'captured'
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(amount)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn flag_payment_for_reconciliation(&self, payment_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE payments SET needs_reconciliation = TRUE, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(payment_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_payout_for_job(&self, job_id: Uuid) -> Result<Option<Payout>, StoreError> {
        let payout = sqlx::query_as::<_, Payout>("SELECT * FROM payouts WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payout)
    }

    async fn update_payout_status(
        &self,
        job_id: Uuid,
        status: PayoutStatus,
        provider_transfer_id: Option<String>,
    ) -> Result<Option<Payout>, StoreError> {
        let payout = sqlx::query_as::<_, Payout>(
            r#"
            UPDATE payouts
            SET status = $2,
                provider_transfer_id = COALESCE($3, provider_transfer_id),
                updated_at = NOW()
            WHERE job_id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(status)
        .bind(provider_transfer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payout)
    }

    async fn get_payout_account(&self, user_id: Uuid) -> Result<Option<String>, StoreError> {
        let account = sqlx::query_scalar::<_, String>(
            "SELECT provider_account_id FROM payout_accounts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn upsert_payout_account(
        &self,
        user_id: Uuid,
        provider_account_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payout_accounts (user_id, provider_account_id, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET provider_account_id = $2, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(provider_account_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_thread_for_job(&self, job_id: Uuid) -> Result<Option<Thread>, StoreError> {
        let thread = sqlx::query_as::<_, Thread>("SELECT * FROM threads WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(thread)
    }

    async fn insert_message(&self, message: &Message) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, thread_id, sender_id, body, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(message.id)
        .bind(message.thread_id)
        .bind(message.sender_id)
        .bind(&message.body)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_messages(
        &self,
        thread_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE thread_id = $1
            ORDER BY created_at ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(thread_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn insert_review(&self, review: &Review) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO reviews
            (id, job_id, reviewer_id, reviewee_id, rating, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(review.id)
        .bind(review.job_id)
        .bind(review.reviewer_id)
        .bind(review.reviewee_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "a review already exists for this job"))?;

        Ok(())
    }

    async fn list_reviews_for_job(&self, job_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let reviews = sqlx::query_as::<_, Review>(
            "SELECT * FROM reviews WHERE job_id = $1 ORDER BY created_at ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(reviews)
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notifications
            (id, user_id, event_type, job_id, metadata, message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(&notification.event_type)
        .bind(notification.job_id)
        .bind(&notification.metadata)
        .bind(&notification.message)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_audit_log(&self, entry: &AuditLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
            (id, actor_id, action, job_id, details, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(entry.job_id)
        .bind(&entry.details)
        .bind(&entry.description)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_audit_logs_for_job(
        &self,
        job_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, StoreError> {
        let logs = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_logs
            WHERE job_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(job_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }
}
