// services/lifecycle_service.rs
//
// The job lifecycle engine: the single entry point for every transition that
// mutates a job, its payment, or its offers. Each transition follows the
// same shape — validate against a fresh read, perform the gateway call, then
// claim the state change through a conditional store update. Gateway calls
// always carry an idempotency key derived from (operation, resource id), so
// a retry or a crash-recovery replay can never double-charge, double-capture
// or double-transfer.
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::types::Json;
use uuid::Uuid;

use crate::{
    config::{Config, PaymentMode},
    db::store::{CaptureUpdate, JobFilter, MarketStore},
    dtos::jobdtos::*,
    middleware::Actor,
    models::{
        chatmodels::Thread,
        jobmodel::{Job, JobDispute, JobStatus, JobVerification, PayType},
        offermodel::{Offer, OfferStatus},
        paymentmodel::{Payment, PaymentStatus, Payout, PayoutStatus},
    },
    service::{
        audit_service::AuditService,
        error::ServiceError,
        fees,
        notification_service::NotificationService,
        payment_gateway::PaymentGateway,
        verification,
    },
    utils::currency::{dollars_to_cents, round2},
};

fn idem_key(operation: &str, resource_id: Uuid) -> String {
    format!("{operation}:{resource_id}")
}

#[derive(Debug, Clone, Copy)]
pub struct LifecycleSettings {
    pub payment_mode: PaymentMode,
    /// How long after hustler-completion the sweep waits before releasing
    /// funds without the customer's confirmation.
    pub auto_release_after: Duration,
    /// Authorization headroom multiplier for hourly jobs.
    pub hourly_auth_buffer: f64,
    /// Customers may not cancel within this window before the scheduled
    /// start.
    pub cancel_cutoff: Duration,
}

impl LifecycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            payment_mode: config.payment_mode,
            auto_release_after: Duration::hours(config.auto_release_hours),
            hourly_auth_buffer: config.hourly_auth_buffer,
            cancel_cutoff: Duration::hours(config.cancel_cutoff_hours),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ReleaseTrigger {
    Confirm,
    Auto,
    Dispute,
}

#[derive(Clone)]
pub struct LifecycleService {
    store: Arc<dyn MarketStore>,
    gateway: Arc<dyn PaymentGateway>,
    notification_service: Arc<NotificationService>,
    audit_service: Arc<AuditService>,
    settings: LifecycleSettings,
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn MarketStore>,
        gateway: Arc<dyn PaymentGateway>,
        notification_service: Arc<NotificationService>,
        audit_service: Arc<AuditService>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            notification_service,
            audit_service,
            settings,
        }
    }

    pub async fn create_job(&self, actor: &Actor, dto: CreateJobDto) -> Result<Job, ServiceError> {
        if !actor.can_act_as_customer {
            return Err(ServiceError::Forbidden(
                "only customers can post jobs".to_string(),
            ));
        }

        let (amount, hourly_rate, estimated_hours) = match dto.pay_type {
            PayType::Flat => {
                let amount = dto.amount.ok_or_else(|| {
                    ServiceError::Validation("amount is required for flat-rate jobs".to_string())
                })?;
                (round2(amount), None, None)
            }
            PayType::Hourly => {
                let rate = dto.hourly_rate.ok_or_else(|| {
                    ServiceError::Validation("hourly_rate is required for hourly jobs".to_string())
                })?;
                let hours = dto.estimated_hours.ok_or_else(|| {
                    ServiceError::Validation(
                        "estimated_hours is required for hourly jobs".to_string(),
                    )
                })?;
                (round2(rate * hours), Some(rate), Some(hours))
            }
        };

        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            customer_id: actor.id,
            hustler_id: None,
            category: dto.category,
            title: dto.title,
            description: dto.description,
            location_state: dto.location_state,
            location_city: dto.location_city,
            location_address: dto.location_address,
            lat: dto.lat,
            lng: dto.lng,
            scheduled_start: dto.scheduled_start,
            scheduled_end: dto.scheduled_end,
            pay_type: dto.pay_type,
            amount,
            hourly_rate,
            estimated_hours,
            actual_hours: None,
            status: JobStatus::Open,
            verification: Json(JobVerification::default()),
            dispute: None,
            started_at: None,
            completed_at: None,
            paid_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_job(&job).await?;
        self.notification_service.notify_job_posted(&job).await;

        Ok(job)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Job, ServiceError> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or(ServiceError::NotFound("job"))
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, ServiceError> {
        Ok(self.store.list_jobs(filter).await?)
    }

    pub async fn delete_job(&self, actor: &Actor, job_id: Uuid) -> Result<(), ServiceError> {
        let job = self.get_job(job_id).await?;
        if job.customer_id != actor.id && !actor.is_admin {
            return Err(ServiceError::Forbidden(
                "only the job owner can delete a job".to_string(),
            ));
        }

        if self.store.delete_open_job(job_id).await? {
            Ok(())
        } else {
            Err(ServiceError::Conflict(
                "only open jobs with no offers can be deleted".to_string(),
            ))
        }
    }

    pub async fn create_offer(
        &self,
        actor: &Actor,
        job_id: Uuid,
        dto: CreateOfferDto,
    ) -> Result<Offer, ServiceError> {
        if !actor.can_act_as_hustler {
            return Err(ServiceError::Forbidden(
                "only hustlers can make offers".to_string(),
            ));
        }

        let job = self.get_job(job_id).await?;
        if job.customer_id == actor.id {
            return Err(ServiceError::Forbidden(
                "you cannot offer on your own job".to_string(),
            ));
        }
        if job.status != JobStatus::Open {
            return Err(ServiceError::Conflict(
                "job is not open for offers".to_string(),
            ));
        }

        let offer = Offer {
            id: Uuid::new_v4(),
            job_id,
            hustler_id: actor.id,
            note: dto.note.unwrap_or_default(),
            proposed_amount: dto.proposed_amount.map(round2),
            status: OfferStatus::Pending,
            created_at: Utc::now(),
        };

        self.store.insert_offer(&offer).await?;
        self.notification_service.notify_new_offer(&job, &offer).await;

        Ok(offer)
    }

    pub async fn list_offers(&self, actor: &Actor, job_id: Uuid) -> Result<Vec<Offer>, ServiceError> {
        let job = self.get_job(job_id).await?;
        let offers = self.store.list_offers_for_job(job_id).await?;

        if job.customer_id == actor.id || actor.is_admin {
            return Ok(offers);
        }
        // Hustlers only see their own bids.
        Ok(offers
            .into_iter()
            .filter(|o| o.hustler_id == actor.id)
            .collect())
    }

    /// Accept an offer: the `assign` transition. Fees are computed, the
    /// customer's card is pre-authorized, and only then is the state change
    /// claimed — a gateway failure aborts with nothing persisted.
    pub async fn accept_offer(
        &self,
        actor: &Actor,
        offer_id: Uuid,
        dto: AcceptOfferDto,
    ) -> Result<AssignmentResult, ServiceError> {
        let offer = self
            .store
            .get_offer(offer_id)
            .await?
            .ok_or(ServiceError::NotFound("offer"))?;
        let job = self.get_job(offer.job_id).await?;

        if job.customer_id != actor.id || !actor.can_act_as_customer {
            return Err(ServiceError::Forbidden(
                "only the job owner can accept offers".to_string(),
            ));
        }
        if offer.status != OfferStatus::Pending {
            return Err(ServiceError::Conflict("offer is not pending".to_string()));
        }
        if job.status != JobStatus::Open {
            return Err(ServiceError::Conflict("job is not open".to_string()));
        }

        let payout_account = self.store.get_payout_account(offer.hustler_id).await?;
        if payout_account.is_none() && self.settings.payment_mode == PaymentMode::Live {
            return Err(ServiceError::PayeeNotOnboarded(offer.hustler_id));
        }

        let tip = round2(dto.tip.unwrap_or(0.0));
        if tip < 0.0 {
            return Err(ServiceError::Validation("tip must be non-negative".to_string()));
        }

        let (amount, hourly_rate) = match job.pay_type {
            PayType::Flat => (
                round2(offer.proposed_amount.unwrap_or(job.amount)),
                job.hourly_rate,
            ),
            PayType::Hourly => {
                // A proposed amount on an hourly job renegotiates the rate.
                let rate = offer.proposed_amount.or(job.hourly_rate).ok_or_else(|| {
                    ServiceError::Invariant(format!("hourly job {} has no rate", job.id))
                })?;
                let hours = job.estimated_hours.ok_or_else(|| {
                    ServiceError::Invariant(format!(
                        "hourly job {} has no estimated hours",
                        job.id
                    ))
                })?;
                (round2(rate * hours), Some(rate))
            }
        };

        let breakdown = fees::calculate_fees(amount, tip)?;
        let authorized_base = match job.pay_type {
            PayType::Flat => amount,
            PayType::Hourly => round2(amount * self.settings.hourly_auth_buffer),
        };
        let total = round2(authorized_base + breakdown.customer_fee + tip);

        let intent = self
            .gateway
            .preauthorize(dollars_to_cents(total), &idem_key("preauth", offer.id))
            .await?;

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            job_id: job.id,
            customer_id: job.customer_id,
            hustler_id: offer.hustler_id,
            amount,
            tip,
            fee_customer: breakdown.customer_fee,
            fee_hustler: None,
            total,
            status: PaymentStatus::Preauthorized,
            provider_id: intent.intent_id,
            captured_amount: None,
            refund_amount: None,
            refund_reason: None,
            receipt_url: None,
            needs_reconciliation: false,
            created_at: now,
            updated_at: now,
        };

        let start_slot = verification::new_start_slot(now);
        let start_code = start_slot.code.clone();
        let mut verification = job.verification.0.clone();
        verification.start = Some(start_slot);
        verification.completion = None;

        let thread = Thread {
            id: Uuid::new_v4(),
            job_id: job.id,
            customer_id: job.customer_id,
            hustler_id: offer.hustler_id,
            created_at: now,
        };

        match self
            .store
            .assign_job(
                job.id,
                offer.id,
                offer.hustler_id,
                amount,
                hourly_rate,
                &verification,
                &payment,
                &thread,
            )
            .await?
        {
            Some(job) => {
                self.audit_service
                    .log_escrow_preauthorized(actor.id, &payment)
                    .await;
                self.notification_service.notify_job_assigned(&job).await;
                Ok(AssignmentResult {
                    job,
                    payment,
                    start_code,
                })
            }
            None => {
                // Lost the race. Release the fresh hold; if the void itself
                // fails the authorization expires at the provider.
                if let Err(e) = self
                    .gateway
                    .void(&payment.provider_id, &idem_key("void", payment.id))
                    .await
                {
                    tracing::error!(
                        "failed to void orphaned authorization {}: {}",
                        payment.provider_id,
                        e.message
                    );
                }
                Err(ServiceError::Conflict("job is no longer open".to_string()))
            }
        }
    }

    pub async fn decline_offer(&self, actor: &Actor, offer_id: Uuid) -> Result<Offer, ServiceError> {
        let offer = self
            .store
            .get_offer(offer_id)
            .await?
            .ok_or(ServiceError::NotFound("offer"))?;
        let job = self.get_job(offer.job_id).await?;

        if job.customer_id != actor.id {
            return Err(ServiceError::Forbidden(
                "only the job owner can decline offers".to_string(),
            ));
        }

        self.store
            .decline_offer_if_pending(offer_id)
            .await?
            .ok_or_else(|| ServiceError::Conflict("offer is not pending".to_string()))
    }

    /// Hustler submits the start code the customer read out at handoff.
    pub async fn start_job(
        &self,
        actor: &Actor,
        job_id: Uuid,
        dto: StartJobDto,
    ) -> Result<Job, ServiceError> {
        let job = self.get_job(job_id).await?;
        if job.hustler_id != Some(actor.id) || !actor.can_act_as_hustler {
            return Err(ServiceError::Forbidden(
                "only the assigned hustler can start this job".to_string(),
            ));
        }
        if !matches!(job.status, JobStatus::Assigned | JobStatus::InProgress) {
            return Err(ServiceError::Conflict(
                "job is not awaiting start".to_string(),
            ));
        }

        // A replay after a successful start hits the consumed slot and gets
        // the distinct already-used condition, not "invalid code".
        verification::check_code(job.verification.0.start.as_ref(), &dto.code, "start")?;

        let now = Utc::now();
        let mut verification = job.verification.0.clone();
        if let Some(slot) = verification.start.as_mut() {
            verification::consume(slot, now);
        }

        let job = self
            .store
            .start_job(job_id, &verification, now)
            .await?
            .ok_or_else(|| ServiceError::Conflict("job is not awaiting start".to_string()))?;

        self.notification_service.notify_job_started(&job).await;
        Ok(job)
    }

    /// Customer replaces an unused start code (e.g. lost before handoff).
    pub async fn regenerate_start_code(
        &self,
        actor: &Actor,
        job_id: Uuid,
    ) -> Result<(Job, String), ServiceError> {
        let job = self.get_job(job_id).await?;
        if job.customer_id != actor.id || !actor.can_act_as_customer {
            return Err(ServiceError::Forbidden(
                "only the job owner can regenerate the start code".to_string(),
            ));
        }
        if job.status != JobStatus::Assigned {
            return Err(ServiceError::Conflict(
                "start codes only exist for assigned jobs".to_string(),
            ));
        }
        if job.verification.0.start.as_ref().map_or(false, |s| s.is_used()) {
            return Err(ServiceError::CodeAlreadyUsed("start"));
        }

        let now = Utc::now();
        let slot = verification::new_start_slot(now);
        let code = slot.code.clone();
        let mut verification = job.verification.0.clone();
        verification.start = Some(slot);

        let job = self
            .store
            .set_start_code(job_id, &verification)
            .await?
            .ok_or_else(|| ServiceError::Conflict("job is no longer assigned".to_string()))?;

        Ok((job, code))
    }

    /// Hustler marks the work done; a completion code is issued for the
    /// customer handshake. Allowed straight from Assigned: crews sometimes
    /// skip the start handshake for same-day jobs.
    pub async fn complete_job(
        &self,
        actor: &Actor,
        job_id: Uuid,
        dto: CompleteJobDto,
    ) -> Result<CompletionResult, ServiceError> {
        let job = self.get_job(job_id).await?;
        if job.hustler_id != Some(actor.id) || !actor.can_act_as_hustler {
            return Err(ServiceError::Forbidden(
                "only the assigned hustler can complete this job".to_string(),
            ));
        }
        if !matches!(job.status, JobStatus::Assigned | JobStatus::InProgress) {
            if job.status == JobStatus::UnderReview {
                return Err(ServiceError::Conflict(
                    "completion has already been submitted".to_string(),
                ));
            }
            return Err(ServiceError::Conflict("job is not in progress".to_string()));
        }

        let now = Utc::now();
        let slot = verification::new_completion_slot(now);
        let completion_code = slot.code.clone();
        let mut verification = job.verification.0.clone();
        verification.completion = Some(slot);

        let job = self
            .store
            .complete_job(job_id, &verification, now, dto.actual_hours)
            .await?
            .ok_or_else(|| ServiceError::Conflict("job is not in progress".to_string()))?;

        self.notification_service.notify_completion_submitted(&job).await;

        Ok(CompletionResult {
            job,
            completion_code,
        })
    }

    /// Customer submits the completion code; funds are captured and
    /// released. Confirming an already-released job is a success, not an
    /// error — retries and sweep races land here.
    pub async fn confirm_completion(
        &self,
        actor: &Actor,
        job_id: Uuid,
        dto: ConfirmCompletionDto,
    ) -> Result<ReleaseResult, ServiceError> {
        let job = self.get_job(job_id).await?;
        if job.customer_id != actor.id || !actor.can_act_as_customer {
            return Err(ServiceError::Forbidden(
                "only the job owner can confirm completion".to_string(),
            ));
        }

        if job.status == JobStatus::Completed {
            return self.already_released(job).await;
        }
        if job.has_open_dispute() {
            return Err(ServiceError::Conflict(
                "an open dispute is holding this job".to_string(),
            ));
        }
        if job.status != JobStatus::UnderReview {
            return Err(ServiceError::Conflict(
                "job is not awaiting confirmation".to_string(),
            ));
        }

        verification::check_code(job.verification.0.completion.as_ref(), &dto.code, "completion")?;

        self.release(&job, actor.id, ReleaseTrigger::Confirm).await
    }

    /// Either participant flags a problem. An open dispute freezes the
    /// release edge (customer confirm and auto-release both refuse).
    pub async fn report_issue(
        &self,
        actor: &Actor,
        job_id: Uuid,
        dto: ReportIssueDto,
    ) -> Result<Job, ServiceError> {
        let job = self.get_job(job_id).await?;
        if !job.is_participant(actor.id) {
            return Err(ServiceError::Forbidden(
                "only job participants can report an issue".to_string(),
            ));
        }
        if job.status.is_terminal() {
            return Err(ServiceError::Conflict("job is already closed".to_string()));
        }
        if job.has_open_dispute() {
            return Err(ServiceError::Conflict(
                "a dispute is already open for this job".to_string(),
            ));
        }

        let dispute = JobDispute {
            raised_by: actor.id,
            reason: dto.reason,
            opened_at: Utc::now(),
            resolved_at: None,
            resolution: None,
        };

        let job = self
            .store
            .write_dispute(job_id, &dispute)
            .await?
            .ok_or(ServiceError::NotFound("job"))?;

        self.audit_service
            .log_dispute_opened(actor.id, job.id, &dispute.reason)
            .await;
        self.notification_service
            .notify_dispute_opened(&job, actor.id)
            .await;

        Ok(job)
    }

    pub async fn resolve_dispute(
        &self,
        actor: &Actor,
        job_id: Uuid,
        dto: ResolveDisputeDto,
    ) -> Result<DisputeOutcome, ServiceError> {
        if !actor.is_admin {
            return Err(ServiceError::Forbidden(
                "only administrators can resolve disputes".to_string(),
            ));
        }

        let job = self.get_job(job_id).await?;
        let dispute = job
            .dispute
            .as_ref()
            .map(|d| d.0.clone())
            .filter(|d| d.is_open())
            .ok_or_else(|| ServiceError::Conflict("no open dispute on this job".to_string()))?;

        let resolution_label = match dto.resolution {
            DisputeResolutionDto::ReleaseToHustler => "release_to_hustler",
            DisputeResolutionDto::RefundToCustomer => "refund_to_customer",
        };

        if dto.resolution == DisputeResolutionDto::ReleaseToHustler
            && job.status != JobStatus::UnderReview
        {
            return Err(ServiceError::Conflict(
                "funds can only be released on jobs awaiting confirmation".to_string(),
            ));
        }

        let now = Utc::now();
        let mut resolved = dispute;
        resolved.resolved_at = Some(now);
        resolved.resolution = Some(
            dto.note
                .clone()
                .unwrap_or_else(|| resolution_label.to_string()),
        );

        let job = self
            .store
            .write_dispute(job_id, &resolved)
            .await?
            .ok_or(ServiceError::NotFound("job"))?;

        let outcome = match dto.resolution {
            DisputeResolutionDto::ReleaseToHustler => {
                let result = self.release(&job, actor.id, ReleaseTrigger::Dispute).await?;
                DisputeOutcome::Released(result)
            }
            DisputeResolutionDto::RefundToCustomer => {
                let cancelled = self
                    .store
                    .cancel_job(job.id, now)
                    .await?
                    .ok_or_else(|| ServiceError::Conflict("job is already closed".to_string()))?;
                let payment = self
                    .settle_payment_for_cancellation(
                        actor.id,
                        &cancelled,
                        Some("dispute resolved in customer's favor"),
                    )
                    .await?;
                self.notification_service.notify_job_cancelled(&cancelled).await;
                DisputeOutcome::Refunded(CancelResult {
                    job: cancelled,
                    payment,
                })
            }
        };

        self.audit_service
            .log_dispute_resolved(actor.id, job_id, resolution_label)
            .await;
        self.notification_service
            .notify_dispute_resolved(&job, resolution_label)
            .await;

        Ok(outcome)
    }

    /// Customer cancels. The job-side cancellation always goes through once
    /// claimed; a gateway failure on the void/refund flags the payment for
    /// manual reconciliation instead of blocking.
    pub async fn cancel_job(
        &self,
        actor: &Actor,
        job_id: Uuid,
        dto: CancelJobDto,
    ) -> Result<CancelResult, ServiceError> {
        let job = self.get_job(job_id).await?;
        let is_owner = job.customer_id == actor.id && actor.can_act_as_customer;
        if !is_owner && !actor.is_admin {
            return Err(ServiceError::Forbidden(
                "only the job owner can cancel this job".to_string(),
            ));
        }
        if job.status.is_terminal() {
            return Err(ServiceError::Conflict("job is already closed".to_string()));
        }

        // Wall-clock guard, evaluated at request time.
        if !actor.is_admin {
            let now = Utc::now();
            if now >= job.scheduled_start - self.settings.cancel_cutoff {
                return Err(ServiceError::Conflict(format!(
                    "jobs cannot be cancelled within {} hours of the scheduled start or after",
                    self.settings.cancel_cutoff.num_hours()
                )));
            }
        }

        let cancelled = self
            .store
            .cancel_job(job.id, Utc::now())
            .await?
            .ok_or_else(|| ServiceError::Conflict("job is already closed".to_string()))?;

        let payment = self
            .settle_payment_for_cancellation(actor.id, &cancelled, dto.reason.as_deref())
            .await?;

        self.notification_service.notify_job_cancelled(&cancelled).await;

        Ok(CancelResult {
            job: cancelled,
            payment,
        })
    }

    /// Administrative refund of a captured payment on a closed job.
    pub async fn admin_refund(
        &self,
        actor: &Actor,
        job_id: Uuid,
        dto: AdminRefundDto,
    ) -> Result<Payment, ServiceError> {
        if !actor.is_admin {
            return Err(ServiceError::Forbidden(
                "only administrators can issue refunds".to_string(),
            ));
        }

        let payment = self
            .store
            .get_payment_for_job(job_id)
            .await?
            .ok_or(ServiceError::NotFound("payment"))?;
        if payment.status != PaymentStatus::Captured {
            return Err(ServiceError::Conflict(
                "only captured payments can be refunded".to_string(),
            ));
        }

        let captured = payment.captured_amount.unwrap_or(payment.total);
        let amount = round2(dto.amount.unwrap_or(captured));
        if amount <= 0.0 || amount > captured {
            return Err(ServiceError::Validation(format!(
                "refund amount must be between 0 and the captured amount ({captured})"
            )));
        }

        self.gateway
            .refund(
                &payment.provider_id,
                Some(dollars_to_cents(amount)),
                &idem_key("refund", payment.id),
            )
            .await?;

        let updated = self
            .store
            .mark_payment_refunded(payment.id, amount, dto.reason.clone())
            .await?
            .ok_or_else(|| ServiceError::Conflict("payment is no longer refundable".to_string()))?;

        self.audit_service
            .log_refund(actor.id, &updated, amount, &dto.reason)
            .await;

        Ok(updated)
    }

    /// The 48-hour safety valve. Finds UnderReview jobs past the window with
    /// no open dispute and runs the release path without a code. Safe to run
    /// from overlapping cron ticks: the conditional claim plus idempotency
    /// keys guarantee single processing.
    pub async fn run_auto_release_sweep(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SweepOutcome, ServiceError> {
        let cutoff = now - self.settings.auto_release_after;
        let due = self.store.jobs_due_for_release(cutoff, 100).await?;
        let examined = due.len();
        let mut released = 0;
        let mut failed = 0;

        for job in due {
            match self.release(&job, Uuid::nil(), ReleaseTrigger::Auto).await {
                Ok(result) if result.newly_released => released += 1,
                Ok(_) => {}
                Err(e) => {
                    failed += 1;
                    tracing::error!("auto-release failed for job {}: {}", job.id, e);
                }
            }
        }

        Ok(SweepOutcome {
            examined,
            released,
            failed,
        })
    }

    async fn already_released(&self, job: Job) -> Result<ReleaseResult, ServiceError> {
        let payment = self
            .store
            .get_payment_for_job(job.id)
            .await?
            .ok_or_else(|| {
                ServiceError::Invariant(format!("completed job {} has no payment", job.id))
            })?;
        if !matches!(
            payment.status,
            PaymentStatus::Captured | PaymentStatus::Refunded
        ) {
            return Err(ServiceError::Invariant(format!(
                "completed job {} has payment in {:?}",
                job.id, payment.status
            )));
        }
        let payout = self.store.get_payout_for_job(job.id).await?;
        Ok(ReleaseResult {
            job,
            payment,
            payout,
            newly_released: false,
        })
    }

    /// Shared release path for confirm, auto-release and dispute release:
    /// capture (idempotent per payment), then claim Completed + Captured +
    /// payout in one store transaction, then transfer.
    async fn release(
        &self,
        job: &Job,
        actor_id: Uuid,
        trigger: ReleaseTrigger,
    ) -> Result<ReleaseResult, ServiceError> {
        let payment = self
            .store
            .get_payment_for_job(job.id)
            .await?
            .ok_or_else(|| {
                ServiceError::Invariant(format!(
                    "job {} in {:?} has no payment",
                    job.id, job.status
                ))
            })?;

        if payment.status == PaymentStatus::Captured {
            // A racer finished the release between our read and now.
            let refreshed = self.get_job(job.id).await?;
            let payout = self.store.get_payout_for_job(job.id).await?;
            return Ok(ReleaseResult {
                job: refreshed,
                payment,
                payout,
                newly_released: false,
            });
        }
        if payment.status != PaymentStatus::Preauthorized {
            return Err(ServiceError::Invariant(format!(
                "payment {} is {:?}, expected preauthorized",
                payment.id, payment.status
            )));
        }

        // Hourly captures are capped at the authorized headroom; the unused
        // remainder of the hold is released by the partial capture.
        let work_amount = match job.pay_type {
            PayType::Flat => payment.amount,
            PayType::Hourly => {
                let rate = job.hourly_rate.ok_or_else(|| {
                    ServiceError::Invariant(format!("hourly job {} has no rate", job.id))
                })?;
                let estimated = job.estimated_hours.ok_or_else(|| {
                    ServiceError::Invariant(format!(
                        "hourly job {} has no estimated hours",
                        job.id
                    ))
                })?;
                let max_hours = estimated * self.settings.hourly_auth_buffer;
                let hours = job.actual_hours.unwrap_or(estimated).min(max_hours);
                round2(rate * hours)
            }
        };
        let capture_total = round2(work_amount + payment.fee_customer + payment.tip).min(payment.total);
        let fee_hustler = round2(work_amount * fees::PLATFORM_FEE_RATE);

        self.gateway
            .capture(
                &payment.provider_id,
                Some(dollars_to_cents(capture_total)),
                &idem_key("capture", payment.id),
            )
            .await?;

        let now = Utc::now();
        let mut verification = job.verification.0.clone();
        if let Some(slot) = verification.completion.as_mut() {
            verification::consume(slot, now);
        }

        let payout = Payout {
            id: Uuid::new_v4(),
            job_id: job.id,
            hustler_id: payment.hustler_id,
            amount: round2(work_amount + payment.tip),
            platform_fee: fee_hustler,
            net_amount: round2(work_amount - fee_hustler + payment.tip),
            status: PayoutStatus::Pending,
            provider_transfer_id: None,
            created_at: now,
            updated_at: now,
        };
        let capture_update = CaptureUpdate {
            captured_amount: capture_total,
            fee_hustler,
            receipt_url: None,
        };

        let (job, payment) = match self
            .store
            .release_job(job.id, &verification, now, &capture_update, &payout)
            .await?
        {
            Some(pair) => pair,
            None => {
                // Claim lost after an (idempotent) capture: either a racer
                // finished the release, or a dispute landed in the gap.
                let refreshed = self.get_job(job.id).await?;
                if refreshed.status == JobStatus::Completed {
                    let payment = self
                        .store
                        .get_payment_for_job(refreshed.id)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::Invariant(format!(
                                "completed job {} has no payment",
                                refreshed.id
                            ))
                        })?;
                    let payout = self.store.get_payout_for_job(refreshed.id).await?;
                    return Ok(ReleaseResult {
                        job: refreshed,
                        payment,
                        payout,
                        newly_released: false,
                    });
                }
                if refreshed.has_open_dispute() {
                    return Err(ServiceError::Conflict(
                        "an open dispute is holding this job".to_string(),
                    ));
                }
                return Err(ServiceError::Invariant(format!(
                    "release claim failed for job {} in {:?}",
                    refreshed.id, refreshed.status
                )));
            }
        };

        self.audit_service
            .log_capture(actor_id, &payment, matches!(trigger, ReleaseTrigger::Auto))
            .await;

        let payout = self.send_payout(&job, &payout).await?;

        self.notification_service
            .notify_payment_released(&job, capture_total, matches!(trigger, ReleaseTrigger::Auto))
            .await;

        Ok(ReleaseResult {
            job,
            payment,
            payout: Some(payout),
            newly_released: true,
        })
    }

    /// Transfer captured funds to the hustler. Best-effort once capture has
    /// happened: a failed transfer marks the payout Failed for retry and is
    /// never allowed to unwind the release.
    async fn send_payout(&self, job: &Job, payout: &Payout) -> Result<Payout, ServiceError> {
        let destination = self.store.get_payout_account(payout.hustler_id).await?;
        let destination = match (destination, self.settings.payment_mode) {
            (Some(dest), _) => dest,
            (None, PaymentMode::TestBypass) => "acct_test_bypass".to_string(),
            (None, PaymentMode::Live) => {
                tracing::error!(
                    "hustler {} has no payout destination at transfer time",
                    payout.hustler_id
                );
                let updated = self
                    .store
                    .update_payout_status(job.id, PayoutStatus::Failed, None)
                    .await?;
                self.notification_service.notify_payout_failed(job).await;
                return Ok(updated.unwrap_or_else(|| payout.clone()));
            }
        };

        match self
            .gateway
            .transfer(
                &destination,
                dollars_to_cents(payout.net_amount),
                &idem_key("transfer", job.id),
            )
            .await
        {
            Ok(transfer) => {
                let updated = self
                    .store
                    .update_payout_status(job.id, PayoutStatus::Completed, Some(transfer.transfer_id))
                    .await?;
                Ok(updated.unwrap_or_else(|| payout.clone()))
            }
            Err(e) => {
                tracing::warn!("payout transfer for job {} failed: {}", job.id, e.message);
                let updated = self
                    .store
                    .update_payout_status(job.id, PayoutStatus::Failed, None)
                    .await?;
                self.notification_service.notify_payout_failed(job).await;
                Ok(updated.unwrap_or_else(|| payout.clone()))
            }
        }
    }

    async fn settle_payment_for_cancellation(
        &self,
        actor_id: Uuid,
        job: &Job,
        reason: Option<&str>,
    ) -> Result<Option<Payment>, ServiceError> {
        let payment = match self.store.get_payment_for_job(job.id).await? {
            Some(payment) => payment,
            None => return Ok(None),
        };

        match payment.status {
            PaymentStatus::Preauthorized => {
                match self
                    .gateway
                    .void(&payment.provider_id, &idem_key("void", payment.id))
                    .await
                {
                    Ok(()) => {
                        let updated = self
                            .store
                            .mark_payment_voided(payment.id)
                            .await?
                            .unwrap_or(payment);
                        self.audit_service.log_void(actor_id, &updated).await;
                        Ok(Some(updated))
                    }
                    Err(e) => {
                        // The job stays cancelled; never mark the payment
                        // voided when the hold wasn't actually released.
                        tracing::error!(
                            "void failed for payment {} on cancelled job {}: {}",
                            payment.id,
                            job.id,
                            e.message
                        );
                        self.store.flag_payment_for_reconciliation(payment.id).await?;
                        self.audit_service
                            .log_reconciliation_required(actor_id, &payment, "void", &e.message)
                            .await;
                        Ok(Some(payment))
                    }
                }
            }
            PaymentStatus::Captured => {
                let amount = payment.captured_amount.unwrap_or(payment.total);
                let reason = reason.unwrap_or("job cancelled").to_string();
                match self
                    .gateway
                    .refund(
                        &payment.provider_id,
                        Some(dollars_to_cents(amount)),
                        &idem_key("refund", payment.id),
                    )
                    .await
                {
                    Ok(()) => {
                        let updated = self
                            .store
                            .mark_payment_refunded(payment.id, amount, reason.clone())
                            .await?
                            .unwrap_or(payment);
                        self.audit_service
                            .log_refund(actor_id, &updated, amount, &reason)
                            .await;
                        Ok(Some(updated))
                    }
                    Err(e) => {
                        tracing::error!(
                            "refund failed for payment {} on cancelled job {}: {}",
                            payment.id,
                            job.id,
                            e.message
                        );
                        self.store.flag_payment_for_reconciliation(payment.id).await?;
                        self.audit_service
                            .log_reconciliation_required(actor_id, &payment, "refund", &e.message)
                            .await;
                        Ok(Some(payment))
                    }
                }
            }
            // Already settled; nothing left to move.
            PaymentStatus::Voided | PaymentStatus::Refunded => Ok(Some(payment)),
        }
    }
}

// Result types for service methods
#[derive(Debug, Serialize)]
pub struct AssignmentResult {
    pub job: Job,
    pub payment: Payment,
    /// Disclosed to the customer, who reads it out to the hustler at
    /// handoff.
    pub start_code: String,
}

#[derive(Debug, Serialize)]
pub struct CompletionResult {
    pub job: Job,
    /// Disclosed to the hustler, who shows it to the customer.
    pub completion_code: String,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResult {
    pub job: Job,
    pub payment: Payment,
    pub payout: Option<Payout>,
    /// False when this call observed a release that had already happened.
    pub newly_released: bool,
}

#[derive(Debug, Serialize)]
pub struct CancelResult {
    pub job: Job,
    pub payment: Option<Payment>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DisputeOutcome {
    Released(ReleaseResult),
    Refunded(CancelResult),
}

#[derive(Debug, Serialize)]
pub struct SweepOutcome {
    pub examined: usize,
    pub released: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::memdb::MemStore,
        models::jobmodel::JobCategory,
        service::payment_gateway::testing::RecordingGateway,
    };

    struct Harness {
        service: LifecycleService,
        store: Arc<MemStore>,
        gateway: Arc<RecordingGateway>,
        customer: Actor,
        hustler: Actor,
        admin: Actor,
    }

    fn harness() -> Harness {
        harness_with_mode(PaymentMode::Live)
    }

    fn harness_with_mode(mode: PaymentMode) -> Harness {
        let store = Arc::new(MemStore::new());
        let gateway = Arc::new(RecordingGateway::new());
        let notification_service = Arc::new(NotificationService::new(store.clone()));
        let audit_service = Arc::new(AuditService::new(store.clone()));
        let settings = LifecycleSettings {
            payment_mode: mode,
            auto_release_after: Duration::hours(48),
            hourly_auth_buffer: 1.2,
            cancel_cutoff: Duration::hours(2),
        };
        let service = LifecycleService::new(
            store.clone(),
            gateway.clone(),
            notification_service,
            audit_service,
            settings,
        );
        Harness {
            service,
            store,
            gateway,
            customer: Actor::customer(Uuid::new_v4()),
            hustler: Actor::hustler(Uuid::new_v4()),
            admin: Actor::admin(Uuid::new_v4()),
        }
    }

    fn flat_job_dto(amount: f64, hours_from_now: i64) -> CreateJobDto {
        CreateJobDto {
            category: JobCategory::Moving,
            title: "Move a couch".to_string(),
            description: "Two-seater couch from a second-floor walkup into a van.".to_string(),
            location_state: "CA".to_string(),
            location_city: "Oakland".to_string(),
            location_address: "123 Grand Ave".to_string(),
            lat: None,
            lng: None,
            scheduled_start: Utc::now() + Duration::hours(hours_from_now),
            scheduled_end: None,
            pay_type: PayType::Flat,
            amount: Some(amount),
            hourly_rate: None,
            estimated_hours: None,
        }
    }

    fn hourly_job_dto(rate: f64, hours: f64) -> CreateJobDto {
        CreateJobDto {
            category: JobCategory::Cleaning,
            title: "Deep clean a two-bedroom".to_string(),
            description: "Full apartment deep clean including kitchen and both baths.".to_string(),
            location_state: "CA".to_string(),
            location_city: "Oakland".to_string(),
            location_address: "456 Lake Merritt Blvd".to_string(),
            lat: None,
            lng: None,
            scheduled_start: Utc::now() + Duration::hours(48),
            scheduled_end: None,
            pay_type: PayType::Hourly,
            amount: None,
            hourly_rate: Some(rate),
            estimated_hours: Some(hours),
        }
    }

    fn no_offer() -> CreateOfferDto {
        CreateOfferDto {
            note: None,
            proposed_amount: None,
        }
    }

    /// A wrong code that provably differs from `code`.
    fn wrong_code(code: &str) -> String {
        code.chars()
            .map(|c| if c == '0' { '1' } else { '0' })
            .collect()
    }

    async fn onboard(h: &Harness) {
        h.store
            .upsert_payout_account(h.hustler.id, "acct_hustler")
            .await
            .unwrap();
    }

    async fn offered(h: &Harness, dto: CreateJobDto) -> (Job, Offer) {
        onboard(h).await;
        let job = h.service.create_job(&h.customer, dto).await.unwrap();
        let offer = h
            .service
            .create_offer(&h.hustler, job.id, no_offer())
            .await
            .unwrap();
        (job, offer)
    }

    async fn assigned(h: &Harness) -> AssignmentResult {
        let (_, offer) = offered(h, flat_job_dto(100.0, 48)).await;
        h.service
            .accept_offer(&h.customer, offer.id, AcceptOfferDto::default())
            .await
            .unwrap()
    }

    async fn under_review(h: &Harness) -> CompletionResult {
        let a = assigned(h).await;
        let job = h
            .service
            .start_job(
                &h.hustler,
                a.job.id,
                StartJobDto {
                    code: a.start_code.clone(),
                },
            )
            .await
            .unwrap();
        h.service
            .complete_job(&h.hustler, job.id, CompleteJobDto::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn flat_job_requires_an_amount() {
        let h = harness();
        let mut dto = flat_job_dto(100.0, 48);
        dto.amount = None;
        let err = h.service.create_job(&h.customer, dto).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn accepting_an_offer_preauthorizes_the_fee_total() {
        let h = harness();
        let result = assigned(&h).await;

        assert_eq!(result.job.status, JobStatus::Assigned);
        assert_eq!(result.job.hustler_id, Some(h.hustler.id));
        assert_eq!(result.payment.status, PaymentStatus::Preauthorized);
        assert_eq!(result.payment.fee_customer, 6.50);
        assert_eq!(result.payment.total, 106.50);
        assert_eq!(result.start_code.len(), 4);

        let preauths = h.gateway.calls_for("preauthorize");
        assert_eq!(preauths.len(), 1);
        assert_eq!(preauths[0].amount_cents, Some(10650));

        // An assigned job always has its payment and thread visible.
        assert!(h
            .store
            .get_payment_for_job(result.job.id)
            .await
            .unwrap()
            .is_some());
        assert!(h
            .store
            .get_thread_for_job(result.job.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn accepting_one_offer_declines_the_siblings() {
        let h = harness();
        let rival = Actor::hustler(Uuid::new_v4());
        let (job, offer) = offered(&h, flat_job_dto(100.0, 48)).await;
        let rival_offer = h
            .service
            .create_offer(&rival, job.id, no_offer())
            .await
            .unwrap();

        h.service
            .accept_offer(&h.customer, offer.id, AcceptOfferDto::default())
            .await
            .unwrap();

        let offers = h.store.list_offers_for_job(job.id).await.unwrap();
        assert_eq!(
            offers
                .iter()
                .filter(|o| o.status == OfferStatus::Accepted)
                .count(),
            1
        );
        let rival_offer = offers.iter().find(|o| o.id == rival_offer.id).unwrap();
        assert_eq!(rival_offer.status, OfferStatus::Declined);
    }

    #[tokio::test]
    async fn acceptance_requires_an_onboarded_payee() {
        let h = harness();
        let job = h
            .service
            .create_job(&h.customer, flat_job_dto(100.0, 48))
            .await
            .unwrap();
        let offer = h
            .service
            .create_offer(&h.hustler, job.id, no_offer())
            .await
            .unwrap();

        let err = h
            .service
            .accept_offer(&h.customer, offer.id, AcceptOfferDto::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PayeeNotOnboarded(_)));
    }

    #[tokio::test]
    async fn test_bypass_mode_skips_the_onboarding_check() {
        let h = harness_with_mode(PaymentMode::TestBypass);
        let job = h
            .service
            .create_job(&h.customer, flat_job_dto(100.0, 48))
            .await
            .unwrap();
        let offer = h
            .service
            .create_offer(&h.hustler, job.id, no_offer())
            .await
            .unwrap();

        let result = h
            .service
            .accept_offer(&h.customer, offer.id, AcceptOfferDto::default())
            .await
            .unwrap();
        assert_eq!(result.job.status, JobStatus::Assigned);
    }

    #[tokio::test]
    async fn hustlers_cannot_offer_on_their_own_jobs() {
        let h = harness();
        let both_roles = Actor {
            id: h.customer.id,
            can_act_as_customer: true,
            can_act_as_hustler: true,
            is_admin: false,
        };
        let job = h
            .service
            .create_job(&h.customer, flat_job_dto(100.0, 48))
            .await
            .unwrap();

        let err = h
            .service
            .create_offer(&both_roles, job.id, no_offer())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn one_pending_offer_per_hustler_per_job() {
        let h = harness();
        let (job, _) = offered(&h, flat_job_dto(100.0, 48)).await;
        let err = h
            .service
            .create_offer(&h.hustler, job.id, no_offer())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn concurrent_accepts_pick_exactly_one_winner() {
        let h = harness();
        onboard(&h).await;
        let rival = Actor::hustler(Uuid::new_v4());
        h.store
            .upsert_payout_account(rival.id, "acct_rival")
            .await
            .unwrap();

        let job = h
            .service
            .create_job(&h.customer, flat_job_dto(100.0, 48))
            .await
            .unwrap();
        let offer_a = h
            .service
            .create_offer(&h.hustler, job.id, no_offer())
            .await
            .unwrap();
        let offer_b = h
            .service
            .create_offer(&rival, job.id, no_offer())
            .await
            .unwrap();

        let (ra, rb) = tokio::join!(
            h.service
                .accept_offer(&h.customer, offer_a.id, AcceptOfferDto::default()),
            h.service
                .accept_offer(&h.customer, offer_b.id, AcceptOfferDto::default()),
        );

        let successes = [ra.is_ok(), rb.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        let loser = [ra, rb].into_iter().find_map(|r| r.err()).unwrap();
        assert!(matches!(loser, ServiceError::Conflict(_)));

        let job = h.service.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Assigned);
        assert!(h.store.get_payment_for_job(job.id).await.unwrap().is_some());

        let offers = h.store.list_offers_for_job(job.id).await.unwrap();
        assert_eq!(
            offers
                .iter()
                .filter(|o| o.status == OfferStatus::Accepted)
                .count(),
            1
        );

        // If the loser got as far as pre-authorizing, its hold was voided.
        if h.gateway.effective_ops("preauthorize") == 2 {
            assert_eq!(h.gateway.effective_ops("void"), 1);
        }
    }

    #[tokio::test]
    async fn gateway_failure_during_accept_leaves_nothing_behind() {
        let h = harness();
        let (job, offer) = offered(&h, flat_job_dto(100.0, 48)).await;
        h.gateway.fail_op("preauthorize");

        let err = h
            .service
            .accept_offer(&h.customer, offer.id, AcceptOfferDto::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Gateway {
                money_moved: false,
                ..
            }
        ));

        let job = h.service.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Open);
        assert!(h.store.get_payment_for_job(job.id).await.unwrap().is_none());
        let offer = h.store.get_offer(offer.id).await.unwrap().unwrap();
        assert_eq!(offer.status, OfferStatus::Pending);
    }

    #[tokio::test]
    async fn start_code_handshake_is_single_use() {
        let h = harness();
        let a = assigned(&h).await;

        let err = h
            .service
            .start_job(
                &h.hustler,
                a.job.id,
                StartJobDto {
                    code: wrong_code(&a.start_code),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // Formatting noise in the submitted code is tolerated.
        let spaced = format!(" {} ", a.start_code);
        let job = h
            .service
            .start_job(&h.hustler, a.job.id, StartJobDto { code: spaced })
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
        assert!(job.started_at.is_some());

        // Replaying the consumed code is a distinct condition, and the job
        // does not move.
        let err = h
            .service
            .start_job(
                &h.hustler,
                a.job.id,
                StartJobDto {
                    code: a.start_code.clone(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CodeAlreadyUsed("start")));
        assert_eq!(
            h.service.get_job(a.job.id).await.unwrap().status,
            JobStatus::InProgress
        );
    }

    #[tokio::test]
    async fn missing_start_code_is_an_explicit_error() {
        let h = harness();
        let a = assigned(&h).await;
        // Wipe the slot to simulate a job assigned before codes existed.
        h.store
            .set_start_code(a.job.id, &JobVerification::default())
            .await
            .unwrap();

        let err = h
            .service
            .start_job(
                &h.hustler,
                a.job.id,
                StartJobDto {
                    code: "1234".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoCodeGenerated("start")));
    }

    #[tokio::test]
    async fn customers_can_regenerate_an_unused_start_code() {
        let h = harness();
        let a = assigned(&h).await;

        let (_, new_code) = h
            .service
            .regenerate_start_code(&h.customer, a.job.id)
            .await
            .unwrap();

        let job = h
            .service
            .start_job(&h.hustler, a.job.id, StartJobDto { code: new_code })
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn confirm_captures_and_pays_out_exactly_once() {
        let h = harness();
        let c = under_review(&h).await;
        assert_eq!(c.job.status, JobStatus::UnderReview);
        assert_eq!(c.completion_code.len(), 6);

        let r = h
            .service
            .confirm_completion(
                &h.customer,
                c.job.id,
                ConfirmCompletionDto {
                    code: c.completion_code.clone(),
                },
            )
            .await
            .unwrap();
        assert!(r.newly_released);
        assert_eq!(r.job.status, JobStatus::Completed);
        assert_eq!(r.payment.status, PaymentStatus::Captured);
        assert_eq!(r.payment.captured_amount, Some(106.50));
        assert_eq!(r.payment.fee_hustler, Some(12.00));
        let payout = r.payout.unwrap();
        assert_eq!(payout.status, PayoutStatus::Completed);
        assert_eq!(payout.net_amount, 88.00);

        // A retried confirm reaches the same terminal state without a second
        // capture or transfer.
        let again = h
            .service
            .confirm_completion(
                &h.customer,
                c.job.id,
                ConfirmCompletionDto {
                    code: c.completion_code.clone(),
                },
            )
            .await
            .unwrap();
        assert!(!again.newly_released);
        assert_eq!(again.payment.status, PaymentStatus::Captured);

        assert_eq!(h.gateway.effective_ops("capture"), 1);
        assert_eq!(h.gateway.effective_ops("transfer"), 1);
        assert_eq!(h.store.payout_count().await, 1);

        // Both parties were told, best-effort, along the way.
        assert!(h.store.notification_count().await > 0);
    }

    #[tokio::test]
    async fn wrong_completion_code_leaves_the_job_under_review() {
        let h = harness();
        let c = under_review(&h).await;

        let err = h
            .service
            .confirm_completion(
                &h.customer,
                c.job.id,
                ConfirmCompletionDto {
                    code: wrong_code(&c.completion_code),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let job = h.service.get_job(c.job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::UnderReview);
        let payment = h.store.get_payment_for_job(c.job.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Preauthorized);
    }

    #[tokio::test]
    async fn capture_failure_aborts_the_confirm() {
        let h = harness();
        let c = under_review(&h).await;
        h.gateway.fail_op("capture");

        let err = h
            .service
            .confirm_completion(
                &h.customer,
                c.job.id,
                ConfirmCompletionDto {
                    code: c.completion_code.clone(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Gateway {
                money_moved: false,
                ..
            }
        ));

        // Nothing moved: still awaiting confirmation, still preauthorized.
        let job = h.service.get_job(c.job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::UnderReview);
        let payment = h.store.get_payment_for_job(c.job.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Preauthorized);

        // The same confirm succeeds once the gateway recovers.
        h.gateway.clear_failures();
        let r = h
            .service
            .confirm_completion(
                &h.customer,
                c.job.id,
                ConfirmCompletionDto {
                    code: c.completion_code.clone(),
                },
            )
            .await
            .unwrap();
        assert!(r.newly_released);
    }

    #[tokio::test]
    async fn cancelling_an_assigned_job_voids_the_hold() {
        let h = harness();
        let a = assigned(&h).await;

        let r = h
            .service
            .cancel_job(&h.customer, a.job.id, CancelJobDto::default())
            .await
            .unwrap();
        assert_eq!(r.job.status, JobStatus::Cancelled);
        let payment = r.payment.unwrap();
        assert_eq!(payment.status, PaymentStatus::Voided);
        assert_eq!(h.gateway.effective_ops("void"), 1);
    }

    #[tokio::test]
    async fn cancellation_is_blocked_close_to_the_scheduled_start() {
        let h = harness();
        let (_, offer) = offered(&h, flat_job_dto(100.0, 1)).await;
        let a = h
            .service
            .accept_offer(&h.customer, offer.id, AcceptOfferDto::default())
            .await
            .unwrap();

        let err = h
            .service
            .cancel_job(&h.customer, a.job.id, CancelJobDto::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(
            h.service.get_job(a.job.id).await.unwrap().status,
            JobStatus::Assigned
        );
    }

    #[tokio::test]
    async fn failed_void_still_cancels_but_flags_reconciliation() {
        let h = harness();
        let a = assigned(&h).await;
        h.gateway.fail_op("void");

        let r = h
            .service
            .cancel_job(&h.customer, a.job.id, CancelJobDto::default())
            .await
            .unwrap();
        assert_eq!(r.job.status, JobStatus::Cancelled);

        // Never marked voided when the hold wasn't released.
        let payment = r.payment.unwrap();
        assert_eq!(payment.status, PaymentStatus::Preauthorized);
        let stored = h.store.get_payment_for_job(a.job.id).await.unwrap().unwrap();
        assert!(stored.needs_reconciliation);
        assert!(h.store.audit_log_count().await >= 1);
    }

    #[tokio::test]
    async fn auto_release_sweep_processes_once_even_when_run_twice() {
        let h = harness();
        let c = under_review(&h).await;

        let fifty_hours_on = Utc::now() + Duration::hours(50);
        let (s1, s2) = tokio::join!(
            h.service.run_auto_release_sweep(fifty_hours_on),
            h.service.run_auto_release_sweep(fifty_hours_on),
        );
        let (s1, s2) = (s1.unwrap(), s2.unwrap());

        assert_eq!(s1.released + s2.released, 1);
        assert_eq!(s1.failed + s2.failed, 0);

        let job = h.service.get_job(c.job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let payment = h.store.get_payment_for_job(c.job.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Captured);
        assert_eq!(h.gateway.effective_ops("capture"), 1);
        assert_eq!(h.gateway.effective_ops("transfer"), 1);
        assert_eq!(h.store.payout_count().await, 1);
    }

    #[tokio::test]
    async fn fresh_completions_are_not_swept() {
        let h = harness();
        let c = under_review(&h).await;

        let sweep = h.service.run_auto_release_sweep(Utc::now()).await.unwrap();
        assert_eq!(sweep.examined, 0);
        assert_eq!(
            h.service.get_job(c.job.id).await.unwrap().status,
            JobStatus::UnderReview
        );
    }

    #[tokio::test]
    async fn an_open_dispute_freezes_release() {
        let h = harness();
        let c = under_review(&h).await;

        h.service
            .report_issue(
                &h.customer,
                c.job.id,
                ReportIssueDto {
                    reason: "The couch leg is cracked".to_string(),
                },
            )
            .await
            .unwrap();

        // Auto-release skips the disputed job entirely.
        let sweep = h
            .service
            .run_auto_release_sweep(Utc::now() + Duration::hours(50))
            .await
            .unwrap();
        assert_eq!(sweep.examined, 0);

        // And the customer cannot confirm around the dispute either.
        let err = h
            .service
            .confirm_completion(
                &h.customer,
                c.job.id,
                ConfirmCompletionDto {
                    code: c.completion_code.clone(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(h.gateway.effective_ops("capture"), 0);
    }

    #[tokio::test]
    async fn resolving_a_dispute_for_the_hustler_releases_funds() {
        let h = harness();
        let c = under_review(&h).await;
        h.service
            .report_issue(
                &h.customer,
                c.job.id,
                ReportIssueDto {
                    reason: "Finished later than agreed".to_string(),
                },
            )
            .await
            .unwrap();

        let outcome = h
            .service
            .resolve_dispute(
                &h.admin,
                c.job.id,
                ResolveDisputeDto {
                    resolution: DisputeResolutionDto::ReleaseToHustler,
                    note: None,
                },
            )
            .await
            .unwrap();

        match outcome {
            DisputeOutcome::Released(r) => {
                assert_eq!(r.job.status, JobStatus::Completed);
                assert_eq!(r.payment.status, PaymentStatus::Captured);
            }
            DisputeOutcome::Refunded(_) => panic!("expected release"),
        }
        assert_eq!(h.gateway.effective_ops("capture"), 1);
    }

    #[tokio::test]
    async fn resolving_a_dispute_for_the_customer_voids_the_hold() {
        let h = harness();
        let c = under_review(&h).await;
        h.service
            .report_issue(
                &h.hustler,
                c.job.id,
                ReportIssueDto {
                    reason: "Customer refused access to the unit".to_string(),
                },
            )
            .await
            .unwrap();

        let outcome = h
            .service
            .resolve_dispute(
                &h.admin,
                c.job.id,
                ResolveDisputeDto {
                    resolution: DisputeResolutionDto::RefundToCustomer,
                    note: Some("work never happened".to_string()),
                },
            )
            .await
            .unwrap();

        match outcome {
            DisputeOutcome::Refunded(r) => {
                assert_eq!(r.job.status, JobStatus::Cancelled);
                assert_eq!(r.payment.unwrap().status, PaymentStatus::Voided);
            }
            DisputeOutcome::Released(_) => panic!("expected refund"),
        }

        let job = h.service.get_job(c.job.id).await.unwrap();
        assert!(!job.has_open_dispute());
    }

    #[tokio::test]
    async fn admin_refund_after_release() {
        let h = harness();
        let c = under_review(&h).await;
        h.service
            .confirm_completion(
                &h.customer,
                c.job.id,
                ConfirmCompletionDto {
                    code: c.completion_code.clone(),
                },
            )
            .await
            .unwrap();

        // Non-admins are rejected outright.
        let err = h
            .service
            .admin_refund(
                &h.customer,
                c.job.id,
                AdminRefundDto {
                    amount: Some(50.0),
                    reason: "goodwill refund".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let payment = h
            .service
            .admin_refund(
                &h.admin,
                c.job.id,
                AdminRefundDto {
                    amount: Some(50.0),
                    reason: "goodwill refund".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert_eq!(payment.refund_amount, Some(50.0));
        assert_eq!(h.gateway.effective_ops("refund"), 1);
    }

    #[tokio::test]
    async fn hourly_capture_is_capped_at_the_authorized_headroom() {
        let h = harness();
        onboard(&h).await;
        let job = h
            .service
            .create_job(&h.customer, hourly_job_dto(50.0, 4.0))
            .await
            .unwrap();
        assert_eq!(job.amount, 200.0);

        let offer = h
            .service
            .create_offer(&h.hustler, job.id, no_offer())
            .await
            .unwrap();
        let a = h
            .service
            .accept_offer(&h.customer, offer.id, AcceptOfferDto::default())
            .await
            .unwrap();
        // 200 * 1.2 headroom + 13.00 customer fee
        assert_eq!(a.payment.total, 253.00);

        h.service
            .start_job(
                &h.hustler,
                job.id,
                StartJobDto {
                    code: a.start_code.clone(),
                },
            )
            .await
            .unwrap();
        let c = h
            .service
            .complete_job(
                &h.hustler,
                job.id,
                CompleteJobDto {
                    actual_hours: Some(10.0),
                },
            )
            .await
            .unwrap();

        let r = h
            .service
            .confirm_completion(
                &h.customer,
                job.id,
                ConfirmCompletionDto {
                    code: c.completion_code.clone(),
                },
            )
            .await
            .unwrap();

        // Ten claimed hours cap at 4.8 billable: 240 work + 13 fee.
        assert_eq!(r.payment.captured_amount, Some(253.00));
        assert_eq!(r.payment.fee_hustler, Some(28.80));
        assert_eq!(r.payout.unwrap().net_amount, 211.20);
    }

    #[tokio::test]
    async fn hourly_capture_bills_actual_hours_under_the_estimate() {
        let h = harness();
        onboard(&h).await;
        let job = h
            .service
            .create_job(&h.customer, hourly_job_dto(50.0, 4.0))
            .await
            .unwrap();
        let offer = h
            .service
            .create_offer(&h.hustler, job.id, no_offer())
            .await
            .unwrap();
        let a = h
            .service
            .accept_offer(&h.customer, offer.id, AcceptOfferDto::default())
            .await
            .unwrap();
        h.service
            .start_job(
                &h.hustler,
                job.id,
                StartJobDto {
                    code: a.start_code.clone(),
                },
            )
            .await
            .unwrap();
        let c = h
            .service
            .complete_job(
                &h.hustler,
                job.id,
                CompleteJobDto {
                    actual_hours: Some(3.0),
                },
            )
            .await
            .unwrap();

        let r = h
            .service
            .confirm_completion(
                &h.customer,
                job.id,
                ConfirmCompletionDto {
                    code: c.completion_code,
                },
            )
            .await
            .unwrap();

        // 3h * $50 = 150 work + 13 fee; the rest of the hold is released.
        assert_eq!(r.payment.captured_amount, Some(163.00));
        assert_eq!(r.payment.fee_hustler, Some(18.00));
    }

    #[tokio::test]
    async fn open_jobs_with_offers_cannot_be_deleted() {
        let h = harness();
        let (job, _) = offered(&h, flat_job_dto(100.0, 48)).await;

        let err = h.service.delete_job(&h.customer, job.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let fresh = h
            .service
            .create_job(&h.customer, flat_job_dto(60.0, 48))
            .await
            .unwrap();
        h.service.delete_job(&h.customer, fresh.id).await.unwrap();
        let err = h.service.get_job(fresh.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("job")));
    }

    #[tokio::test]
    async fn strangers_cannot_report_issues() {
        let h = harness();
        let c = under_review(&h).await;
        let stranger = Actor::customer(Uuid::new_v4());

        let err = h
            .service
            .report_issue(
                &stranger,
                c.job.id,
                ReportIssueDto {
                    reason: "I just do not like this job".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }
}
