// services/notification_service.rs
//
// Fire-and-forget dispatch. Every method swallows its own failures: a lost
// notification must never roll back or fail the lifecycle transition that
// triggered it.
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::store::{MarketStore, StoreError},
    models::{
        chatmodels::Notification,
        jobmodel::Job,
        offermodel::Offer,
    },
    utils::currency::{dollars_to_cents, format_cents_as_dollars},
};

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn MarketStore>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self { store }
    }

    pub async fn notify_job_posted(&self, job: &Job) {
        tracing::info!(
            "new job posted: {} in {} ({})",
            job.title,
            job.location_city,
            job.category.to_str()
        );

        self.dispatch(
            None,
            "job_posted",
            Some(job.id),
            Some(serde_json::json!({
                "title": job.title,
                "category": job.category.to_str(),
                "city": job.location_city,
            })),
            format!("New job available: {}", job.title),
        )
        .await;
    }

    pub async fn notify_new_offer(&self, job: &Job, offer: &Offer) {
        self.dispatch(
            Some(job.customer_id),
            "offer_received",
            Some(job.id),
            Some(serde_json::json!({
                "offer_id": offer.id,
                "proposed_amount": offer.proposed_amount,
            })),
            format!("You received a new offer on \"{}\"", job.title),
        )
        .await;
    }

    pub async fn notify_job_assigned(&self, job: &Job) {
        if let Some(hustler_id) = job.hustler_id {
            self.dispatch(
                Some(hustler_id),
                "job_assigned",
                Some(job.id),
                None,
                format!("You were assigned to \"{}\"", job.title),
            )
            .await;
        }
        self.dispatch(
            Some(job.customer_id),
            "job_assigned",
            Some(job.id),
            None,
            format!("Your card was pre-authorized for \"{}\"", job.title),
        )
        .await;
    }

    pub async fn notify_job_started(&self, job: &Job) {
        self.dispatch(
            Some(job.customer_id),
            "job_started",
            Some(job.id),
            None,
            format!("Work has started on \"{}\"", job.title),
        )
        .await;
    }

    pub async fn notify_completion_submitted(&self, job: &Job) {
        self.dispatch(
            Some(job.customer_id),
            "completion_submitted",
            Some(job.id),
            None,
            format!(
                "\"{}\" was marked complete. Enter the completion code to release payment.",
                job.title
            ),
        )
        .await;
    }

    pub async fn notify_payment_released(&self, job: &Job, amount: f64, auto: bool) {
        let detail = if auto { " automatically" } else { "" };
        let pretty = format_cents_as_dollars(dollars_to_cents(amount));
        if let Some(hustler_id) = job.hustler_id {
            self.dispatch(
                Some(hustler_id),
                "payment_released",
                Some(job.id),
                Some(serde_json::json!({ "amount": amount, "auto": auto })),
                format!("Payment for \"{}\" was released{}", job.title, detail),
            )
            .await;
        }
        self.dispatch(
            Some(job.customer_id),
            "payment_released",
            Some(job.id),
            Some(serde_json::json!({ "amount": amount, "auto": auto })),
            format!(
                "Your payment of {} for \"{}\" was captured{}",
                pretty, job.title, detail
            ),
        )
        .await;
    }

    pub async fn notify_job_cancelled(&self, job: &Job) {
        for user_id in [Some(job.customer_id), job.hustler_id].into_iter().flatten() {
            self.dispatch(
                Some(user_id),
                "job_cancelled",
                Some(job.id),
                None,
                format!("\"{}\" was cancelled", job.title),
            )
            .await;
        }
    }

    pub async fn notify_dispute_opened(&self, job: &Job, raised_by: Uuid) {
        for user_id in [Some(job.customer_id), job.hustler_id].into_iter().flatten() {
            if user_id == raised_by {
                continue;
            }
            self.dispatch(
                Some(user_id),
                "dispute_opened",
                Some(job.id),
                None,
                format!("An issue was reported on \"{}\". Payment is on hold.", job.title),
            )
            .await;
        }
    }

    pub async fn notify_dispute_resolved(&self, job: &Job, resolution: &str) {
        for user_id in [Some(job.customer_id), job.hustler_id].into_iter().flatten() {
            self.dispatch(
                Some(user_id),
                "dispute_resolved",
                Some(job.id),
                Some(serde_json::json!({ "resolution": resolution })),
                format!("The dispute on \"{}\" was resolved", job.title),
            )
            .await;
        }
    }

    pub async fn notify_payout_failed(&self, job: &Job) {
        if let Some(hustler_id) = job.hustler_id {
            self.dispatch(
                Some(hustler_id),
                "payout_failed",
                Some(job.id),
                None,
                format!(
                    "Your payout for \"{}\" could not be sent. We will retry shortly.",
                    job.title
                ),
            )
            .await;
        }
    }

    async fn dispatch(
        &self,
        user_id: Option<Uuid>,
        event_type: &str,
        job_id: Option<Uuid>,
        metadata: Option<serde_json::Value>,
        message: String,
    ) {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            event_type: event_type.to_string(),
            job_id,
            metadata,
            message,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store_notification(&notification).await {
            tracing::warn!("failed to dispatch {} notification: {}", event_type, e);
        }
    }

    async fn store_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        self.store.insert_notification(notification).await
    }
}
