// services/audit_service.rs
//
// Append-only trail of privileged financial actions: voids, refunds,
// auto-releases, dispute resolutions, and gateway failures left for manual
// reconciliation. Rows are write-once and never read back for control flow.
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::store::{MarketStore, StoreError},
    models::{chatmodels::AuditLog, paymentmodel::Payment},
};

#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn MarketStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self { store }
    }

    pub async fn log_escrow_preauthorized(&self, actor_id: Uuid, payment: &Payment) {
        self.record(
            actor_id,
            "escrow_preauthorized",
            Some(payment.job_id),
            Some(serde_json::json!({
                "payment_id": payment.id,
                "provider_id": payment.provider_id,
                "total": payment.total,
            })),
            "Escrow pre-authorization placed".to_string(),
        )
        .await;
    }

    pub async fn log_capture(&self, actor_id: Uuid, payment: &Payment, auto: bool) {
        self.record(
            actor_id,
            if auto { "auto_release" } else { "capture" },
            Some(payment.job_id),
            Some(serde_json::json!({
                "payment_id": payment.id,
                "captured_amount": payment.captured_amount,
            })),
            if auto {
                "Escrow captured by auto-release sweep".to_string()
            } else {
                "Escrow captured on customer confirmation".to_string()
            },
        )
        .await;
    }

    pub async fn log_void(&self, actor_id: Uuid, payment: &Payment) {
        self.record(
            actor_id,
            "void",
            Some(payment.job_id),
            Some(serde_json::json!({
                "payment_id": payment.id,
                "provider_id": payment.provider_id,
            })),
            "Escrow authorization voided".to_string(),
        )
        .await;
    }

    pub async fn log_refund(&self, actor_id: Uuid, payment: &Payment, amount: f64, reason: &str) {
        self.record(
            actor_id,
            "refund",
            Some(payment.job_id),
            Some(serde_json::json!({
                "payment_id": payment.id,
                "amount": amount,
                "reason": reason,
            })),
            "Captured payment refunded".to_string(),
        )
        .await;
    }

    /// A void/refund failed after the job-side state change went through;
    /// the payment row is flagged and someone has to reconcile it against
    /// the gateway by hand.
    pub async fn log_reconciliation_required(
        &self,
        actor_id: Uuid,
        payment: &Payment,
        attempted: &str,
        gateway_message: &str,
    ) {
        self.record(
            actor_id,
            "reconciliation_required",
            Some(payment.job_id),
            Some(serde_json::json!({
                "payment_id": payment.id,
                "attempted": attempted,
                "gateway_message": gateway_message,
            })),
            format!("Gateway {attempted} failed after cancellation; manual reconciliation needed"),
        )
        .await;
    }

    pub async fn log_dispute_opened(&self, actor_id: Uuid, job_id: Uuid, reason: &str) {
        self.record(
            actor_id,
            "dispute_opened",
            Some(job_id),
            Some(serde_json::json!({ "reason": reason })),
            "Dispute opened; auto-release suspended".to_string(),
        )
        .await;
    }

    pub async fn log_dispute_resolved(&self, actor_id: Uuid, job_id: Uuid, resolution: &str) {
        self.record(
            actor_id,
            "dispute_resolved",
            Some(job_id),
            Some(serde_json::json!({ "resolution": resolution })),
            format!("Dispute resolved: {resolution}"),
        )
        .await;
    }

    async fn record(
        &self,
        actor_id: Uuid,
        action: &str,
        job_id: Option<Uuid>,
        details: Option<serde_json::Value>,
        description: String,
    ) {
        let entry = AuditLog {
            id: Uuid::new_v4(),
            actor_id,
            action: action.to_string(),
            job_id,
            details,
            description,
            created_at: Utc::now(),
        };

        if let Err(e) = self.write(&entry).await {
            // The action already happened; losing the trail is serious but
            // must not unwind the transition.
            tracing::error!("failed to write audit log for {}: {}", action, e);
        }
    }

    async fn write(&self, entry: &AuditLog) -> Result<(), StoreError> {
        self.store.insert_audit_log(entry).await
    }
}
