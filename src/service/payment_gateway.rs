// service/payment_gateway.rs
//
// Escrow gateway seam. All amounts cross this boundary in integer cents.
// Every call carries a caller-derived idempotency key; the provider is
// trusted to collapse retries with the same key into a single operation,
// which is what makes crash-recovery replays of a transition safe.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub message: String,
    /// Whether funds (or a hold) actually moved before the failure.
    pub money_moved: bool,
}

impl GatewayError {
    fn request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            money_moved: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayIntent {
    pub intent_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayTransfer {
    pub transfer_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Reserve funds on the customer's instrument without moving them.
    async fn preauthorize(
        &self,
        amount_cents: i64,
        idempotency_key: &str,
    ) -> Result<GatewayIntent, GatewayError>;

    /// Finalize a reservation, moving funds. `amount_cents` may be lower
    /// than the authorized amount; the remainder of the hold is released.
    async fn capture(
        &self,
        intent_id: &str,
        amount_cents: Option<i64>,
        idempotency_key: &str,
    ) -> Result<(), GatewayError>;

    /// Cancel an authorization before capture, releasing the hold.
    async fn void(&self, intent_id: &str, idempotency_key: &str) -> Result<(), GatewayError>;

    /// Return captured funds to the customer, fully or partially.
    async fn refund(
        &self,
        intent_id: &str,
        amount_cents: Option<i64>,
        idempotency_key: &str,
    ) -> Result<(), GatewayError>;

    /// Move captured funds from platform custody to a payee's connected
    /// account.
    async fn transfer(
        &self,
        destination_account: &str,
        amount_cents: i64,
        idempotency_key: &str,
    ) -> Result<GatewayTransfer, GatewayError>;
}

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Live card-network gateway.
pub struct StripeGateway {
    secret_key: String,
    client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: &Config) -> Self {
        Self {
            secret_key: config.stripe_secret_key.clone(),
            client: reqwest::Client::new(),
        }
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(&str, String)],
        idempotency_key: &str,
    ) -> Result<serde_json::Value, GatewayError> {
        let response = self
            .client
            .post(format!("{STRIPE_API_BASE}{path}"))
            .basic_auth(&self.secret_key, None::<&str>)
            .header("Idempotency-Key", idempotency_key)
            .form(form)
            .send()
            .await
            .map_err(|e| GatewayError::request(format!("gateway unreachable: {e}")))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::request(format!("malformed gateway response: {e}")))?;

        if let Some(error) = body.get("error") {
            let message = error["message"]
                .as_str()
                .unwrap_or("payment request rejected")
                .to_string();
            return Err(GatewayError::request(message));
        }

        Ok(body)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn preauthorize(
        &self,
        amount_cents: i64,
        idempotency_key: &str,
    ) -> Result<GatewayIntent, GatewayError> {
        let form = [
            ("amount", amount_cents.to_string()),
            ("currency", "usd".to_string()),
            ("capture_method", "manual".to_string()),
        ];
        let body = self
            .post_form("/payment_intents", &form, idempotency_key)
            .await?;

        let intent_id = body["id"]
            .as_str()
            .ok_or_else(|| GatewayError::request("missing intent id in gateway response"))?
            .to_string();

        Ok(GatewayIntent { intent_id })
    }

    async fn capture(
        &self,
        intent_id: &str,
        amount_cents: Option<i64>,
        idempotency_key: &str,
    ) -> Result<(), GatewayError> {
        let mut form: Vec<(&str, String)> = Vec::new();
        if let Some(amount) = amount_cents {
            form.push(("amount_to_capture", amount.to_string()));
        }
        self.post_form(
            &format!("/payment_intents/{intent_id}/capture"),
            &form,
            idempotency_key,
        )
        .await?;

        Ok(())
    }

    async fn void(&self, intent_id: &str, idempotency_key: &str) -> Result<(), GatewayError> {
        self.post_form(
            &format!("/payment_intents/{intent_id}/cancel"),
            &[],
            idempotency_key,
        )
        .await?;

        Ok(())
    }

    async fn refund(
        &self,
        intent_id: &str,
        amount_cents: Option<i64>,
        idempotency_key: &str,
    ) -> Result<(), GatewayError> {
        let mut form: Vec<(&str, String)> =
            vec![("payment_intent", intent_id.to_string())];
        if let Some(amount) = amount_cents {
            form.push(("amount", amount.to_string()));
        }
        self.post_form("/refunds", &form, idempotency_key).await?;

        Ok(())
    }

    async fn transfer(
        &self,
        destination_account: &str,
        amount_cents: i64,
        idempotency_key: &str,
    ) -> Result<GatewayTransfer, GatewayError> {
        let form = [
            ("amount", amount_cents.to_string()),
            ("currency", "usd".to_string()),
            ("destination", destination_account.to_string()),
        ];
        let body = self.post_form("/transfers", &form, idempotency_key).await?;

        let transfer_id = body["id"]
            .as_str()
            .ok_or_else(|| GatewayError::request("missing transfer id in gateway response"))?
            .to_string();

        Ok(GatewayTransfer { transfer_id })
    }
}

/// Gateway stand-in for staging deployments running in
/// `PaymentMode::TestBypass`. Fabricates provider references and moves no
/// money.
#[derive(Debug, Default)]
pub struct BypassGateway;

#[async_trait]
impl PaymentGateway for BypassGateway {
    async fn preauthorize(
        &self,
        amount_cents: i64,
        idempotency_key: &str,
    ) -> Result<GatewayIntent, GatewayError> {
        let intent_id = format!("test_pi_{}", Uuid::new_v4());
        tracing::info!(
            "bypass gateway: preauthorize {} cents (key {}) -> {}",
            amount_cents,
            idempotency_key,
            intent_id
        );
        Ok(GatewayIntent { intent_id })
    }

    async fn capture(
        &self,
        intent_id: &str,
        amount_cents: Option<i64>,
        idempotency_key: &str,
    ) -> Result<(), GatewayError> {
        tracing::info!(
            "bypass gateway: capture {:?} cents on {} (key {})",
            amount_cents,
            intent_id,
            idempotency_key
        );
        Ok(())
    }

    async fn void(&self, intent_id: &str, idempotency_key: &str) -> Result<(), GatewayError> {
        tracing::info!("bypass gateway: void {} (key {})", intent_id, idempotency_key);
        Ok(())
    }

    async fn refund(
        &self,
        intent_id: &str,
        amount_cents: Option<i64>,
        idempotency_key: &str,
    ) -> Result<(), GatewayError> {
        tracing::info!(
            "bypass gateway: refund {:?} cents on {} (key {})",
            amount_cents,
            intent_id,
            idempotency_key
        );
        Ok(())
    }

    async fn transfer(
        &self,
        destination_account: &str,
        amount_cents: i64,
        idempotency_key: &str,
    ) -> Result<GatewayTransfer, GatewayError> {
        let transfer_id = format!("test_tr_{}", Uuid::new_v4());
        tracing::info!(
            "bypass gateway: transfer {} cents to {} (key {}) -> {}",
            amount_cents,
            destination_account,
            idempotency_key,
            transfer_id
        );
        Ok(GatewayTransfer { transfer_id })
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedCall {
        pub op: &'static str,
        pub key: String,
        pub amount_cents: Option<i64>,
    }

    /// Gateway double that records every call and, like the real provider,
    /// collapses calls sharing an idempotency key into one effective
    /// operation.
    #[derive(Debug, Default)]
    pub struct RecordingGateway {
        calls: Mutex<Vec<RecordedCall>>,
        failing_ops: Mutex<HashSet<&'static str>>,
    }

    impl RecordingGateway {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_op(&self, op: &'static str) {
            self.failing_ops.lock().unwrap().insert(op);
        }

        pub fn clear_failures(&self) {
            self.failing_ops.lock().unwrap().clear();
        }

        pub fn calls_for(&self, op: &str) -> Vec<RecordedCall> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.op == op)
                .cloned()
                .collect()
        }

        /// Distinct idempotency keys seen for `op` — the number of effective
        /// provider-side operations.
        pub fn effective_ops(&self, op: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.op == op)
                .map(|c| c.key.clone())
                .collect::<HashSet<_>>()
                .len()
        }

        fn record(
            &self,
            op: &'static str,
            key: &str,
            amount_cents: Option<i64>,
        ) -> Result<(), GatewayError> {
            if self.failing_ops.lock().unwrap().contains(op) {
                return Err(GatewayError {
                    message: format!("simulated {op} failure"),
                    money_moved: false,
                });
            }
            self.calls.lock().unwrap().push(RecordedCall {
                op,
                key: key.to_string(),
                amount_cents,
            });
            Ok(())
        }
    }

    #[async_trait]
    impl PaymentGateway for RecordingGateway {
        async fn preauthorize(
            &self,
            amount_cents: i64,
            idempotency_key: &str,
        ) -> Result<GatewayIntent, GatewayError> {
            self.record("preauthorize", idempotency_key, Some(amount_cents))?;
            Ok(GatewayIntent {
                intent_id: format!("pi_{idempotency_key}"),
            })
        }

        async fn capture(
            &self,
            _intent_id: &str,
            amount_cents: Option<i64>,
            idempotency_key: &str,
        ) -> Result<(), GatewayError> {
            self.record("capture", idempotency_key, amount_cents)
        }

        async fn void(&self, _intent_id: &str, idempotency_key: &str) -> Result<(), GatewayError> {
            self.record("void", idempotency_key, None)
        }

        async fn refund(
            &self,
            _intent_id: &str,
            amount_cents: Option<i64>,
            idempotency_key: &str,
        ) -> Result<(), GatewayError> {
            self.record("refund", idempotency_key, amount_cents)
        }

        async fn transfer(
            &self,
            destination_account: &str,
            amount_cents: i64,
            idempotency_key: &str,
        ) -> Result<GatewayTransfer, GatewayError> {
            self.record("transfer", idempotency_key, Some(amount_cents))?;
            Ok(GatewayTransfer {
                transfer_id: format!("tr_{destination_account}_{idempotency_key}"),
            })
        }
    }
}
