use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::{db::store::StoreError, error::HttpError, service::payment_gateway::GatewayError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no {0} code has been generated for this job")]
    NoCodeGenerated(&'static str),

    #[error("{0} code has already been used")]
    CodeAlreadyUsed(&'static str),

    #[error("hustler {0} has no payout destination on file")]
    PayeeNotOnboarded(Uuid),

    /// Upstream payment-provider failure. `money_moved` tells the caller
    /// whether the customer was actually charged, so clients never
    /// double-submit out of confusion.
    #[error("payment gateway error (money moved: {money_moved}): {message}")]
    Gateway { message: String, money_moved: bool },

    /// Should-never-happen internal consistency failure. Logged loudly at
    /// the site that detects it; surfaced as a generic server error.
    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Database(e) => ServiceError::Database(e.to_string()),
        }
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        ServiceError::Gateway {
            message: err.message,
            money_moved: err.money_moved,
        }
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,

            ServiceError::Conflict(_)
            | ServiceError::NoCodeGenerated(_)
            | ServiceError::CodeAlreadyUsed(_)
            | ServiceError::PayeeNotOnboarded(_) => StatusCode::CONFLICT,

            ServiceError::Gateway { .. } => StatusCode::PAYMENT_REQUIRED,

            ServiceError::Invariant(_) | ServiceError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        let message = match &error {
            // Internal details stay out of responses.
            ServiceError::Invariant(msg) => {
                tracing::error!("invariant violation: {}", msg);
                "internal consistency error".to_string()
            }
            ServiceError::Database(msg) => {
                tracing::error!("database error: {}", msg);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        HttpError::new(message, status)
    }
}
