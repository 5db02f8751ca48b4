use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::jobmodel::{JobCategory, JobStatus, PayType};

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateJobDto {
    pub category: JobCategory,

    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: String,

    #[validate(length(min = 20, max = 2000, message = "Description must be between 20 and 2000 characters"))]
    pub description: String,

    #[validate(length(min = 1, message = "State is required"))]
    pub location_state: String,

    #[validate(length(min = 1, message = "City is required"))]
    pub location_city: String,

    #[validate(length(min = 1, message = "Address is required"))]
    pub location_address: String,

    pub lat: Option<f64>,
    pub lng: Option<f64>,

    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: Option<DateTime<Utc>>,

    pub pay_type: PayType,

    /// Flat price. Required for flat jobs; ignored for hourly jobs, whose
    /// amount is derived from rate and estimated hours.
    #[validate(range(min = 0.0, message = "Amount must be non-negative"))]
    pub amount: Option<f64>,

    #[validate(range(min = 0.01, message = "Hourly rate must be positive"))]
    pub hourly_rate: Option<f64>,

    #[validate(range(min = 0.25, message = "Estimated hours must be at least 0.25"))]
    pub estimated_hours: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct JobFilterDto {
    pub status: Option<JobStatus>,
    pub category: Option<JobCategory>,
    pub mine: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateOfferDto {
    #[validate(length(max = 1000, message = "Note must be at most 1000 characters"))]
    pub note: Option<String>,

    #[validate(range(min = 0.01, message = "Proposed amount must be positive"))]
    pub proposed_amount: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Validate, Default)]
pub struct AcceptOfferDto {
    #[validate(range(min = 0.0, message = "Tip must be non-negative"))]
    pub tip: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct StartJobDto {
    #[validate(length(min = 1, message = "Start code is required"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Serialize, Validate, Default)]
pub struct CompleteJobDto {
    #[validate(range(min = 0.0, message = "Actual hours must be non-negative"))]
    pub actual_hours: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ConfirmCompletionDto {
    #[validate(length(min = 1, message = "Completion code is required"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Serialize, Validate, Default)]
pub struct CancelJobDto {
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ReportIssueDto {
    #[validate(length(min = 5, max = 1000, message = "Reason must be between 5 and 1000 characters"))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DisputeResolutionDto {
    ReleaseToHustler,
    RefundToCustomer,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ResolveDisputeDto {
    pub resolution: DisputeResolutionDto,

    #[validate(length(max = 1000, message = "Note must be at most 1000 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct AdminRefundDto {
    /// Defaults to the full captured amount.
    #[validate(range(min = 0.01, message = "Refund amount must be positive"))]
    pub amount: Option<f64>,

    #[validate(length(min = 5, max = 500, message = "Reason must be between 5 and 500 characters"))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct SendMessageDto {
    #[validate(length(min = 1, max = 2000, message = "Message must be between 1 and 2000 characters"))]
    pub body: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateReviewDto {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,

    #[validate(length(max = 1000, message = "Comment must be at most 1000 characters"))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct PayoutAccountDto {
    #[validate(length(min = 1, message = "Provider account id is required"))]
    pub provider_account_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct PageDto {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        ApiResponse {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SweepResponseDto {
    pub examined: usize,
    pub released: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct StartCodeResponseDto {
    pub job_id: Uuid,
    pub start_code: String,
}
