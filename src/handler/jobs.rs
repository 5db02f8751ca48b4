// handlers/jobs.rs
//
// Thin HTTP surface over the lifecycle engine: one route per transition.
// Handlers validate input shape and delegate; every state decision lives in
// the engine.
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::store::{JobFilter, MarketStore},
    dtos::jobdtos::*,
    error::HttpError,
    middleware::Actor,
    AppState,
};

pub fn jobs_handler() -> Router {
    Router::new()
        // Job management
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/:job_id", get(get_job).delete(delete_job))
        // Offers
        .route("/jobs/:job_id/offers", post(create_offer).get(list_offers))
        .route("/offers/:offer_id/accept", put(accept_offer))
        .route("/offers/:offer_id/decline", put(decline_offer))
        // Lifecycle handshakes
        .route("/jobs/:job_id/start", put(start_job))
        .route("/jobs/:job_id/start-code", post(regenerate_start_code))
        .route("/jobs/:job_id/complete", put(complete_job))
        .route("/jobs/:job_id/confirm", put(confirm_completion))
        .route("/jobs/:job_id/cancel", put(cancel_job))
        // Disputes & administration
        .route("/jobs/:job_id/report-issue", post(report_issue))
        .route("/jobs/:job_id/dispute/resolve", put(resolve_dispute))
        .route("/jobs/:job_id/refund", post(admin_refund))
        .route("/jobs/:job_id/audit", get(get_job_audit_trail))
        // Hustler payout onboarding result
        .route("/hustler/payout-account", put(set_payout_account))
        // Ops: manual sweep trigger (also runs on a timer)
        .route("/internal/auto-release", post(trigger_auto_release))
}

pub async fn create_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<CreateJobDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let job = app_state.lifecycle_service.create_job(&actor, body).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Job created successfully", job)),
    ))
}

pub async fn list_jobs(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<JobFilterDto>,
) -> Result<impl IntoResponse, HttpError> {
    let mut filter = JobFilter {
        status: query.status,
        category: query.category,
        customer_id: None,
        hustler_id: None,
        limit: query.limit.unwrap_or(50).clamp(1, 200),
        offset: query.offset.unwrap_or(0).max(0),
    };
    if query.mine.unwrap_or(false) {
        if actor.can_act_as_hustler {
            filter.hustler_id = Some(actor.id);
        } else {
            filter.customer_id = Some(actor.id);
        }
    }

    let jobs = app_state.lifecycle_service.list_jobs(&filter).await?;

    Ok(Json(ApiResponse::success("Jobs retrieved successfully", jobs)))
}

pub async fn get_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let job = app_state.lifecycle_service.get_job(job_id).await?;

    Ok(Json(ApiResponse::success("Job retrieved successfully", job)))
}

pub async fn delete_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state.lifecycle_service.delete_job(&actor, job_id).await?;

    Ok(Json(ApiResponse::success("Job deleted successfully", ())))
}

pub async fn create_offer(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<CreateOfferDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let offer = app_state
        .lifecycle_service
        .create_offer(&actor, job_id, body)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Offer submitted successfully", offer)),
    ))
}

pub async fn list_offers(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let offers = app_state.lifecycle_service.list_offers(&actor, job_id).await?;

    Ok(Json(ApiResponse::success(
        "Offers retrieved successfully",
        offers,
    )))
}

pub async fn accept_offer(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(offer_id): Path<Uuid>,
    Json(body): Json<AcceptOfferDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let result = app_state
        .lifecycle_service
        .accept_offer(&actor, offer_id, body)
        .await?;

    Ok(Json(ApiResponse::success(
        "Offer accepted; payment pre-authorized",
        result,
    )))
}

pub async fn decline_offer(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(offer_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let offer = app_state
        .lifecycle_service
        .decline_offer(&actor, offer_id)
        .await?;

    Ok(Json(ApiResponse::success("Offer declined", offer)))
}

pub async fn start_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<StartJobDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let job = app_state
        .lifecycle_service
        .start_job(&actor, job_id, body)
        .await?;

    Ok(Json(ApiResponse::success("Job started", job)))
}

pub async fn regenerate_start_code(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let (job, start_code) = app_state
        .lifecycle_service
        .regenerate_start_code(&actor, job_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Start code regenerated",
        StartCodeResponseDto {
            job_id: job.id,
            start_code,
        },
    )))
}

pub async fn complete_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<CompleteJobDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let result = app_state
        .lifecycle_service
        .complete_job(&actor, job_id, body)
        .await?;

    Ok(Json(ApiResponse::success(
        "Completion submitted; share the code with your customer",
        result,
    )))
}

pub async fn confirm_completion(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<ConfirmCompletionDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let result = app_state
        .lifecycle_service
        .confirm_completion(&actor, job_id, body)
        .await?;

    Ok(Json(ApiResponse::success(
        "Completion confirmed; payment released",
        result,
    )))
}

pub async fn cancel_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<CancelJobDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let result = app_state
        .lifecycle_service
        .cancel_job(&actor, job_id, body)
        .await?;

    Ok(Json(ApiResponse::success("Job cancelled", result)))
}

pub async fn report_issue(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<ReportIssueDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let job = app_state
        .lifecycle_service
        .report_issue(&actor, job_id, body)
        .await?;

    Ok(Json(ApiResponse::success(
        "Issue reported; payment release is on hold",
        job,
    )))
}

pub async fn resolve_dispute(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<ResolveDisputeDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .lifecycle_service
        .resolve_dispute(&actor, job_id, body)
        .await?;

    Ok(Json(ApiResponse::success("Dispute resolved", outcome)))
}

pub async fn admin_refund(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<AdminRefundDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let payment = app_state
        .lifecycle_service
        .admin_refund(&actor, job_id, body)
        .await?;

    Ok(Json(ApiResponse::success("Refund issued", payment)))
}

pub async fn get_job_audit_trail(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
    Query(page): Query<PageDto>,
) -> Result<impl IntoResponse, HttpError> {
    if !actor.is_admin {
        return Err(HttpError::forbidden(
            "only administrators can view audit trails",
        ));
    }

    let logs = app_state
        .store
        .list_audit_logs_for_job(
            job_id,
            page.limit.unwrap_or(50).clamp(1, 200),
            page.offset.unwrap_or(0).max(0),
        )
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(
        "Audit trail retrieved successfully",
        logs,
    )))
}

pub async fn set_payout_account(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<PayoutAccountDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    if !actor.can_act_as_hustler {
        return Err(HttpError::forbidden("only hustlers receive payouts"));
    }

    app_state
        .store
        .upsert_payout_account(actor.id, &body.provider_account_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success("Payout account saved", ())))
}

pub async fn trigger_auto_release(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, HttpError> {
    if !actor.is_admin {
        return Err(HttpError::forbidden(
            "only administrators can trigger the sweep",
        ));
    }

    let outcome = app_state
        .lifecycle_service
        .run_auto_release_sweep(Utc::now())
        .await?;

    Ok(Json(ApiResponse::success(
        "Auto-release sweep finished",
        SweepResponseDto {
            examined: outcome.examined,
            released: outcome.released,
            failed: outcome.failed,
        },
    )))
}
