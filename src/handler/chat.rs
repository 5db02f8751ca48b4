// handlers/chat.rs
//
// Messaging and reviews. The thread for a job comes into existence when an
// offer is accepted, so the hustler side is only reachable once the job is
// assigned-or-later; these handlers hit the store directly and keep the
// participant checks local.
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::store::{MarketStore, StoreError},
    dtos::jobdtos::*,
    error::HttpError,
    middleware::Actor,
    models::{
        chatmodels::{Message, Review},
        jobmodel::JobStatus,
    },
    AppState,
};

pub fn chat_handler() -> Router {
    Router::new()
        .route(
            "/jobs/:job_id/thread/messages",
            post(post_message).get(list_messages),
        )
        .route("/jobs/:job_id/reviews", post(create_review).get(list_reviews))
}

pub async fn post_message(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<SendMessageDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let job = app_state
        .store
        .get_job(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("job not found"))?;

    if !job.is_participant(actor.id) {
        return Err(HttpError::forbidden(
            "only job participants can use the thread",
        ));
    }

    let thread = app_state
        .store
        .get_thread_for_job(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("no thread yet; the job has not been assigned"))?;

    let message = Message {
        id: Uuid::new_v4(),
        thread_id: thread.id,
        sender_id: actor.id,
        body: body.body,
        created_at: Utc::now(),
    };
    app_state
        .store
        .insert_message(&message)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Message sent", message)),
    ))
}

pub async fn list_messages(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
    Query(page): Query<PageDto>,
) -> Result<impl IntoResponse, HttpError> {
    let job = app_state
        .store
        .get_job(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("job not found"))?;

    if !job.is_participant(actor.id) {
        return Err(HttpError::forbidden(
            "only job participants can read the thread",
        ));
    }

    let thread = app_state
        .store
        .get_thread_for_job(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("no thread yet; the job has not been assigned"))?;

    let messages = app_state
        .store
        .list_messages(
            thread.id,
            page.limit.unwrap_or(50).clamp(1, 200),
            page.offset.unwrap_or(0).max(0),
        )
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(
        "Messages retrieved successfully",
        messages,
    )))
}

pub async fn create_review(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<CreateReviewDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let job = app_state
        .store
        .get_job(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("job not found"))?;

    if !job.is_participant(actor.id) {
        return Err(HttpError::forbidden(
            "only job participants can leave reviews",
        ));
    }
    if job.status != JobStatus::Completed {
        return Err(HttpError::conflict(
            "reviews can only be left on completed jobs",
        ));
    }

    let reviewee_id = if actor.id == job.customer_id {
        job.hustler_id
            .ok_or_else(|| HttpError::server_error("completed job has no hustler"))?
    } else {
        job.customer_id
    };

    let review = Review {
        id: Uuid::new_v4(),
        job_id,
        reviewer_id: actor.id,
        reviewee_id,
        rating: body.rating,
        comment: body.comment.unwrap_or_default(),
        created_at: Utc::now(),
    };
    app_state
        .store
        .insert_review(&review)
        .await
        .map_err(|e| match e {
            StoreError::Conflict(msg) => HttpError::conflict(msg),
            other => HttpError::server_error(other.to_string()),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Review submitted", review)),
    ))
}

pub async fn list_reviews(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let reviews = app_state
        .store
        .list_reviews_for_job(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(
        "Reviews retrieved successfully",
        reviews,
    )))
}
