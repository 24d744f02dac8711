use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{execute, load_visible, CurrentUser};
use crate::db::Review;
use crate::error::{ApiError, WorkflowError};
use crate::state::AppState;
use crate::workflow::{engine, ReviewDecision, ReviewRequest, Stage};

#[derive(Debug, Deserialize)]
pub struct CreateReview {
    pub submission_id: Uuid,
    pub reviewer_role: Stage,
    pub status: ReviewDecision,
    #[serde(default)]
    pub comments: Option<String>,
}

pub async fn create_review(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(body): Json<CreateReview>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let actor = user.actor();
    let submission = load_visible(&state, &actor, body.submission_id).await?;
    let existing = state.store.list_reviews(submission.id).await?;

    let request = ReviewRequest {
        stage: body.reviewer_role,
        decision: body.status,
        comments: body.comments.unwrap_or_default(),
    };
    let outcome = engine::apply_review(&submission, &existing, &request, &actor, Utc::now())?;
    let stored = execute(&state, &outcome).await?;

    let review = stored
        .into_iter()
        .find(|r| r.reviewer_role == request.stage)
        .ok_or(WorkflowError::NotFound)?;
    Ok((StatusCode::CREATED, Json(review)))
}

#[derive(Debug, Deserialize)]
pub struct ListReviewsQuery {
    pub submission_id: Uuid,
}

pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<ListReviewsQuery>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let submission = load_visible(&state, &user.actor(), query.submission_id).await?;
    let reviews = state.store.list_reviews(submission.id).await?;
    Ok(Json(reviews))
}
