use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{execute, load_visible, record_audit, CurrentUser};
use crate::db::{NewSubmission, Review, Submission, SubmissionFilter};
use crate::error::{ApiError, WorkflowError};
use crate::state::AppState;
use crate::storage;
use crate::workflow::{authz, engine, AuditEvent, Capability, Stage, Status};

#[derive(Debug, Deserialize)]
pub struct CreateSubmission {
    pub title: String,
    pub resubmission_of: Option<Uuid>,
}

pub async fn create_submission(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(body): Json<CreateSubmission>,
) -> Result<(StatusCode, Json<Submission>), ApiError> {
    user.require(Capability::Submit)?;
    let actor = user.actor();

    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title is required".into()));
    }

    if let Some(previous_id) = body.resubmission_of {
        let previous = state.store.get_submission(previous_id).await?;
        match previous {
            Some(p) if p.instructor_id == actor.id && p.status.is_rejected() => {}
            _ => {
                return Err(ApiError::BadRequest(
                    "resubmission_of must reference one of your rejected submissions".into(),
                ))
            }
        }
    }

    let submission = state
        .store
        .create_submission(NewSubmission {
            human_code: storage::generate_human_code(),
            title: title.to_string(),
            institution: actor.institution.clone(),
            instructor_id: actor.id,
            resubmission_of: body.resubmission_of,
        })
        .await?;

    tracing::info!("Created submission {} ({})", submission.human_code, submission.id);
    record_audit(
        &state,
        &AuditEvent::SubmissionCreated {
            actor,
            submission_id: submission.id,
            human_code: submission.human_code.clone(),
            resubmission_of: submission.resubmission_of,
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(submission)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListSubmissionsQuery {
    pub status: Option<String>,
}

pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<ListSubmissionsQuery>,
) -> Result<Json<Vec<Submission>>, ApiError> {
    let actor = user.actor();
    let status = query
        .status
        .as_deref()
        .map(str::parse::<Status>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let mut filter = SubmissionFilter {
        status,
        ..Default::default()
    };
    if actor.can(Capability::ViewAllInstitutions) {
        // no scoping
    } else if actor.role.reviews_any_stage() {
        filter.institution = Some(actor.institution.clone());
    } else {
        filter.instructor_id = Some(actor.id);
    }

    let submissions = state.store.list_submissions(&filter).await?;
    Ok(Json(submissions))
}

#[derive(Debug, Serialize)]
pub struct SubmissionDetail {
    pub submission: Submission,
    pub open_stage: Option<Stage>,
    pub reviews: Vec<Review>,
    pub governing_review: Option<Review>,
}

pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SubmissionDetail>, ApiError> {
    let submission = load_visible(&state, &user.actor(), id).await?;
    let reviews = state.store.list_reviews(id).await?;
    let governing_review = authz::governing_review(&reviews).cloned();

    Ok(Json(SubmissionDetail {
        open_stage: submission.status.open_stage(),
        submission,
        reviews,
        governing_review,
    }))
}

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<Submission>, ApiError> {
    let actor = user.actor();
    let submission = load_visible(&state, &actor, id).await?;
    if submission.instructor_id != actor.id {
        return Err(WorkflowError::NotOwner.into());
    }
    if submission.status != Status::Draft {
        return Err(ApiError::BadRequest(
            "documents can only be attached to drafts".into(),
        ));
    }

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("document") {
            continue;
        }
        let filename = storage::sanitize_filename(field.file_name().unwrap_or("document.pdf"));
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        upload = Some((filename, data.to_vec()));
    }

    let (filename, data) = match upload {
        Some((filename, data)) if !data.is_empty() => (filename, data),
        _ => return Err(ApiError::BadRequest("a non-empty document field is required".into())),
    };
    if !storage::is_allowed_document(&filename) {
        return Err(ApiError::BadRequest(
            "documents must be .pdf, .doc or .docx".into(),
        ));
    }

    let path = storage::save_document(
        &state.config.upload_folder,
        &submission.human_code,
        &filename,
        &data,
    )
    .await?;
    let path_str = path
        .to_str()
        .ok_or_else(|| ApiError::BadRequest("invalid upload path".into()))?;

    let updated = state.store.attach_document(id, &filename, path_str).await?;
    if let Some(previous) = submission.document_path.as_deref() {
        discard_replaced(&state.config.upload_folder, previous, path_str).await;
    }
    record_audit(
        &state,
        &AuditEvent::DocumentUploaded {
            actor,
            submission_id: id,
            human_code: updated.human_code.clone(),
            filename,
        },
    )
    .await;

    Ok(Json(updated))
}

/// Remove a document superseded by a re-upload. Only files under the upload folder are touched.
async fn discard_replaced(upload_folder: &std::path::Path, previous: &str, current: &str) {
    if previous == current || !std::path::Path::new(previous).starts_with(upload_folder) {
        return;
    }
    if let Err(e) = tokio::fs::remove_file(previous).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove replaced document {}: {}", previous, e);
        }
    }
}

pub async fn download_document(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let submission = load_visible(&state, &user.actor(), id).await?;
    let (filename, path) = match (submission.document_filename, submission.document_path) {
        (Some(filename), Some(path)) => (filename, path),
        _ => return Err(WorkflowError::NotFound.into()),
    };

    let content = match tokio::fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Document for submission {} missing at {}", id, path);
            return Err(WorkflowError::NotFound.into());
        }
        Err(e) => return Err(e.into()),
    };
    let mime = mime_guess::from_path(&filename)
        .first_raw()
        .unwrap_or("application/octet-stream");

    Response::builder()
        .header(header::CONTENT_TYPE, mime)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(content))
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn refreshed(state: &AppState, id: Uuid) -> Result<Submission, ApiError> {
    Ok(state
        .store
        .get_submission(id)
        .await?
        .ok_or(WorkflowError::NotFound)?)
}

pub async fn finalize_submission(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Submission>, ApiError> {
    let actor = user.actor();
    let submission = load_visible(&state, &actor, id).await?;
    let outcome = engine::finalize(&submission, &actor)?;
    execute(&state, &outcome).await?;
    Ok(Json(refreshed(&state, id).await?))
}

pub async fn archive_submission(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Submission>, ApiError> {
    let actor = user.actor();
    let submission = load_visible(&state, &actor, id).await?;
    let outcome = engine::archive(&submission, &actor)?;
    execute(&state, &outcome).await?;
    Ok(Json(refreshed(&state, id).await?))
}
