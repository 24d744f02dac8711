use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{record_audit, CurrentUser};
use crate::db::{AuditEntry, NewUser, User};
use crate::error::{ApiError, WorkflowError};
use crate::state::AppState;
use crate::workflow::{AuditEvent, Capability, Role};

const DEFAULT_AUDIT_LIMIT: i64 = 100;
const MAX_AUDIT_LIMIT: i64 = 500;

fn known_role(role: Role) -> Result<Role, ApiError> {
    match role {
        Role::Unknown => Err(ApiError::BadRequest("unknown role".into())),
        role => Ok(role),
    }
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<User>>, ApiError> {
    user.require(Capability::ManageUsers)?;
    Ok(Json(state.store.list_users().await?))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(body): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    user.require(Capability::ManageUsers)?;
    let role = known_role(body.role)?;
    if body.email.trim().is_empty() || body.institution.trim().is_empty() {
        return Err(ApiError::BadRequest("email and institution are required".into()));
    }

    let created = state
        .store
        .create_user(NewUser {
            email: body.email.trim().to_string(),
            full_name: body.full_name.trim().to_string(),
            role,
            institution: body.institution.trim().to_string(),
        })
        .await?;

    tracing::info!("Created user {} with role {}", created.id, created.role);
    record_audit(
        &state,
        &AuditEvent::UserCreated {
            actor: user.actor(),
            target_user_id: created.id,
            role,
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRole {
    pub role: Role,
}

pub async fn update_user_role(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateRole>,
) -> Result<Json<User>, ApiError> {
    user.require(Capability::ManageUsers)?;
    let role = known_role(body.role)?;
    if id == user.0.id {
        return Err(ApiError::Forbidden("cannot change your own role".into()));
    }

    let target = state
        .store
        .get_user(id)
        .await?
        .ok_or(WorkflowError::NotFound)?;
    if target.role == role {
        return Ok(Json(target));
    }

    let updated = state.store.update_user_role(id, role).await?;
    tracing::info!("Role of {} changed {} -> {}", id, target.role, role);
    record_audit(
        &state,
        &AuditEvent::RoleChanged {
            actor: user.actor(),
            target_user_id: id,
            old_role: target.role,
            new_role: role,
        },
    )
    .await;

    Ok(Json(updated))
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub submission_id: Option<Uuid>,
    pub limit: Option<i64>,
}

pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    user.require(Capability::ManageUsers)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    let entries = state
        .store
        .list_audit_entries(query.submission_id, limit)
        .await?;
    Ok(Json(entries))
}
