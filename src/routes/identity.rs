//! Request-scoped identity.
//!
//! Sessions are resolved upstream; the session layer forwards the profile id
//! in `X-User-Id`. Handlers receive a [`CurrentUser`] and pass its actor into
//! the workflow instead of looking the session up again.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::User;
use crate::error::ApiError;
use crate::state::AppState;
use crate::workflow::{Actor, Capability};

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn actor(&self) -> Actor {
        self.0.actor()
    }

    pub fn require(&self, capability: Capability) -> Result<(), ApiError> {
        if self.0.role.has_capability(capability) {
            Ok(())
        } else {
            Err(ApiError::Workflow(crate::error::WorkflowError::Unauthorized))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or(ApiError::Unauthenticated)?;

        match state.store.get_user(id).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => {
                tracing::debug!("Unknown user id in identity header: {}", id);
                Err(ApiError::Unauthenticated)
            }
        }
    }
}
