mod admin;
mod identity;
mod reviews;
mod submissions;

pub use admin::*;
pub use identity::CurrentUser;
pub use reviews::*;
pub use submissions::*;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::Router;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{Review, Submission};
use crate::error::{ApiError, WorkflowError};
use crate::notify;
use crate::state::AppState;
use crate::workflow::{audit, authz, Actor, AuditEvent, Outcome};

pub fn router(state: Arc<AppState>) -> Router {
    let max_upload = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/submissions", post(create_submission).get(list_submissions))
        .route("/submissions/:id", get(get_submission))
        .route(
            "/submissions/:id/document",
            post(upload_document)
                .get(download_document)
                .layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/submissions/:id/finalize", post(finalize_submission))
        .route("/submissions/:id/archive", post(archive_submission))
        .route("/reviews", post(create_review).get(list_reviews))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id/role", patch(update_user_role))
        .route("/audit", get(list_audit))
        .with_state(state)
}

pub async fn health() -> &'static str {
    "ok"
}

/// Load a submission the actor is allowed to see; anything else is `NotFound`.
async fn load_visible(state: &AppState, actor: &Actor, id: Uuid) -> Result<Submission, ApiError> {
    let submission = state
        .store
        .get_submission(id)
        .await?
        .ok_or(WorkflowError::NotFound)?;
    if !authz::can_view(actor, &submission) {
        return Err(WorkflowError::NotFound.into());
    }
    Ok(submission)
}

/// Audit writes never block the operation that produced them.
async fn record_audit(state: &AppState, event: &AuditEvent) {
    let entry = audit::to_entry(event);
    if let Err(e) = state.store.append_audit_entry(entry).await {
        tracing::warn!("Failed to write audit entry ({:?}): {}", event.action_type(), e);
    }
}

/// Persist an outcome: status and reviews atomically, then audit. Mail goes
/// out on a background task so a slow mail API never holds the response.
async fn execute(state: &AppState, outcome: &Outcome) -> Result<Vec<Review>, ApiError> {
    let reviews = state
        .store
        .commit_transition(outcome.submission_id, outcome.from, outcome.to, &outcome.reviews)
        .await?;

    tracing::info!(
        "Submission {} moved {} -> {}",
        outcome.submission_id,
        outcome.from,
        outcome.to
    );

    record_audit(state, &outcome.audit).await;

    if !outcome.notifications.is_empty() {
        let store = state.store.clone();
        let mailer = state.mailer.clone();
        let notifications = outcome.notifications.clone();
        tokio::spawn(async move {
            notify::dispatch(store.as_ref(), mailer.as_ref(), &notifications).await;
        });
    }

    Ok(reviews)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::{Config, StorageBackend};
    use crate::db::{MemoryStore, NewSubmission, NewUser, Store, User};
    use crate::notify::tests::RecordingMailer;
    use crate::notify::{Email, Mailer};
    use crate::workflow::Role;

    pub(crate) const INSTITUTION: &str = "North Campus";

    pub(crate) struct Harness {
        pub state: Arc<AppState>,
        pub store: Arc<MemoryStore>,
        pub mailer: Arc<RecordingMailer>,
        pub upload_dir: tempfile::TempDir,
    }

    impl Harness {
        pub async fn new() -> Self {
            let mailer = Arc::new(RecordingMailer::default());
            Self::with_mailer(mailer.clone(), mailer)
        }

        /// Build a harness whose handlers send through `outbound` instead of the recorder.
        pub fn with_mailer(outbound: Arc<dyn Mailer>, mailer: Arc<RecordingMailer>) -> Self {
            let upload_dir = tempfile::tempdir().unwrap();
            let store = Arc::new(MemoryStore::new());
            let config = Config {
                database_url: String::new(),
                storage_backend: StorageBackend::Memory,
                upload_folder: upload_dir.path().to_path_buf(),
                host: "127.0.0.1".into(),
                port: 0,
                mail_api_url: None,
                mail_api_key: None,
                mail_from: "portal@test".into(),
                max_upload_bytes: 1024 * 1024,
                bootstrap_admin_email: None,
            };
            let state = Arc::new(AppState {
                store: store.clone(),
                mailer: outbound,
                config: Arc::new(config),
            });
            Self {
                state,
                store,
                mailer,
                upload_dir,
            }
        }

        /// Mail recorded so far, after letting background dispatches run.
        pub async fn sent_mail(&self) -> Vec<Email> {
            for _ in 0..64 {
                tokio::task::yield_now().await;
            }
            self.mailer.sent()
        }

        pub async fn user(&self, role: Role) -> CurrentUser {
            self.user_at(role, INSTITUTION).await
        }

        pub async fn user_at(&self, role: Role, institution: &str) -> CurrentUser {
            let id = uuid::Uuid::new_v4();
            let user: User = self
                .store
                .create_user(NewUser {
                    email: format!("{}-{}@example.edu", role, id.simple()),
                    full_name: format!("{} user", role),
                    role,
                    institution: institution.into(),
                })
                .await
                .unwrap();
            CurrentUser(user)
        }

        /// A draft owned by `instructor` with a document already attached.
        pub async fn draft(&self, instructor: &CurrentUser) -> Submission {
            let submission = self
                .store
                .create_submission(NewSubmission {
                    human_code: crate::storage::generate_human_code(),
                    title: "Midterm Exam".into(),
                    institution: instructor.0.institution.clone(),
                    instructor_id: instructor.0.id,
                    resubmission_of: None,
                })
                .await
                .unwrap();
            self.store
                .attach_document(submission.id, "midterm.pdf", "/tmp/midterm.pdf")
                .await
                .unwrap()
        }

        pub async fn audit_types(&self, submission_id: Uuid) -> Vec<String> {
            self.store
                .list_audit_entries(Some(submission_id), 100)
                .await
                .unwrap()
                .into_iter()
                .rev()
                .map(|e| e.action_type)
                .collect()
        }
    }
}
