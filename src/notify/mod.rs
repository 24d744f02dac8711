//! Outbound email for workflow notifications.
//!
//! Delivery is best-effort: failures are logged and never fail the request
//! that produced the notification.

mod mailer;

pub use mailer::{HttpMailer, LogMailer, MailError, Mailer};

use serde::Serialize;

use crate::db::{Store, User};
use crate::error::StoreError;
use crate::workflow::{Notification, Pool, ReviewDecision};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Subject and body for a notification.
pub fn render(notification: &Notification) -> (String, String) {
    match notification {
        Notification::ReviewDecision {
            human_code,
            title,
            stage,
            decision,
            reviewer_role,
            comments,
            ..
        } => {
            let verb = match decision {
                ReviewDecision::Approved => "approved",
                ReviewDecision::Rejected => "rejected",
                ReviewDecision::Pending => "updated",
            };
            let subject = format!("[{}] {} {} at {} review", human_code, title, verb, stage.as_str().to_uppercase());
            let mut body = format!(
                "Your submission \"{}\" ({}) was {} by {} at the {} stage.",
                title,
                human_code,
                verb,
                reviewer_role,
                stage.as_str().to_uppercase()
            );
            if let Some(comment) = comments {
                body.push_str(&format!("\n\nComments:\n{}", comment));
            }
            (subject, body)
        }
        Notification::WorkItem {
            pool,
            human_code,
            title,
            ..
        } => {
            let queue = match pool {
                Pool::Review(stage) => format!("{} review", stage.as_str().to_uppercase()),
                Pool::Archive => "archiving".to_string(),
            };
            (
                format!("[{}] Awaiting {}", human_code, queue),
                format!(
                    "\"{}\" ({}) is waiting for {}.",
                    title, human_code, queue
                ),
            )
        }
        Notification::Archived {
            human_code, title, ..
        } => (
            format!("[{}] {} archived", human_code, title),
            format!(
                "Your submission \"{}\" ({}) has completed review and was archived.",
                title, human_code
            ),
        ),
    }
}

/// Look up who a notification goes to.
pub async fn recipients(
    store: &dyn Store,
    notification: &Notification,
) -> Result<Vec<String>, StoreError> {
    let users: Vec<User> = match notification {
        Notification::ReviewDecision { instructor_id, .. }
        | Notification::Archived { instructor_id, .. } => {
            store.get_user(*instructor_id).await?.into_iter().collect()
        }
        Notification::WorkItem {
            pool, institution, ..
        } => {
            let institution = (!pool.is_global()).then_some(institution.as_str());
            store.list_users_by_roles(&pool.roles(), institution).await?
        }
    };
    Ok(users.into_iter().map(|u| u.email).collect())
}

/// Render and send every notification, logging failures.
pub async fn dispatch(store: &dyn Store, mailer: &dyn Mailer, notifications: &[Notification]) {
    for notification in notifications {
        let to = match recipients(store, notification).await {
            Ok(to) => to,
            Err(e) => {
                tracing::warn!("Failed to resolve notification recipients: {}", e);
                continue;
            }
        };
        if to.is_empty() {
            tracing::debug!("No recipients for notification {:?}", notification);
            continue;
        }
        let (subject, body) = render(notification);
        let email = Email { to, subject, body };
        if let Err(e) = mailer.send(&email).await {
            tracing::warn!("Failed to send email \"{}\": {}", email.subject, e);
        }
    }
}
