use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::Email;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mail service error after {attempts} attempts: {message}")]
    Service { attempts: u32, message: String },
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// Used when no mail API is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        info!("Mail (not sent) to {:?}: {}", email.to, email.subject);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct MailApiError {
    message: Option<String>,
}

/// Posts emails as JSON to a transactional mail API.
pub struct HttpMailer {
    client: Client,
    url: String,
    api_key: Option<String>,
    from: String,
    max_retries: u32,
}

impl HttpMailer {
    pub fn new(url: String, api_key: Option<String>, from: String) -> Result<Self, MailError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self {
            client,
            url,
            api_key,
            from,
            max_retries: 3,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let mut retry_count = 0;
        let mut backoff = 1u64;

        loop {
            let body = SendRequest {
                from: &self.from,
                to: &email.to,
                subject: &email.subject,
                text: &email.body,
            };

            let mut request = self.client.post(&self.url).json(&body);
            if let Some(ref key) = self.api_key {
                request = request.bearer_auth(key);
            }
            let response = request.send().await?;

            let status = response.status();
            if status.is_success() {
                info!("Sent \"{}\" to {} recipient(s)", email.subject, email.to.len());
                return Ok(());
            }

            let text = response.text().await.unwrap_or_default();
            let retryable = status.as_u16() == 429 || status.is_server_error();
            if !retryable || retry_count >= self.max_retries {
                let message = serde_json::from_str::<MailApiError>(&text)
                    .ok()
                    .and_then(|e| e.message)
                    .unwrap_or(text);
                return Err(MailError::Service {
                    attempts: retry_count + 1,
                    message,
                });
            }

            warn!("Mail API returned {}, retrying in {}s", status, backoff);
            retry_count += 1;
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}
