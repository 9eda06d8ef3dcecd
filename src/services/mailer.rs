//! Transactional Email Client
//!
//! Sends audience documents to configured recipients through an HTTP
//! transactional-email provider. `Mailer` is the seam the distributor
//! depends on; `HttpMailer` is the live implementation.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors from the email provider
#[derive(Debug, Error)]
pub enum MailError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Server { status: u16, body: String },
}

/// Seam over the transactional email provider
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, markdown_body: &str) -> Result<(), MailError>;
}

/// Live client for an HTTP transactional-email API
pub struct HttpMailer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    from_address: String,
}

impl HttpMailer {
    pub fn new(base_url: String, api_key: String, from_address: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            from_address,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, markdown_body: &str) -> Result<(), MailError> {
        let payload = json!({
            "from": self.from_address,
            "to": [to],
            "subject": subject,
            "text": markdown_body,
        });

        let resp = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
