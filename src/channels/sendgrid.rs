//! SendGrid v3 mailer.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use super::{Channel, EmailReceipt, EmailSender};
use crate::config::SendGridConfig;
use crate::error::ChannelError;

pub struct SendGridMailer {
    config: SendGridConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SendGridErrors {
    #[serde(default)]
    errors: Vec<SendGridError>,
}

#[derive(Deserialize)]
struct SendGridError {
    message: String,
}

impl SendGridMailer {
    pub fn new(config: SendGridConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }
}

#[async_trait]
impl EmailSender for SendGridMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: &str,
    ) -> Result<EmailReceipt, ChannelError> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| ChannelError::not_configured(Channel::Email, "SENDGRID_API_KEY is not set"))?;
        let from = self
            .config
            .from_address
            .as_deref()
            .ok_or_else(|| ChannelError::not_configured(Channel::Email, "SENDGRID_FROM is not set"))?;

        let payload = serde_json::json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": from },
            "subject": subject,
            "content": [
                { "type": "text/plain", "value": text },
                { "type": "text/html", "value": html }
            ]
        });

        let resp = self
            .client
            .post(format!(
                "{}/v3/mail/send",
                self.config.api_base.trim_end_matches('/')
            ))
            .bearer_auth(api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::provider(Channel::Email, e.to_string()))?;

        let status = resp.status();
        let message_id = resp
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::provider(Channel::Email, error_reason(status, &body)));
        }

        tracing::info!(to = %to, message_id = ?message_id, "Email accepted by SendGrid");
        Ok(EmailReceipt {
            provider_id: message_id,
        })
    }
}

/// Join SendGrid's `errors[].message`, falling back to the raw body.
fn error_reason(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<SendGridErrors>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed
            .errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join(", "),
        _ => format!("HTTP {status}: {body}"),
    }
}
