//! Twilio REST client — SMS/WhatsApp sends plus the lookups used by the
//! diagnostics subcommands.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use super::{Channel, MessageReceipt, SmsSender};
use crate::config::TwilioConfig;
use crate::error::ChannelError;

const TWILIO_TIMEOUT: Duration = Duration::from_secs(30);

/// Twilio client. Credentials are checked on each call, not at construction.
pub struct TwilioClient {
    config: TwilioConfig,
    client: reqwest::Client,
}

/// A message as reported by `GET /Messages/{sid}.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct TwilioMessage {
    pub sid: String,
    pub status: String,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
}

#[derive(Deserialize)]
struct TwilioErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct IncomingNumbersPage {
    #[serde(default)]
    incoming_phone_numbers: Vec<IncomingNumber>,
}

#[derive(Deserialize)]
struct IncomingNumber {
    phone_number: String,
}

impl TwilioClient {
    pub fn new(config: TwilioConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(TWILIO_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    fn api_url(&self, account_sid: &str, resource: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{account_sid}/{resource}",
            self.config.api_base.trim_end_matches('/')
        )
    }

    /// Account SID and auth token, or a not-configured error for `channel`.
    fn credentials(&self, channel: Channel) -> Result<(&str, &str), ChannelError> {
        match (&self.config.account_sid, &self.config.auth_token) {
            (Some(sid), Some(token)) => Ok((sid.as_str(), token.expose_secret())),
            _ => Err(ChannelError::not_configured(
                channel,
                "Twilio client not configured (TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN)",
            )),
        }
    }

    /// Fetch one message's delivery status.
    pub async fn fetch_message(&self, message_sid: &str) -> Result<TwilioMessage, ChannelError> {
        let (sid, token) = self.credentials(Channel::Sms)?;
        let resp = self
            .client
            .get(self.api_url(sid, &format!("Messages/{message_sid}.json")))
            .basic_auth(sid, Some(token))
            .send()
            .await
            .map_err(|e| ChannelError::provider(Channel::Sms, e.to_string()))?;
        parse_response(Channel::Sms, resp).await
    }

    /// List the phone numbers owned by the account (first page, up to 100).
    pub async fn list_incoming_numbers(&self) -> Result<Vec<String>, ChannelError> {
        let (sid, token) = self.credentials(Channel::Sms)?;
        let resp = self
            .client
            .get(self.api_url(sid, "IncomingPhoneNumbers.json"))
            .query(&[("PageSize", "100")])
            .basic_auth(sid, Some(token))
            .send()
            .await
            .map_err(|e| ChannelError::provider(Channel::Sms, e.to_string()))?;
        let page: IncomingNumbersPage = parse_response(Channel::Sms, resp).await?;
        Ok(page
            .incoming_phone_numbers
            .into_iter()
            .map(|n| n.phone_number)
            .collect())
    }
}

#[async_trait]
impl SmsSender for TwilioClient {
    async fn send(
        &self,
        channel: Channel,
        to: &str,
        from: Option<&str>,
        body: &str,
    ) -> Result<MessageReceipt, ChannelError> {
        let (sid, token) = self.credentials(channel)?;
        let from = from
            .or(self.config.from.as_deref())
            .ok_or_else(|| ChannelError::not_configured(channel, "TWILIO_FROM is not set"))?;

        let resp = self
            .client
            .post(self.api_url(sid, "Messages.json"))
            .basic_auth(sid, Some(token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await
            .map_err(|e| ChannelError::provider(channel, e.to_string()))?;

        let message: TwilioMessage = parse_response(channel, resp).await?;
        Ok(MessageReceipt {
            provider_id: message.sid,
            status: message.status,
        })
    }
}

/// Decode a success body, or turn Twilio's error body into a provider failure.
async fn parse_response<T: serde::de::DeserializeOwned>(
    channel: Channel,
    resp: reqwest::Response,
) -> Result<T, ChannelError> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| ChannelError::provider(channel, e.to_string()))?;

    if !status.is_success() {
        let reason = match serde_json::from_str::<TwilioErrorBody>(&body) {
            Ok(TwilioErrorBody {
                message: Some(message),
                code,
            }) => match code {
                Some(code) => format!("{message} (code {code})"),
                None => message,
            },
            _ => format!("HTTP {status}: {body}"),
        };
        return Err(ChannelError::provider(channel, reason));
    }

    serde_json::from_str(&body)
        .map_err(|e| ChannelError::provider(channel, format!("Invalid Twilio response: {e}")))
}
