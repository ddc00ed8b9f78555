//! Notification channels — one adapter per medium, behind a uniform `send`.
//!
//! Adapters (`SmsChannel`, `WhatsAppChannel`, `EmailChannel`) own the
//! channel-specific formatting. They talk to providers through the small
//! `SmsSender` / `EmailSender` traits so tests can substitute fakes.

pub mod dispatch;
pub mod email;
pub mod sendgrid;
pub mod sms;
pub mod smtp;
pub mod twilio;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

pub use dispatch::{Attempt, ChannelRoute, NotificationDispatcher};
pub use email::EmailChannel;
pub use sendgrid::SendGridMailer;
pub use sms::{SmsChannel, WhatsAppChannel};
pub use smtp::SmtpMailer;
pub use twilio::TwilioClient;

/// A notification medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    WhatsApp,
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::WhatsApp => "whatsapp",
            Channel::Email => "email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sms" => Ok(Channel::Sms),
            "whatsapp" => Ok(Channel::WhatsApp),
            "email" => Ok(Channel::Email),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// Rendered bodies for one lead, shared by every channel in a wave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContent {
    /// One-line text for SMS/WhatsApp.
    pub short_text: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// What a provider reports back for an accepted notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReceipt {
    pub provider_id: Option<String>,
    pub status: String,
}

/// A notification channel adapter.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// The medium this adapter delivers on.
    fn channel(&self) -> Channel;

    /// Deliver `content` to `destination`.
    async fn send(
        &self,
        destination: &str,
        content: &NotificationContent,
    ) -> Result<ProviderReceipt, ChannelError>;
}

/// Receipt from a text-message provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReceipt {
    pub provider_id: String,
    pub status: String,
}

/// A text-message provider (SMS and WhatsApp share one).
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Send `body` from `from` (or the provider's default sender) to `to`.
    async fn send(
        &self,
        channel: Channel,
        to: &str,
        from: Option<&str>,
        body: &str,
    ) -> Result<MessageReceipt, ChannelError>;
}

/// Receipt from an email provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailReceipt {
    pub provider_id: Option<String>,
}

/// An email provider.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: &str,
    ) -> Result<EmailReceipt, ChannelError>;
}

/// Reject empty destinations before calling out to a provider.
pub(crate) fn require_destination(channel: Channel, destination: &str) -> Result<(), ChannelError> {
    if destination.trim().is_empty() {
        return Err(ChannelError::InvalidDestination {
            channel,
            reason: "destination is empty".into(),
        });
    }
    Ok(())
}
