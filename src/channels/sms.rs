//! SMS and WhatsApp adapters. Both deliver through a Twilio-style `SmsSender`.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    Channel, NotificationChannel, NotificationContent, ProviderReceipt, SmsSender,
    require_destination,
};
use crate::error::ChannelError;

const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Plain SMS to a phone number.
pub struct SmsChannel {
    sender: Arc<dyn SmsSender>,
}

impl SmsChannel {
    pub fn new(sender: Arc<dyn SmsSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(
        &self,
        destination: &str,
        content: &NotificationContent,
    ) -> Result<ProviderReceipt, ChannelError> {
        require_destination(Channel::Sms, destination)?;
        let receipt = self
            .sender
            .send(Channel::Sms, destination.trim(), None, &content.short_text)
            .await?;
        tracing::info!(sid = %receipt.provider_id, status = %receipt.status, "SMS accepted");
        Ok(ProviderReceipt {
            provider_id: Some(receipt.provider_id),
            status: receipt.status,
        })
    }
}

/// WhatsApp message via the provider's `whatsapp:` addressing.
pub struct WhatsAppChannel {
    sender: Arc<dyn SmsSender>,
    from: String,
}

impl WhatsAppChannel {
    pub fn new(sender: Arc<dyn SmsSender>, from: impl Into<String>) -> Self {
        Self {
            sender,
            from: whatsapp_address(&from.into()),
        }
    }
}

#[async_trait]
impl NotificationChannel for WhatsAppChannel {
    fn channel(&self) -> Channel {
        Channel::WhatsApp
    }

    async fn send(
        &self,
        destination: &str,
        content: &NotificationContent,
    ) -> Result<ProviderReceipt, ChannelError> {
        require_destination(Channel::WhatsApp, destination)?;
        let to = whatsapp_address(destination);
        let receipt = self
            .sender
            .send(Channel::WhatsApp, &to, Some(&self.from), &content.short_text)
            .await?;
        tracing::info!(sid = %receipt.provider_id, status = %receipt.status, "WhatsApp message accepted");
        Ok(ProviderReceipt {
            provider_id: Some(receipt.provider_id),
            status: receipt.status,
        })
    }
}

/// Strip whitespace and add the `whatsapp:` marker once.
pub fn whatsapp_address(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.starts_with(WHATSAPP_PREFIX) {
        compact
    } else {
        format!("{WHATSAPP_PREFIX}{compact}")
    }
}
