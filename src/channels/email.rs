//! Email adapter — delivers the rendered lead through an `EmailSender`.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    Channel, EmailSender, NotificationChannel, NotificationContent, ProviderReceipt,
    require_destination,
};
use crate::error::ChannelError;

/// Status recorded for an email the provider accepted.
pub const EMAIL_ACCEPTED_STATUS: &str = "accepted";

pub struct EmailChannel {
    sender: Arc<dyn EmailSender>,
}

impl EmailChannel {
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(
        &self,
        destination: &str,
        content: &NotificationContent,
    ) -> Result<ProviderReceipt, ChannelError> {
        require_destination(Channel::Email, destination)?;
        let receipt = self
            .sender
            .send(destination.trim(), &content.subject, &content.text, &content.html)
            .await?;
        tracing::info!(message_id = ?receipt.provider_id, "Email accepted");
        Ok(ProviderReceipt {
            provider_id: receipt.provider_id,
            status: EMAIL_ACCEPTED_STATUS.to_string(),
        })
    }
}
