//! SMTP mailer via lettre.
//!
//! The transport is built and verified once, on the first send, then reused.
//! lettre's `SmtpTransport` is blocking, so every network call runs on the
//! blocking pool.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::{Channel, EmailReceipt, EmailSender};
use crate::config::SmtpConfig;
use crate::error::ChannelError;

pub struct SmtpMailer {
    config: SmtpConfig,
    transport: OnceCell<SmtpTransport>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self {
            config,
            transport: OnceCell::new(),
        }
    }

    /// Build the transport if needed and check the relay accepts our login.
    pub async fn verify(&self) -> Result<(), ChannelError> {
        self.transport().await.map(|_| ())
    }

    async fn transport(&self) -> Result<&SmtpTransport, ChannelError> {
        self.transport
            .get_or_try_init(|| async {
                let transport = build_transport(&self.config)?;
                let probe = transport.clone();
                let verified = tokio::task::spawn_blocking(move || probe.test_connection())
                    .await
                    .map_err(|e| ChannelError::TaskFailed {
                        channel: Channel::Email,
                        reason: e.to_string(),
                    })?;
                match verified {
                    Ok(true) => {
                        tracing::info!(
                            host = ?self.config.host,
                            port = self.config.port,
                            "SMTP transport verified and ready"
                        );
                        Ok(transport)
                    }
                    Ok(false) => Err(ChannelError::provider(
                        Channel::Email,
                        "SMTP verify failed: server did not accept the connection",
                    )),
                    Err(e) => {
                        tracing::error!(error = %e, "SMTP verify failed");
                        Err(ChannelError::provider(Channel::Email, format!("SMTP verify failed: {e}")))
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl EmailSender for SmtpMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: &str,
    ) -> Result<EmailReceipt, ChannelError> {
        let from = self.config.from_address.as_deref().ok_or_else(|| {
            ChannelError::not_configured(Channel::Email, "missing sender (set SMTP_FROM or SMTP_USER)")
        })?;
        let (email, message_id) = build_message(from, to, subject, text, html)?;

        let transport = self.transport().await?.clone();
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| ChannelError::TaskFailed {
                channel: Channel::Email,
                reason: e.to_string(),
            })?
            .map_err(|e| ChannelError::provider(Channel::Email, format!("SMTP send failed: {e}")))?;

        tracing::info!(to = %to, message_id = %message_id, "Email sent via SMTP");
        Ok(EmailReceipt {
            provider_id: Some(message_id),
        })
    }
}

fn build_transport(config: &SmtpConfig) -> Result<SmtpTransport, ChannelError> {
    let (Some(host), Some(username), Some(password)) =
        (&config.host, &config.username, &config.password)
    else {
        return Err(ChannelError::not_configured(
            Channel::Email,
            "SMTP configuration missing (SMTP_HOST, SMTP_USER, SMTP_PASS)",
        ));
    };

    let params = TlsParameters::builder(host.clone())
        .dangerous_accept_invalid_certs(config.allow_self_signed)
        .build()
        .map_err(|e| ChannelError::provider(Channel::Email, format!("TLS setup failed: {e}")))?;
    let tls = if config.secure {
        Tls::Wrapper(params)
    } else {
        Tls::Required(params)
    };

    let creds = Credentials::new(username.clone(), password.expose_secret().to_string());
    Ok(SmtpTransport::builder_dangerous(host.as_str())
        .port(config.port)
        .tls(tls)
        .credentials(creds)
        .timeout(Some(config.timeout))
        .build())
}

/// Build a multipart/alternative message. Returns it with its Message-ID.
pub fn build_message(
    from: &str,
    to: &str,
    subject: &str,
    text: &str,
    html: &str,
) -> Result<(Message, String), ChannelError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| ChannelError::provider(Channel::Email, format!("Invalid from address: {e}")))?;
    let to: Mailbox = to.parse().map_err(|e| ChannelError::InvalidDestination {
        channel: Channel::Email,
        reason: format!("Invalid to address: {e}"),
    })?;

    let message_id = format!("<{}@{}>", Uuid::new_v4(), from.email.domain());
    let email = Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .message_id(Some(message_id.clone()))
        .multipart(MultiPart::alternative_plain_html(
            text.to_string(),
            html.to_string(),
        ))
        .map_err(|e| ChannelError::provider(Channel::Email, format!("Failed to build email: {e}")))?;

    Ok((email, message_id))
}
