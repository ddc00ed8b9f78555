//! Error types for lead-relay.

use crate::channels::Channel;

/// Maximum length (in characters) of a provider error kept in logs or storage.
pub const MAX_PROVIDER_ERROR_LEN: usize = 1000;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Notification channel errors. Recovered locally and recorded on the lead.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {channel} is not configured: {reason}")]
    NotConfigured { channel: Channel, reason: String },

    #[error("Invalid destination for channel {channel}: {reason}")]
    InvalidDestination { channel: Channel, reason: String },

    #[error("Provider rejected {channel} notification: {reason}")]
    Provider { channel: Channel, reason: String },

    #[error("Notification task for {channel} aborted: {reason}")]
    TaskFailed { channel: Channel, reason: String },
}

impl ChannelError {
    /// Build a provider failure, bounding the message length.
    pub fn provider(channel: Channel, reason: impl AsRef<str>) -> Self {
        Self::Provider {
            channel,
            reason: truncate_chars(reason.as_ref(), MAX_PROVIDER_ERROR_LEN),
        }
    }

    pub fn not_configured(channel: Channel, reason: impl Into<String>) -> Self {
        Self::NotConfigured {
            channel,
            reason: reason.into(),
        }
    }

    /// The channel that produced this error.
    pub fn channel(&self) -> Channel {
        match self {
            Self::NotConfigured { channel, .. }
            | Self::InvalidDestination { channel, .. }
            | Self::Provider { channel, .. }
            | Self::TaskFailed { channel, .. } => *channel,
        }
    }
}

/// Errors that affect the HTTP response of a lead submission.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Schema violation; user-correctable.
    #[error("{0}")]
    InvalidInput(String),

    /// The lead could not be persisted; no notifications are attempted.
    #[error("Failed to persist lead: {0}")]
    Persistence(#[from] DatabaseError),
}

/// Truncate a string to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
