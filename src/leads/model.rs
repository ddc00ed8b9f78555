//! Lead data model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channels::Channel;

/// Raw contact-form payload as posted by the frontend. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadSubmission {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Request metadata captured alongside a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip: String,
    pub user_agent: String,
    pub referrer: String,
}

/// A validated, sanitized lead ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLead {
    pub name: String,
    pub phone: String,
    pub service: String,
    pub message: String,
    pub ip: String,
    pub user_agent: String,
    pub referrer: String,
    pub received_at: DateTime<Utc>,
}

/// A persisted inquiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub service: String,
    pub message: String,
    pub ip: String,
    pub user_agent: String,
    pub referrer: String,
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationLog>,
}

impl Lead {
    /// Attach a fresh id to a validated lead.
    pub fn from_new(id: Uuid, new: NewLead) -> Self {
        Self {
            id,
            name: new.name,
            phone: new.phone,
            service: new.service,
            message: new.message,
            ip: new.ip,
            user_agent: new.user_agent,
            referrer: new.referrer,
            received_at: new.received_at,
            notifications: None,
        }
    }
}

/// Per-channel delivery outcome, written once per wave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOutcome {
    pub sent: bool,
    pub provider_id: Option<String>,
    pub status: String,
    pub destination: String,
    pub error: Option<String>,
}

/// Notification outcomes recorded on a lead.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLog {
    #[serde(flatten)]
    pub channels: BTreeMap<Channel, NotificationOutcome>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl NotificationLog {
    pub fn get(&self, channel: Channel) -> Option<&NotificationOutcome> {
        self.channels.get(&channel)
    }

    /// Merge a wave's outcomes: keep earlier channels, overwrite the ones attempted now.
    pub fn merge(&mut self, wave: BTreeMap<Channel, NotificationOutcome>, at: DateTime<Utc>) {
        self.channels.extend(wave);
        self.last_updated_at = Some(at);
    }
}
