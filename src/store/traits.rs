//! `LeadStore` trait — the document-store interface the submission flow consumes.
//!
//! Field constraints are enforced before a lead reaches the store; backends
//! only persist what they are given.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::leads::model::{Lead, NewLead, NotificationLog};

/// Backend-agnostic lead storage.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Insert a new lead. Returns the generated id.
    async fn create_lead(&self, lead: &NewLead) -> Result<Uuid, DatabaseError>;

    /// Get a lead by id.
    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, DatabaseError>;

    /// Replace the notification log of an existing lead.
    async fn update_notifications(
        &self,
        id: Uuid,
        log: &NotificationLog,
    ) -> Result<(), DatabaseError>;

    /// Number of stored leads.
    async fn count_leads(&self) -> Result<u64, DatabaseError>;
}
