//! Reconciliation: fold settled delivery attempts into the persisted lead.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::model::{Lead, NotificationLog, NotificationOutcome};
use crate::channels::{Attempt, Channel};
use crate::error::{DatabaseError, MAX_PROVIDER_ERROR_LEN, truncate_chars};
use crate::store::LeadStore;

/// Status recorded for a channel whose attempt failed.
pub const FAILED_STATUS: &str = "failed";

/// Map each attempt to a normalized outcome, keyed by channel.
pub fn outcomes(attempts: &[Attempt]) -> BTreeMap<Channel, NotificationOutcome> {
    attempts
        .iter()
        .map(|attempt| {
            let outcome = match &attempt.result {
                Ok(receipt) => NotificationOutcome {
                    sent: true,
                    provider_id: receipt.provider_id.clone(),
                    status: receipt.status.clone(),
                    destination: attempt.destination.clone(),
                    error: None,
                },
                Err(e) => NotificationOutcome {
                    sent: false,
                    provider_id: None,
                    status: FAILED_STATUS.to_string(),
                    destination: attempt.destination.clone(),
                    error: Some(truncate_chars(&e.to_string(), MAX_PROVIDER_ERROR_LEN)),
                },
            };
            (attempt.channel, outcome)
        })
        .collect()
}

/// Merge this wave's outcomes into `lead` and persist the result.
///
/// Returns the merged log. On a persistence failure the in-memory lead is
/// left untouched.
pub async fn reconcile(
    store: &dyn LeadStore,
    lead: &mut Lead,
    attempts: &[Attempt],
    now: DateTime<Utc>,
) -> Result<NotificationLog, DatabaseError> {
    for attempt in attempts {
        match &attempt.result {
            Ok(receipt) => tracing::info!(
                lead_id = %lead.id,
                channel = %attempt.channel,
                provider_id = ?receipt.provider_id,
                "Notification succeeded"
            ),
            Err(e) => tracing::error!(
                lead_id = %lead.id,
                channel = %attempt.channel,
                error = %e,
                "Notification failed"
            ),
        }
    }

    let mut log = lead.notifications.clone().unwrap_or_default();
    log.merge(outcomes(attempts), now);

    store.update_notifications(lead.id, &log).await?;
    lead.notifications = Some(log.clone());
    tracing::info!(lead_id = %lead.id, "Lead updated with notification results");
    Ok(log)
}
