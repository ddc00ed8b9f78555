//! Lead submission flow.
//!
//! `submit` validates and persists; the caller answers the client and then
//! calls `Accepted::spawn_notifications`, so provider latency never shows up
//! in the response time.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use super::model::{ClientMeta, Lead, LeadSubmission, NotificationLog};
use super::reconcile::reconcile;
use super::template::{self, LeadFields};
use super::validate::validate_submission;
use crate::channels::NotificationDispatcher;
use crate::error::SubmitError;
use crate::store::LeadStore;

/// Validates, persists, and notifies.
#[derive(Clone)]
pub struct LeadService {
    store: Arc<dyn LeadStore>,
    dispatcher: NotificationDispatcher,
}

impl LeadService {
    pub fn new(store: Arc<dyn LeadStore>, dispatcher: NotificationDispatcher) -> Self {
        Self { store, dispatcher }
    }

    pub fn store(&self) -> &Arc<dyn LeadStore> {
        &self.store
    }

    /// Validate and persist one submission.
    ///
    /// Nothing is written and no channel is touched when validation fails.
    /// A persistence failure is returned before any notification is planned.
    pub async fn submit(
        &self,
        submission: LeadSubmission,
        client: ClientMeta,
    ) -> Result<Accepted, SubmitError> {
        let new_lead = validate_submission(&submission, &client, Utc::now())?;

        let id = self.store.create_lead(&new_lead).await?;
        info!(lead_id = %id, service = %new_lead.service, "Lead saved");

        Ok(Accepted {
            lead: Lead::from_new(id, new_lead),
            store: Arc::clone(&self.store),
            dispatcher: self.dispatcher.clone(),
        })
    }
}

/// A persisted lead whose notifications have not been sent yet.
pub struct Accepted {
    lead: Lead,
    store: Arc<dyn LeadStore>,
    dispatcher: NotificationDispatcher,
}

impl Accepted {
    pub fn lead_id(&self) -> Uuid {
        self.lead.id
    }

    pub fn lead(&self) -> &Lead {
        &self.lead
    }

    /// Run the notification wave in the background.
    pub fn spawn_notifications(self) -> JoinHandle<Option<NotificationLog>> {
        tokio::spawn(self.notify())
    }

    /// Dispatch to every configured channel, then record the outcomes.
    ///
    /// Returns the reconciled log, or `None` when nothing was attempted or the
    /// log could not be stored. Errors are logged, never returned.
    pub async fn notify(self) -> Option<NotificationLog> {
        let Self {
            mut lead,
            store,
            dispatcher,
        } = self;

        if dispatcher.planned().is_empty() {
            info!(lead_id = %lead.id, "No notification channels configured");
            return None;
        }

        let content = template::render(&LeadFields::from(&lead), Utc::now());
        let attempts = dispatcher.dispatch(&content).await;

        match reconcile(store.as_ref(), &mut lead, &attempts, Utc::now()).await {
            Ok(log) => Some(log),
            Err(e) => {
                error!(lead_id = %lead.id, error = %e, "Failed to update lead with notification results");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::channels::{
        Channel, ChannelRoute, EmailChannel, EmailReceipt, EmailSender, MessageReceipt,
        SmsChannel, SmsSender,
    };
    use crate::error::{ChannelError, DatabaseError};
    use crate::leads::model::NewLead;
    use crate::store::LibSqlBackend;

    struct FakeSms {
        fail_with: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SmsSender for FakeSms {
        async fn send(
            &self,
            channel: Channel,
            _to: &str,
            _from: Option<&str>,
            _body: &str,
        ) -> Result<MessageReceipt, ChannelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(reason) => Err(ChannelError::provider(channel, reason)),
                None => Ok(MessageReceipt {
                    provider_id: "SM123".into(),
                    status: "queued".into(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct FakeMailer {
        subjects: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EmailSender for FakeMailer {
        async fn send(
            &self,
            _to: &str,
            subject: &str,
            _text: &str,
            _html: &str,
        ) -> Result<EmailReceipt, ChannelError> {
            self.subjects.lock().unwrap().push(subject.to_string());
            Ok(EmailReceipt {
                provider_id: Some("<abc@mail.test>".into()),
            })
        }
    }

    /// Store whose writes fail on demand.
    struct FlakyStore {
        inner: LibSqlBackend,
        fail_create: bool,
        fail_update: bool,
    }

    #[async_trait]
    impl LeadStore for FlakyStore {
        async fn init_schema(&self) -> Result<(), DatabaseError> {
            self.inner.init_schema().await
        }

        async fn create_lead(&self, lead: &NewLead) -> Result<Uuid, DatabaseError> {
            if self.fail_create {
                return Err(DatabaseError::Query("create_lead: disk I/O error".into()));
            }
            self.inner.create_lead(lead).await
        }

        async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, DatabaseError> {
            self.inner.get_lead(id).await
        }

        async fn update_notifications(
            &self,
            id: Uuid,
            log: &NotificationLog,
        ) -> Result<(), DatabaseError> {
            if self.fail_update {
                return Err(DatabaseError::Query("update_notifications: locked".into()));
            }
            self.inner.update_notifications(id, log).await
        }

        async fn count_leads(&self) -> Result<u64, DatabaseError> {
            self.inner.count_leads().await
        }
    }

    fn submission() -> LeadSubmission {
        LeadSubmission {
            name: Some("  John   Doe  ".into()),
            phone: Some("+1 555 010 0199".into()),
            service: Some("Deep Cleaning".into()),
            message: None,
        }
    }

    fn sms(fail_with: Option<&str>) -> Arc<FakeSms> {
        Arc::new(FakeSms {
            fail_with: fail_with.map(str::to_string),
            calls: AtomicUsize::new(0),
        })
    }

    fn dispatcher(sms: Arc<FakeSms>, mailer: Arc<FakeMailer>) -> NotificationDispatcher {
        NotificationDispatcher::new(vec![
            ChannelRoute::new(Arc::new(SmsChannel::new(sms)), Some("+15550100".into())),
            ChannelRoute::new(
                Arc::new(EmailChannel::new(mailer)),
                Some("owner@test.com".into()),
            ),
        ])
    }

    async fn flaky(fail_create: bool, fail_update: bool) -> Arc<FlakyStore> {
        Arc::new(FlakyStore {
            inner: LibSqlBackend::new_memory().await.unwrap(),
            fail_create,
            fail_update,
        })
    }

    #[tokio::test]
    async fn submit_persists_sanitized_lead() {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let service = LeadService::new(store.clone(), NotificationDispatcher::default());

        let accepted = service
            .submit(submission(), ClientMeta::default())
            .await
            .unwrap();

        let stored = store.get_lead(accepted.lead_id()).await.unwrap().unwrap();
        assert_eq!(stored.name, "John Doe");
        assert!(stored.notifications.is_none());
        assert_eq!(store.count_leads().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invalid_submission_is_not_persisted() {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let sms = sms(None);
        let service = LeadService::new(
            store.clone(),
            dispatcher(sms.clone(), Arc::new(FakeMailer::default())),
        );

        let mut bad = submission();
        bad.service = None;
        let err = service
            .submit(bad, ClientMeta::default())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, SubmitError::InvalidInput(_)));
        assert_eq!(store.count_leads().await.unwrap(), 0);
        assert_eq!(sms.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sms_rejection_does_not_hide_email_success() {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let mailer = Arc::new(FakeMailer::default());
        let service = LeadService::new(
            store.clone(),
            dispatcher(sms(Some("The 'To' number is not a valid phone number.")), mailer.clone()),
        );

        let accepted = service
            .submit(submission(), ClientMeta::default())
            .await
            .unwrap();
        let id = accepted.lead_id();
        let log = accepted.spawn_notifications().await.unwrap().unwrap();

        let sms_outcome = log.get(Channel::Sms).unwrap();
        assert!(!sms_outcome.sent);
        assert!(!sms_outcome.error.as_deref().unwrap().is_empty());
        let email_outcome = log.get(Channel::Email).unwrap();
        assert!(email_outcome.sent);
        assert_eq!(email_outcome.provider_id.as_deref(), Some("<abc@mail.test>"));

        let stored = store.get_lead(id).await.unwrap().unwrap();
        assert_eq!(stored.notifications, Some(log));
        assert_eq!(
            mailer.subjects.lock().unwrap().as_slice(),
            ["New Lead: Deep Cleaning - John Doe"]
        );
    }

    #[tokio::test]
    async fn unconfigured_channels_produce_no_entries() {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let sms = sms(None);
        let routes = vec![
            ChannelRoute::new(Arc::new(SmsChannel::new(sms.clone())), None),
            ChannelRoute::new(
                Arc::new(EmailChannel::new(Arc::new(FakeMailer::default()))),
                Some("owner@test.com".into()),
            ),
        ];
        let service = LeadService::new(store, NotificationDispatcher::new(routes));

        let log = service
            .submit(submission(), ClientMeta::default())
            .await
            .unwrap()
            .notify()
            .await
            .unwrap();

        assert!(log.get(Channel::Sms).is_none());
        assert!(log.get(Channel::Email).is_some());
        assert_eq!(sms.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_channels_means_no_log() {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let service = LeadService::new(store.clone(), NotificationDispatcher::default());

        let accepted = service
            .submit(submission(), ClientMeta::default())
            .await
            .unwrap();
        let id = accepted.lead_id();
        assert!(accepted.notify().await.is_none());
        assert!(store.get_lead(id).await.unwrap().unwrap().notifications.is_none());
    }

    #[tokio::test]
    async fn persistence_failure_skips_notifications() {
        let sms = sms(None);
        let service = LeadService::new(
            flaky(true, false).await,
            dispatcher(sms.clone(), Arc::new(FakeMailer::default())),
        );

        let err = service
            .submit(submission(), ClientMeta::default())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, SubmitError::Persistence(_)));
        assert_eq!(sms.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reconciliation_failure_is_swallowed() {
        let store = flaky(false, true).await;
        let sms = sms(None);
        let service = LeadService::new(
            store.clone(),
            dispatcher(sms.clone(), Arc::new(FakeMailer::default())),
        );

        let accepted = service
            .submit(submission(), ClientMeta::default())
            .await
            .unwrap();
        let id = accepted.lead_id();

        assert!(accepted.spawn_notifications().await.unwrap().is_none());
        assert_eq!(sms.calls.load(Ordering::SeqCst), 1);
        let stored = store.get_lead(id).await.unwrap().unwrap();
        assert!(stored.notifications.is_none());
    }
}
