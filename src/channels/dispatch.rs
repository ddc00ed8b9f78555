//! Notification fan-out.
//!
//! Each configured channel runs as its own tokio task; the dispatcher waits
//! for every task to settle and returns one `Attempt` per channel, in route
//! order. A failing or panicking task never affects the others.

use std::sync::Arc;

use futures::future::join_all;

use super::{Channel, NotificationChannel, NotificationContent, ProviderReceipt};
use crate::error::ChannelError;

/// One adapter plus the destination it should deliver to.
#[derive(Clone)]
pub struct ChannelRoute {
    pub adapter: Arc<dyn NotificationChannel>,
    /// `None` means the channel is disabled and never invoked.
    pub destination: Option<String>,
}

impl ChannelRoute {
    pub fn new(adapter: Arc<dyn NotificationChannel>, destination: Option<String>) -> Self {
        Self {
            adapter,
            destination: destination.filter(|d| !d.trim().is_empty()),
        }
    }
}

/// The settled result of one channel's delivery attempt.
#[derive(Debug)]
pub struct Attempt {
    pub channel: Channel,
    pub destination: String,
    pub result: Result<ProviderReceipt, ChannelError>,
}

/// Sends a rendered lead on every route that has a destination.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    routes: Vec<ChannelRoute>,
}

impl NotificationDispatcher {
    pub fn new(routes: Vec<ChannelRoute>) -> Self {
        Self { routes }
    }

    /// Channels that will be attempted, with their destinations.
    pub fn planned(&self) -> Vec<(Channel, &str)> {
        self.routes
            .iter()
            .filter_map(|r| r.destination.as_deref().map(|d| (r.adapter.channel(), d)))
            .collect()
    }

    /// Run all configured channels concurrently and wait for every one to settle.
    pub async fn dispatch(&self, content: &NotificationContent) -> Vec<Attempt> {
        let content = Arc::new(content.clone());

        let tasks: Vec<_> = self
            .routes
            .iter()
            .filter_map(|route| {
                let destination = route.destination.clone()?;
                let adapter = Arc::clone(&route.adapter);
                let content = Arc::clone(&content);
                let channel = adapter.channel();
                let handle = tokio::spawn({
                    let destination = destination.clone();
                    async move { adapter.send(&destination, &content).await }
                });
                Some((channel, destination, handle))
            })
            .collect();

        if tasks.is_empty() {
            return Vec::new();
        }

        let (meta, handles): (Vec<_>, Vec<_>) = tasks
            .into_iter()
            .map(|(channel, destination, handle)| ((channel, destination), handle))
            .unzip();

        join_all(handles)
            .await
            .into_iter()
            .zip(meta)
            .map(|(joined, (channel, destination))| {
                let result = joined.unwrap_or_else(|e| {
                    Err(ChannelError::TaskFailed {
                        channel,
                        reason: e.to_string(),
                    })
                });
                Attempt {
                    channel,
                    destination,
                    result,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    /// Adapter whose behaviour is fixed at construction.
    struct ScriptedChannel {
        channel: Channel,
        outcome: Outcome,
        calls: AtomicUsize,
    }

    enum Outcome {
        Ok(Duration),
        Fail(&'static str),
        Panic,
    }

    impl ScriptedChannel {
        fn new(channel: Channel, outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                channel,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl NotificationChannel for ScriptedChannel {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn send(
            &self,
            _destination: &str,
            _content: &NotificationContent,
        ) -> Result<ProviderReceipt, ChannelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Ok(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(ProviderReceipt {
                        provider_id: Some(format!("{}-id", self.channel)),
                        status: "queued".into(),
                    })
                }
                Outcome::Fail(reason) => Err(ChannelError::provider(self.channel, reason)),
                Outcome::Panic => panic!("adapter blew up"),
            }
        }
    }

    fn content() -> NotificationContent {
        NotificationContent {
            short_text: "sms".into(),
            subject: "subject".into(),
            text: "text".into(),
            html: "html".into(),
        }
    }

    #[tokio::test]
    async fn channels_without_destination_are_skipped() {
        let sms = ScriptedChannel::new(Channel::Sms, Outcome::Ok(Duration::ZERO));
        let email = ScriptedChannel::new(Channel::Email, Outcome::Ok(Duration::ZERO));
        let dispatcher = NotificationDispatcher::new(vec![
            ChannelRoute::new(sms.clone(), None),
            ChannelRoute::new(email.clone(), Some("owner@test.com".into())),
        ]);

        assert_eq!(dispatcher.planned(), vec![(Channel::Email, "owner@test.com")]);
        let attempts = dispatcher.dispatch(&content()).await;

        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].channel, Channel::Email);
        assert_eq!(sms.calls.load(Ordering::SeqCst), 0);
        assert_eq!(email.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_destination_counts_as_unconfigured() {
        let sms = ScriptedChannel::new(Channel::Sms, Outcome::Ok(Duration::ZERO));
        let dispatcher =
            NotificationDispatcher::new(vec![ChannelRoute::new(sms.clone(), Some("  ".into()))]);
        assert!(dispatcher.dispatch(&content()).await.is_empty());
        assert_eq!(sms.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_failure_does_not_affect_another_channel() {
        let sms = ScriptedChannel::new(Channel::Sms, Outcome::Fail("auth error"));
        let email = ScriptedChannel::new(Channel::Email, Outcome::Ok(Duration::from_millis(20)));
        let dispatcher = NotificationDispatcher::new(vec![
            ChannelRoute::new(sms, Some("+1555".into())),
            ChannelRoute::new(email, Some("owner@test.com".into())),
        ]);

        let attempts = dispatcher.dispatch(&content()).await;
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].channel, Channel::Sms);
        assert!(attempts[0].result.is_err());
        assert_eq!(attempts[1].channel, Channel::Email);
        assert!(attempts[1].result.is_ok());
    }

    #[tokio::test]
    async fn panicking_adapter_becomes_a_failed_attempt() {
        let wa = ScriptedChannel::new(Channel::WhatsApp, Outcome::Panic);
        let email = ScriptedChannel::new(Channel::Email, Outcome::Ok(Duration::ZERO));
        let dispatcher = NotificationDispatcher::new(vec![
            ChannelRoute::new(wa, Some("+1555".into())),
            ChannelRoute::new(email, Some("owner@test.com".into())),
        ]);

        let attempts = dispatcher.dispatch(&content()).await;
        assert!(matches!(
            attempts[0].result,
            Err(ChannelError::TaskFailed { channel: Channel::WhatsApp, .. })
        ));
        assert!(attempts[1].result.is_ok());
    }

    #[tokio::test]
    async fn channels_run_concurrently() {
        let delay = Duration::from_millis(200);
        let dispatcher = NotificationDispatcher::new(vec![
            ChannelRoute::new(
                ScriptedChannel::new(Channel::Sms, Outcome::Ok(delay)),
                Some("+1555".into()),
            ),
            ChannelRoute::new(
                ScriptedChannel::new(Channel::WhatsApp, Outcome::Ok(delay)),
                Some("+1555".into()),
            ),
            ChannelRoute::new(
                ScriptedChannel::new(Channel::Email, Outcome::Ok(delay)),
                Some("owner@test.com".into()),
            ),
        ]);

        let started = tokio::time::Instant::now();
        let attempts = dispatcher.dispatch(&content()).await;
        assert_eq!(attempts.len(), 3);
        assert!(started.elapsed() < delay * 3);
    }
}
