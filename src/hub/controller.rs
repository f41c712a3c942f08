//! Hub lifecycle controller
//!
//! `Hub` owns the topic and subscription registries and the broker binding,
//! and gates every operation on its started/stopped state.
//!
//! Concurrency notes:
//! - All registry state sits behind one async mutex. `start`, `stop` and the
//!   replace-if-exists step of `subscribe` hold it for their whole duration,
//!   including the broker round-trips they make.
//! - `publish` only holds the lock for its registration check; the broker
//!   fan-out happens after release, so a publish racing a re-subscribe may
//!   still reach the replaced consumer.
//! - `stop` never interrupts deliveries already handed to a consumer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{BrokerBinding, HubMessage};
use crate::hub::delivery::DeliveryConsumer;
use crate::hub::request::{
    SubscriptionMode, SubscriptionRequest, VerificationOutcome, VerificationTicket,
};
use crate::hub::state::{HubConfig, HubHandle, HubOptions, HubUrls};
use crate::hub::subscription::{
    SubscriberInfo, Subscription, SubscriptionDetails, SubscriptionRegistry,
};
use crate::hub::topic::TopicRegistry;
use crate::transport::message::{
    HUB_CHALLENGE, HUB_LEASE_SECONDS, HUB_MODE, HUB_REASON, HUB_TOPIC, MODE_DENIED,
};
use crate::transport::{CallbackClient, Content, Method, WebhookRequest};
use crate::utils::error::{LifecycleError, RegistryError, Result};

struct Running {
    handle: HubHandle,
    config: HubConfig,
}

#[derive(Default)]
enum HubState {
    #[default]
    Stopped,
    Started(Running),
}

#[derive(Default)]
struct HubInner {
    state: HubState,
    topics: TopicRegistry,
    subscriptions: SubscriptionRegistry,
}

impl HubInner {
    fn running(&self) -> Result<&Running, LifecycleError> {
        match &self.state {
            HubState::Started(running) => Ok(running),
            HubState::Stopped => Err(LifecycleError::NotStarted),
        }
    }

    /// Whether `topic` may be used under the running configuration.
    fn accepts(&self, running: &Running, topic: &str) -> bool {
        !running.config.topic_registration_required || self.topics.is_registered(topic)
    }
}

pub struct Hub {
    broker: Arc<dyn BrokerBinding>,
    client: Arc<dyn CallbackClient>,
    options: HubOptions,
    inner: Mutex<HubInner>,
}

impl Hub {
    pub fn new(broker: Arc<dyn BrokerBinding>, client: Arc<dyn CallbackClient>) -> Self {
        Self::with_options(broker, client, HubOptions::default())
    }

    pub fn with_options(
        broker: Arc<dyn BrokerBinding>,
        client: Arc<dyn CallbackClient>,
        options: HubOptions,
    ) -> Self {
        Self {
            broker,
            client,
            options,
            inner: Mutex::new(HubInner::default()),
        }
    }

    /// Bootstraps the broker binding and moves the hub to the started state.
    ///
    /// The hub stays stopped if the bootstrap fails or exceeds
    /// `HubOptions::bootstrap_timeout`.
    pub async fn start(&self, config: HubConfig) -> Result<HubHandle> {
        let mut inner = self.inner.lock().await;
        if inner.running().is_ok() {
            return Err(LifecycleError::AlreadyStarted.into());
        }
        let urls = config.urls()?;

        let timeout = self.options.bootstrap_timeout;
        match tokio::time::timeout(timeout, self.broker.bootstrap()).await {
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Broker bootstrap timed out");
                return Err(LifecycleError::BootstrapTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into());
            }
            Ok(Err(e)) => {
                warn!("Broker bootstrap failed: {e}");
                return Err(LifecycleError::Bootstrap(e).into());
            }
            Ok(Ok(())) => {}
        }

        let handle = HubHandle::new(urls);
        info!(
            publish_url = %handle.urls().publish_url,
            subscribe_url = %handle.urls().subscribe_url,
            registration_required = config.topic_registration_required,
            "Hub started"
        );
        inner.state = HubState::Started(Running {
            handle: handle.clone(),
            config,
        });
        Ok(handle)
    }

    /// Releases every subscription and topic and moves the hub to stopped.
    pub async fn stop(&self, handle: &HubHandle) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.running()?.handle != *handle {
            return Err(LifecycleError::HandleMismatch.into());
        }

        let released = inner.subscriptions.drain();
        join_all(released.iter().map(|entry| async move {
            if let Err(e) = self.broker.remove_consumer(entry.consumer).await {
                warn!(
                    topic = %entry.subscription.topic,
                    callback = %entry.subscription.callback,
                    "Failed to release consumer: {e}"
                );
            }
        }))
        .await;
        self.broker.release().await;
        inner.topics.clear();
        inner.state = HubState::Stopped;

        info!(subscriptions = released.len(), "Hub stopped");
        Ok(())
    }

    pub async fn is_started(&self) -> bool {
        self.inner.lock().await.running().is_ok()
    }

    pub async fn urls(&self) -> Option<HubUrls> {
        let inner = self.inner.lock().await;
        inner
            .running()
            .ok()
            .map(|running| running.handle.urls().clone())
    }

    pub async fn register_topic(&self, topic: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.running()?;
        inner.topics.register(topic)?;
        info!(topic = %topic, "Topic registered");
        Ok(())
    }

    pub async fn unregister_topic(&self, topic: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.running()?;
        inner.topics.unregister(topic)?;
        info!(topic = %topic, "Topic unregistered");
        Ok(())
    }

    pub async fn is_topic_registered(&self, topic: &str) -> bool {
        self.inner.lock().await.topics.is_registered(topic)
    }

    pub async fn list_topics(&self) -> Vec<String> {
        self.inner.lock().await.topics.list()
    }

    pub async fn list_subscribers(&self, topic: &str) -> Vec<SubscriberInfo> {
        self.inner.lock().await.subscriptions.subscribers(topic)
    }

    /// Hands `content` to the broker for fan-out to every subscriber of
    /// `topic`. Does not wait for deliveries.
    pub async fn publish(&self, topic: &str, content: Content) -> Result<()> {
        {
            let inner = self.inner.lock().await;
            let running = inner.running()?;
            if !inner.accepts(running, topic) {
                return Err(RegistryError::UnregisteredTopic {
                    topic: topic.to_string(),
                }
                .into());
            }
        }

        let queued = self
            .broker
            .publish(topic, HubMessage::new(topic, content))
            .await?;
        debug!(topic = %topic, queued, "Content published");
        Ok(())
    }

    /// Adds or replaces the subscription for `(topic, callback)`.
    ///
    /// Best effort: on a stopped hub, or for a topic that must be registered
    /// but is not, the request is logged and dropped.
    pub async fn subscribe(&self, topic: &str, callback: &str, details: SubscriptionDetails) {
        let mut inner = self.inner.lock().await;
        let hub_url = match inner.running() {
            Ok(running) if inner.accepts(running, topic) => {
                running.handle.urls().subscribe_url.clone()
            }
            Ok(_) => {
                warn!(topic = %topic, callback = %callback, "Subscription to unregistered topic dropped");
                return;
            }
            Err(_) => {
                warn!(topic = %topic, callback = %callback, "Hub not started, subscription dropped");
                return;
            }
        };

        if let Some(previous) = inner.subscriptions.remove(topic, callback) {
            debug!(topic = %topic, callback = %callback, "Replacing existing subscription");
            if let Err(e) = self.broker.remove_consumer(previous.consumer).await {
                warn!(topic = %topic, callback = %callback, "Failed to release replaced consumer: {e}");
            }
        }

        let lease_seconds = details
            .lease_seconds
            .unwrap_or(self.options.default_lease_seconds);
        let subscription = Subscription::new(topic, callback, lease_seconds, details.secret);
        let consumer = Arc::new(DeliveryConsumer::new(
            subscription.clone(),
            Arc::clone(&self.client),
            hub_url,
        ));

        match self.broker.add_consumer(topic, consumer).await {
            Ok(id) => {
                inner.subscriptions.insert(subscription, id);
                info!(topic = %topic, callback = %callback, lease_seconds, "Subscription added");
            }
            Err(e) => {
                warn!(topic = %topic, callback = %callback, "Failed to bind subscription: {e}");
            }
        }
    }

    /// Removes the subscription for `(topic, callback)`, retrying once with
    /// the callback's trailing slashes stripped. Missing subscriptions and a
    /// stopped hub are logged, not reported.
    pub async fn unsubscribe(&self, topic: &str, callback: &str) {
        let mut inner = self.inner.lock().await;
        if inner.running().is_err() {
            warn!(topic = %topic, callback = %callback, "Hub not started, unsubscription dropped");
            return;
        }

        let entry = match inner.subscriptions.remove(topic, callback) {
            Some(entry) => Some(entry),
            None => {
                let trimmed = callback.trim_end_matches('/');
                if trimmed != callback {
                    inner.subscriptions.remove(topic, trimmed)
                } else {
                    None
                }
            }
        };

        let Some(entry) = entry else {
            let err = RegistryError::SubscriptionNotFound {
                topic: topic.to_string(),
                callback: callback.to_string(),
            };
            warn!("{err}");
            return;
        };

        if let Err(e) = self.broker.remove_consumer(entry.consumer).await {
            warn!(topic = %topic, callback = %callback, "Failed to release consumer: {e}");
        }
        info!(topic = %topic, callback = %entry.subscription.callback, "Subscription removed");
    }

    /// Drops every subscription whose lease has run out. Returns how many were removed.
    pub async fn remove_expired_subscriptions(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let expired = inner.subscriptions.expired(Utc::now());
        for key in &expired {
            if let Some(entry) = inner.subscriptions.remove(&key.topic, &key.callback) {
                if let Err(e) = self.broker.remove_consumer(entry.consumer).await {
                    warn!(topic = %key.topic, callback = %key.callback, "Failed to release consumer: {e}");
                }
                info!(topic = %key.topic, callback = %key.callback, "Subscription lease expired");
            }
        }
        expired.len()
    }

    /// Periodically removes expired subscriptions until the hub stops.
    pub fn start_lease_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !hub.is_started().await {
                    debug!("Hub stopped, lease reaper exiting");
                    break;
                }
                let removed = hub.remove_expired_subscriptions().await;
                if removed > 0 {
                    debug!(removed, "Expired subscriptions removed");
                }
            }
        })
    }

    /// Validates a subscription request and starts intent verification.
    ///
    /// Returns as soon as the request is accepted; the ticket resolves once
    /// the callback has answered the challenge. Requests for a topic that
    /// must be registered but is not are refused, and the callback receives a
    /// `hub.mode=denied` notice.
    pub async fn handle_subscription_request(
        self: &Arc<Self>,
        request: SubscriptionRequest,
    ) -> Result<VerificationTicket> {
        {
            let inner = self.inner.lock().await;
            let running = inner.running()?;

            if request.topic.trim().is_empty() {
                return Err(RegistryError::InvalidTopic.into());
            }
            WebhookRequest::to_callback(Method::Get, &request.callback).map_err(|e| {
                RegistryError::InvalidRequest {
                    reason: e.to_string(),
                }
            })?;

            if !inner.accepts(running, &request.topic) {
                let err = RegistryError::UnregisteredTopic {
                    topic: request.topic.clone(),
                };
                if request.mode == SubscriptionMode::Subscribe {
                    self.send_denial(&request, err.to_string());
                }
                return Err(err.into());
            }
        }

        info!(
            mode = %request.mode,
            topic = %request.topic,
            callback = %request.callback,
            "Subscription request accepted, verifying intent"
        );
        let hub = Arc::clone(self);
        Ok(VerificationTicket::new(tokio::spawn(async move {
            hub.verify_intent(request).await
        })))
    }

    async fn verify_intent(&self, request: SubscriptionRequest) -> VerificationOutcome {
        let challenge = Uuid::new_v4().to_string();
        let lease_seconds = request
            .lease_seconds
            .unwrap_or(self.options.default_lease_seconds);

        let mut call = match WebhookRequest::to_callback(Method::Get, &request.callback) {
            Ok(call) => call
                .with_query(HUB_MODE, request.mode.as_str())
                .with_query(HUB_TOPIC, request.topic.as_str())
                .with_query(HUB_CHALLENGE, challenge.as_str()),
            Err(e) => {
                return VerificationOutcome::Rejected {
                    reason: e.to_string(),
                };
            }
        };
        if request.mode == SubscriptionMode::Subscribe {
            call = call.with_query(HUB_LEASE_SECONDS, lease_seconds.to_string());
        }

        let reason = match self.client.send(&request.callback, call).await {
            Ok(response) if response.is_success() && response.body_text() == challenge => {
                match request.mode {
                    SubscriptionMode::Subscribe => {
                        let details = SubscriptionDetails {
                            lease_seconds: Some(lease_seconds),
                            secret: request.secret,
                        };
                        self.subscribe(&request.topic, &request.callback, details)
                            .await;
                    }
                    SubscriptionMode::Unsubscribe => {
                        self.unsubscribe(&request.topic, &request.callback).await;
                    }
                }
                return VerificationOutcome::Verified;
            }
            Ok(response) if response.is_success() => "challenge mismatch".to_string(),
            Ok(response) => format!("callback responded with status {}", response.status),
            Err(e) => e.to_string(),
        };

        warn!(
            mode = %request.mode,
            topic = %request.topic,
            callback = %request.callback,
            reason = %reason,
            "Intent verification failed"
        );
        VerificationOutcome::Rejected { reason }
    }

    fn send_denial(&self, request: &SubscriptionRequest, reason: String) {
        let client = Arc::clone(&self.client);
        let callback = request.callback.clone();
        let topic = request.topic.clone();
        tokio::spawn(async move {
            let call = match WebhookRequest::to_callback(Method::Get, &callback) {
                Ok(call) => call
                    .with_query(HUB_MODE, MODE_DENIED)
                    .with_query(HUB_TOPIC, topic.as_str())
                    .with_query(HUB_REASON, reason),
                Err(e) => {
                    warn!(callback = %callback, "Cannot send denial: {e}");
                    return;
                }
            };
            if let Err(e) = client.send(&callback, call).await {
                warn!(topic = %topic, "Denial notice not delivered: {e}");
            }
        });
    }
}
