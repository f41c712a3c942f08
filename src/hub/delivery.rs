//! Content delivery from the broker to one subscriber callback.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::broker::{Consumer, HubMessage};
use crate::hub::subscription::Subscription;
use crate::transport::message::LINK;
use crate::transport::{CallbackClient, Method, WebhookRequest};
use crate::utils::error::DeliveryError;

/// Broker consumer bound to a single subscription.
pub(crate) struct DeliveryConsumer {
    subscription: Subscription,
    client: Arc<dyn CallbackClient>,
    hub_url: String,
}

impl DeliveryConsumer {
    pub(crate) fn new(
        subscription: Subscription,
        client: Arc<dyn CallbackClient>,
        hub_url: String,
    ) -> Self {
        Self {
            subscription,
            client,
            hub_url,
        }
    }

    fn request_for(&self, message: &HubMessage) -> Result<WebhookRequest, DeliveryError> {
        let request = WebhookRequest::to_callback(Method::Post, &self.subscription.callback)
            .map_err(|e| DeliveryError::Callback {
                callback: self.subscription.callback.clone(),
                reason: e.to_string(),
            })?;
        Ok(request
            .with_content(&message.content)
            .with_header(LINK, format!("<{}>; rel=\"hub\"", self.hub_url))
            .with_header(LINK, format!("<{}>; rel=\"self\"", message.topic)))
    }
}

#[async_trait]
impl Consumer for DeliveryConsumer {
    async fn on_message(&self, message: HubMessage) {
        let callback = &self.subscription.callback;
        if self.subscription.is_expired(Utc::now()) {
            debug!(topic = %message.topic, callback = %callback, "Lease expired, delivery skipped");
            return;
        }

        let request = match self.request_for(&message) {
            Ok(request) => request,
            Err(e) => {
                warn!(topic = %message.topic, "{e}");
                return;
            }
        };

        match self.client.send(callback, request).await {
            Ok(response) if response.is_success() => {
                debug!(
                    topic = %message.topic,
                    callback = %callback,
                    message_id = %message.message_id,
                    status = response.status,
                    "Content delivered"
                );
            }
            Ok(response) => {
                let err = DeliveryError::Callback {
                    callback: callback.clone(),
                    reason: format!("responded with status {}", response.status),
                };
                warn!(topic = %message.topic, message_id = %message.message_id, "{err}");
            }
            Err(err) => {
                warn!(topic = %message.topic, message_id = %message.message_id, "{err}");
            }
        }
    }
}
