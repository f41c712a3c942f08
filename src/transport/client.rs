//! Outbound calls from the hub to subscriber callbacks.
//!
//! The hub never speaks HTTP directly; it hands a `WebhookRequest` to a
//! `CallbackClient`. `LoopbackClient` routes those requests to in-process
//! `WebhookListener`s keyed by URL origin, which is how the binary's demo and
//! the end-to-end tests wire both sides together.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use url::Url;

use crate::dispatch::WebhookListener;
use crate::transport::message::{WebhookRequest, WebhookResponse};
use crate::utils::error::DeliveryError;

#[async_trait]
pub trait CallbackClient: Send + Sync {
    /// Send `request` to the subscriber behind `callback`.
    async fn send(
        &self,
        callback: &str,
        request: WebhookRequest,
    ) -> Result<WebhookResponse, DeliveryError>;
}

#[derive(Default)]
pub struct LoopbackClient {
    listeners: RwLock<HashMap<String, Arc<WebhookListener>>>,
}

impl LoopbackClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every callback under `origin` (e.g. `http://127.0.0.1:9090`) to `listener`.
    pub fn mount(&self, origin: &str, listener: Arc<WebhookListener>) -> Result<(), DeliveryError> {
        let key = origin_of(origin)?;
        let mut listeners = self.listeners.write().map_err(|_| DeliveryError::Callback {
            callback: origin.to_string(),
            reason: "listener table poisoned".to_string(),
        })?;
        listeners.insert(key, listener);
        Ok(())
    }

    fn listener_for(&self, callback: &str) -> Result<Arc<WebhookListener>, DeliveryError> {
        let key = origin_of(callback)?;
        let listeners = self.listeners.read().map_err(|_| DeliveryError::Callback {
            callback: callback.to_string(),
            reason: "listener table poisoned".to_string(),
        })?;
        listeners
            .get(&key)
            .cloned()
            .ok_or_else(|| DeliveryError::Callback {
                callback: callback.to_string(),
                reason: "connection refused".to_string(),
            })
    }
}

#[async_trait]
impl CallbackClient for LoopbackClient {
    async fn send(
        &self,
        callback: &str,
        request: WebhookRequest,
    ) -> Result<WebhookResponse, DeliveryError> {
        let listener = self.listener_for(callback)?;
        Ok(listener.handle(request).await)
    }
}

fn origin_of(url: &str) -> Result<String, DeliveryError> {
    Url::parse(url)
        .map(|u| u.origin().ascii_serialization())
        .map_err(|e| DeliveryError::Callback {
            callback: url.to_string(),
            reason: e.to_string(),
        })
}
