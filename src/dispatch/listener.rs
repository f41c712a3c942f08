//! Subscriber-side webhook listener.
//!
//! Services are attached by path before the listener is shared; the path
//! table is read-only while requests are being handled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::dispatch::bridge::{await_result, fire_and_acknowledge};
use crate::dispatch::engine::{Resolution, Route, resolve};
use crate::dispatch::message::{DenialMessage, NotificationMessage, VerificationMessage};
use crate::dispatch::service::SubscriberService;
use crate::transport::message::{HUB_CHALLENGE, HUB_MODE, HUB_TOPIC};
use crate::transport::{Content, WebhookRequest, WebhookResponse};
use crate::utils::error::{ConfigurationError, DispatchError};

pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WebhookListener {
    services: HashMap<String, Arc<SubscriberService>>,
    handler_timeout: Duration,
}

impl Default for WebhookListener {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookListener {
    pub fn new() -> Self {
        Self::with_handler_timeout(DEFAULT_HANDLER_TIMEOUT)
    }

    /// `handler_timeout` bounds how long verification and denial calls wait
    /// for their handler.
    pub fn with_handler_timeout(handler_timeout: Duration) -> Self {
        Self {
            services: HashMap::new(),
            handler_timeout,
        }
    }

    pub fn attach(
        &mut self,
        path: &str,
        service: SubscriberService,
    ) -> Result<(), ConfigurationError> {
        let path = normalize_path(path);
        if self.services.contains_key(&path) {
            return Err(ConfigurationError::DuplicateServicePath { path });
        }
        debug!(path = %path, topic = ?service.topic(), "Service attached");
        self.services.insert(path, Arc::new(service));
        Ok(())
    }

    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.services.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Answers one inbound call. Failures become error responses; this never
    /// returns an error itself.
    pub async fn handle(&self, request: WebhookRequest) -> WebhookResponse {
        let path = normalize_path(&request.path);
        let Some(service) = self.services.get(&path).cloned() else {
            debug!(path = %path, "No service attached");
            return WebhookResponse::error(404, format!("no service at `{path}`"));
        };

        match self.dispatch(service, request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(path = %path, status = e.status(), "Request rejected: {e}");
                WebhookResponse::error(e.status(), e.to_string())
            }
        }
    }

    async fn dispatch(
        &self,
        service: Arc<SubscriberService>,
        request: WebhookRequest,
    ) -> Result<WebhookResponse, DispatchError> {
        match resolve(service.dispatch(), &request)? {
            Resolution::Verification => self.verify(&service, &request).await,
            Resolution::Denial => self.deny(&service, &request).await,
            Resolution::Notification { route, content } => {
                service.verifier().verify(&request)?;
                notify(&service, request, route, content)
            }
        }
    }

    async fn verify(
        &self,
        service: &SubscriberService,
        request: &WebhookRequest,
    ) -> Result<WebhookResponse, DispatchError> {
        let message = VerificationMessage::from_request(request);
        for (name, value) in [
            (HUB_MODE, &message.mode),
            (HUB_TOPIC, &message.topic),
            (HUB_CHALLENGE, &message.challenge),
        ] {
            if value.is_empty() {
                return Err(DispatchError::MissingParameter { name });
            }
        }
        let challenge = message.challenge.clone();

        let Some(handler) = service.verification_handler() else {
            if service.topic() == Some(message.topic.as_str()) {
                debug!(topic = %message.topic, mode = %message.mode, "Intent auto-accepted");
                return Ok(WebhookResponse::ok(challenge));
            }
            return Err(DispatchError::NoMatchingResource {
                detail: format!("no verification handler for topic `{}`", message.topic),
            });
        };

        let topic = message.topic.clone();
        let outcome = await_result(self.handler_timeout, async move {
            handler.on_verification(message).await
        })
        .await;
        match outcome {
            Ok(()) => {
                debug!(topic = %topic, "Intent verified");
                Ok(WebhookResponse::ok(challenge))
            }
            Err(e) => {
                debug!(topic = %topic, "Intent rejected: {e}");
                Ok(WebhookResponse::error(404, e.detail()))
            }
        }
    }

    async fn deny(
        &self,
        service: &SubscriberService,
        request: &WebhookRequest,
    ) -> Result<WebhookResponse, DispatchError> {
        let message = DenialMessage::from_request(request);
        let Some(handler) = service.denial_handler() else {
            return Err(DispatchError::NoMatchingResource {
                detail: "no denial handler".to_string(),
            });
        };

        let outcome = await_result(self.handler_timeout, async move {
            handler.on_denial(message).await
        })
        .await;
        match outcome {
            Ok(acknowledgement) => Ok(acknowledgement.into_response()),
            Err(e) => {
                warn!("Denial handler failed: {e}");
                Ok(WebhookResponse::error(500, e.detail()))
            }
        }
    }
}

fn notify(
    service: &SubscriberService,
    request: WebhookRequest,
    route: Route,
    content: Content,
) -> Result<WebhookResponse, DispatchError> {
    let message = NotificationMessage {
        content_type: content.content_type().to_string(),
        content,
        headers: request.headers,
    };

    match route {
        Route::Generic => {
            let handler = service
                .notification_handler()
                .ok_or_else(|| DispatchError::NoMatchingResource {
                    detail: "no notification handler".to_string(),
                })?;
            Ok(fire_and_acknowledge("notification".to_string(), async move {
                handler.on_notification(message).await
            }))
        }
        Route::Resource(name) => {
            let (shape, handler) =
                service
                    .resource(&name)
                    .ok_or_else(|| DispatchError::NoMatchingResource {
                        detail: format!("no handler for resource `{name}`"),
                    })?;
            // a payload that does not fit the handler never reaches it
            let event = shape.convert(&message.content)?;
            Ok(fire_and_acknowledge(name, async move {
                handler.on_event(event, message).await
            }))
        }
    }
}

fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}
