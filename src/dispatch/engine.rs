//! Request-to-handler resolution.
//!
//! GET calls belong to the verification family and are told apart by
//! `hub.mode`. POST calls are content notifications: the body is decoded
//! first, so an unsupported media type fails before any strategy runs, then
//! the service's `TopicIdentifier` picks the handler.

use serde_json::{Map, Value};

use crate::dispatch::registry::{DispatchConfig, PayloadResources, TopicIdentifier};
use crate::transport::content::APPLICATION_OCTET_STREAM;
use crate::transport::message::{HUB_MODE, MODE_DENIED};
use crate::transport::{Content, Headers, Method, WebhookRequest};
use crate::utils::error::DispatchError;

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Verification,
    Denial,
    Notification { route: Route, content: Content },
}

/// Which handler receives a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Generic,
    Resource(String),
}

pub fn resolve(
    config: &DispatchConfig,
    request: &WebhookRequest,
) -> Result<Resolution, DispatchError> {
    match &request.method {
        Method::Get => match request.query_param(HUB_MODE) {
            Some(MODE_DENIED) => Ok(Resolution::Denial),
            _ => Ok(Resolution::Verification),
        },
        Method::Post => {
            // a delivery without a content type is treated as opaque bytes
            let content_type = request.content_type().unwrap_or(APPLICATION_OCTET_STREAM);
            let content = Content::decode(content_type, &request.body)?;
            let route = route_notification(config, &request.headers, &content)?;
            Ok(Resolution::Notification { route, content })
        }
        Method::Other(method) => Err(DispatchError::MethodNotAllowed {
            method: method.clone(),
        }),
    }
}

pub fn route_notification(
    config: &DispatchConfig,
    headers: &Headers,
    content: &Content,
) -> Result<Route, DispatchError> {
    let header_value = config
        .topic_header
        .as_deref()
        .and_then(|name| headers.get(name));

    let resource = match config.strategy {
        TopicIdentifier::None => return Ok(Route::Generic),
        TopicIdentifier::ByHeader => {
            header_value.and_then(|value| config.header_resources.get(value))
        }
        TopicIdentifier::ByPayloadKey => {
            let payload = content
                .as_json()
                .and_then(Value::as_object)
                .ok_or_else(|| DispatchError::MalformedPayload {
                    reason: "payload key dispatch requires a JSON object body".to_string(),
                })?;
            lookup_payload(&config.payload_resources, payload)
        }
        TopicIdentifier::ByHeaderAndPayloadKey => {
            let payload = content.as_json().and_then(Value::as_object);
            let combined = header_value
                .and_then(|value| config.header_payload_resources.get(value))
                .zip(payload)
                .and_then(|(resources, payload)| lookup_payload(resources, payload));
            combined
                .or_else(|| header_value.and_then(|value| config.header_resources.get(value)))
                .or_else(|| {
                    payload.and_then(|payload| lookup_payload(&config.payload_resources, payload))
                })
        }
    };

    resource
        .map(|name| Route::Resource(name.clone()))
        .ok_or_else(|| DispatchError::NoMatchingResource {
            detail: unmatched_detail(config, header_value),
        })
}

/// First payload key (in key order) whose value maps to a resource.
fn lookup_payload<'a>(
    resources: &'a PayloadResources,
    payload: &Map<String, Value>,
) -> Option<&'a String> {
    resources.iter().find_map(|(key, values)| {
        payload
            .get(key)
            .and_then(scalar_text)
            .and_then(|text| values.get(&text))
    })
}

/// Numbers and booleans match by their JSON text.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn unmatched_detail(config: &DispatchConfig, header_value: Option<&str>) -> String {
    match (config.strategy, config.topic_header.as_deref(), header_value) {
        (TopicIdentifier::ByPayloadKey, _, _) => "no payload key maps to a resource".to_string(),
        (_, Some(name), Some(value)) => format!("no resource for `{name}: {value}`"),
        (_, Some(name), None) => format!("missing `{name}` header"),
        _ => "no resource matched".to_string(),
    }
}
