//! Content codec for webhook bodies.
//!
//! Only four media types travel through the hub and the dispatch engine;
//! anything else is rejected before a handler is resolved.

use bytes::Bytes;
use serde_json::Value;

use crate::utils::error::DispatchError;

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_XML: &str = "application/xml";
pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// A decoded webhook body.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Json(Value),
    Xml(String),
    Text(String),
    Binary(Bytes),
}

impl Content {
    pub fn json(value: Value) -> Self {
        Content::Json(value)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Content::Text(text.into())
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Content::Json(_) => APPLICATION_JSON,
            Content::Xml(_) => APPLICATION_XML,
            Content::Text(_) => TEXT_PLAIN,
            Content::Binary(_) => APPLICATION_OCTET_STREAM,
        }
    }

    /// Decode `body` according to the declared `Content-Type`.
    ///
    /// Parameters such as `charset` are ignored; the media type comparison is
    /// case-insensitive. XML bodies are only checked to start with markup;
    /// they are not parsed.
    pub fn decode(content_type: &str, body: &[u8]) -> Result<Self, DispatchError> {
        let media_type = media_type(content_type);
        match media_type.as_str() {
            APPLICATION_JSON => serde_json::from_slice(body)
                .map(Content::Json)
                .map_err(|e| DispatchError::MalformedPayload {
                    reason: e.to_string(),
                }),
            APPLICATION_XML => {
                let text = utf8(body)?;
                // shape check only, well-formedness is the handler's concern
                if !text.trim_start().starts_with('<') {
                    return Err(DispatchError::MalformedPayload {
                        reason: "xml document must start with an element".to_string(),
                    });
                }
                Ok(Content::Xml(text))
            }
            TEXT_PLAIN => utf8(body).map(Content::Text),
            APPLICATION_OCTET_STREAM => Ok(Content::Binary(Bytes::copy_from_slice(body))),
            _ => Err(DispatchError::UnsupportedContentType {
                content_type: content_type.to_string(),
            }),
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            Content::Json(value) => Bytes::from(value.to_string()),
            Content::Xml(text) | Content::Text(text) => Bytes::from(text.clone()),
            Content::Binary(bytes) => bytes.clone(),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Content::Json(value) => Some(value),
            _ => None,
        }
    }
}

fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn utf8(body: &[u8]) -> Result<String, DispatchError> {
    String::from_utf8(body.to_vec()).map_err(|e| DispatchError::MalformedPayload {
        reason: e.to_string(),
    })
}
