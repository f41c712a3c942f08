//! Request and response shapes exchanged between the hub and subscriber
//! listeners.
//!
//! These stand in for whatever HTTP stack carries the calls: the dispatch
//! engine only ever sees a `WebhookRequest` and produces a `WebhookResponse`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bytes::Bytes;
use url::Url;

use crate::transport::content::Content;
use crate::utils::error::ConfigurationError;

pub const CONTENT_TYPE: &str = "content-type";
pub const LINK: &str = "link";

pub const HUB_MODE: &str = "hub.mode";
pub const HUB_TOPIC: &str = "hub.topic";
pub const HUB_CALLBACK: &str = "hub.callback";
pub const HUB_CHALLENGE: &str = "hub.challenge";
pub const HUB_LEASE_SECONDS: &str = "hub.lease_seconds";
pub const HUB_SECRET: &str = "hub.secret";
pub const HUB_REASON: &str = "hub.reason";

pub const MODE_SUBSCRIBE: &str = "subscribe";
pub const MODE_UNSUBSCRIBE: &str = "unsubscribe";
pub const MODE_DENIED: &str = "denied";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other(String),
}

impl Method {
    pub fn parse(method: &str) -> Self {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            other => Method::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
            Method::Other(other) => f.write_str(other),
        }
    }
}

/// Header multimap with case-insensitive names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: BTreeMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value; existing values for the same name are kept.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An inbound webhook call as seen by a subscriber listener.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: Headers,
    pub body: Bytes,
}

impl WebhookRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Build a request aimed at an absolute callback URL, carrying over any
    /// query parameters already present on it.
    pub fn to_callback(method: Method, callback: &str) -> Result<Self, ConfigurationError> {
        let url = Url::parse(callback).map_err(|e| ConfigurationError::InvalidUrl {
            url: callback.to_string(),
            reason: e.to_string(),
        })?;
        let mut request = Self::new(method, url.path());
        for (key, value) in url.query_pairs() {
            request.query.insert(key.into_owned(), value.into_owned());
        }
        Ok(request)
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.insert(key.to_string(), value.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.headers.insert(CONTENT_TYPE, content_type);
        self.body = body.into();
        self
    }

    pub fn with_content(self, content: &Content) -> Self {
        self.with_body(content.content_type(), content.encode())
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl WebhookResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200).with_body(body)
    }

    pub fn accepted() -> Self {
        Self::new(202)
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::new(status).with_body(message.into())
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
