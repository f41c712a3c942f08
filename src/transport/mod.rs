//! The `transport` module is the narrow boundary between this crate and the
//! HTTP layer it does not implement.
//!
//! It defines the request/response shapes the dispatch engine consumes and
//! produces, the body codec for the supported media types, and the
//! `CallbackClient` the hub uses to reach subscriber callbacks.

pub mod client;
pub mod content;
pub mod message;

pub use client::{CallbackClient, LoopbackClient};
pub use content::Content;
pub use message::{Headers, Method, WebhookRequest, WebhookResponse};
