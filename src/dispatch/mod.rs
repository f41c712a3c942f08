//! The `dispatch` module is the subscriber side of the system.
//!
//! A `WebhookListener` receives the hub's calls, resolves each one to a
//! handler of the `SubscriberService` attached at the request path, and
//! turns the handler's outcome into a `WebhookResponse`.

pub mod bridge;
pub mod engine;
pub mod listener;
pub mod message;
pub mod registry;
pub mod service;

pub use engine::{Resolution, Route, resolve};
pub use listener::WebhookListener;
pub use message::{Acknowledgement, DenialMessage, NotificationMessage, VerificationMessage};
pub use registry::{DispatchConfig, TopicIdentifier};
pub use service::{
    AcceptAll, ContentVerifier, DenialHandler, EventHandler, NotificationHandler, PayloadShape,
    SubscriberService, SubscriberServiceBuilder, VerificationHandler,
};

#[cfg(test)]
mod tests;
