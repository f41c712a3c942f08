//! The `hub` module is the publisher-facing side of the system: topic
//! registration, subscription bookkeeping, the lifecycle controller and the
//! consumer that carries published content to subscriber callbacks.

pub mod controller;
pub(crate) mod delivery;
pub mod request;
pub mod state;
pub mod subscription;
pub mod topic;

pub use controller::Hub;
pub use request::{SubscriptionMode, SubscriptionRequest, VerificationOutcome, VerificationTicket};
pub use state::{HubConfig, HubHandle, HubOptions, HubUrls};
pub use subscription::{SubscriberInfo, Subscription, SubscriptionDetails, SubscriptionRegistry};
pub use topic::TopicRegistry;
