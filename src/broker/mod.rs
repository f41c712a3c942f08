//! The `broker` module is the hub's broker binding: the interface through
//! which per-topic fan-out is requested, and `LocalBroker`, the in-process
//! implementation used by default and in tests.

pub mod binding;
pub mod engine;
pub mod message;
pub mod topic;

pub use binding::{BrokerBinding, Consumer};
pub use engine::LocalBroker;
pub use message::HubMessage;
pub use topic::ConsumerId;
