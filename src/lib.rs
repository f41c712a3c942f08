//! # websub-hub
//!
//! `websub-hub` is a WebSub-style publish/subscribe hub together with the
//! subscriber-side dispatch layer that answers the hub's calls.
//!
//! Publishers register topics and publish content; subscribers register
//! callbacks, confirm their intent through a challenge handshake, and then
//! receive every update fanned out by the broker binding.
//!
//! ## Core Modules
//!
//! - `hub`: the lifecycle controller, topic and subscription registries, and content delivery.
//! - `broker`: the broker binding interface and the in-process `LocalBroker`.
//! - `dispatch`: resolves inbound webhook calls to subscriber handlers and answers them.
//! - `transport`: the request/response abstraction and body codec shared by both sides.
//! - `persistence`: optional sled-backed message retention for the broker.
//! - `config`: loads settings from `config/default` and the environment.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod config;
pub mod dispatch;
pub mod hub;
pub mod persistence;
pub mod transport;
pub mod utils;
