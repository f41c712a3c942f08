//! The `persistence` module provides retained-message storage for the local
//! broker binding.
//!
//! Hub registries are never persisted; only the broker keeps messages, and
//! only when retention is configured. Storage uses `sled` as an embedded
//! key-value store.

pub mod sled_store;

pub use sled_store::{Persistence, StoredMessage};
