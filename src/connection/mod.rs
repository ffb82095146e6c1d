//! Connection to the media server
//!
//! A single WebSocket with automatic reconnection, fanning inbound traffic
//! out to per-channel subscribers.

mod backoff;
mod manager;
mod registry;

pub use backoff::{ReconnectBackoff, ReconnectPolicy, ReconnectStatus};
pub use manager::{
    ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStats, Subscription,
};
pub use registry::{Channel, SubscriptionId};
