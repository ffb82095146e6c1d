//! Realtime client
//!
//! Chat, outbound audio and inbound video frames multiplexed over one
//! WebSocket to a media server, with automatic reconnection.

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod media;
pub mod protocol;
pub mod version;

pub use connection::{
    Channel, ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStats,
    ReconnectPolicy, ReconnectStatus, Subscription,
};
pub use error::{Error, Result};
