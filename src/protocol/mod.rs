//! Wire protocol shared with the media server
//!
//! One WebSocket carries three logical streams: JSON control messages as
//! text frames, and video/audio payloads as channel-tagged binary frames.

mod audio;
mod frame;
mod messages;

pub use audio::*;
pub use frame::*;
pub use messages::*;
