//! Observer registry
//!
//! One ordered slot list per channel. Every registration gets its own
//! [`SubscriptionId`]; removal is by id, never by handler identity.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Handler for JSON control messages
pub type MessageHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handler for video or audio payloads (tag byte already stripped)
pub type FrameHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Handler for connect / disconnect transitions
pub type EventHandler = Arc<dyn Fn() + Send + Sync>;

/// Subscriber channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Message,
    VideoFrame,
    Audio,
    Connect,
    Disconnect,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Message,
        Channel::VideoFrame,
        Channel::Audio,
        Channel::Connect,
        Channel::Disconnect,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Message => "message",
            Channel::VideoFrame => "video_frame",
            Channel::Audio => "audio",
            Channel::Connect => "connect",
            Channel::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

struct Slots<H> {
    entries: Vec<(SubscriptionId, H)>,
}

impl<H: Clone> Slots<H> {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn insert(&mut self, id: SubscriptionId, handler: H) {
        self.entries.push((id, handler));
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.iter().any(|(entry, _)| *entry == id)
    }

    fn snapshot(&self) -> Vec<(SubscriptionId, H)> {
        self.entries.clone()
    }
}

/// Handlers for all five channels
pub struct ObserverRegistry {
    next_id: u64,
    messages: Slots<MessageHandler>,
    video_frames: Slots<FrameHandler>,
    audio: Slots<FrameHandler>,
    connect: Slots<EventHandler>,
    disconnect: Slots<EventHandler>,
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            messages: Slots::new(),
            video_frames: Slots::new(),
            audio: Slots::new(),
            connect: Slots::new(),
            disconnect: Slots::new(),
        }
    }

    fn allocate(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn add_message(&mut self, handler: MessageHandler) -> SubscriptionId {
        let id = self.allocate();
        self.messages.insert(id, handler);
        id
    }

    pub fn add_video_frame(&mut self, handler: FrameHandler) -> SubscriptionId {
        let id = self.allocate();
        self.video_frames.insert(id, handler);
        id
    }

    pub fn add_audio(&mut self, handler: FrameHandler) -> SubscriptionId {
        let id = self.allocate();
        self.audio.insert(id, handler);
        id
    }

    pub fn add_connect(&mut self, handler: EventHandler) -> SubscriptionId {
        let id = self.allocate();
        self.connect.insert(id, handler);
        id
    }

    pub fn add_disconnect(&mut self, handler: EventHandler) -> SubscriptionId {
        let id = self.allocate();
        self.disconnect.insert(id, handler);
        id
    }

    /// Remove one registration. Returns false if it was already gone.
    pub fn remove(&mut self, channel: Channel, id: SubscriptionId) -> bool {
        match channel {
            Channel::Message => self.messages.remove(id),
            Channel::VideoFrame => self.video_frames.remove(id),
            Channel::Audio => self.audio.remove(id),
            Channel::Connect => self.connect.remove(id),
            Channel::Disconnect => self.disconnect.remove(id),
        }
    }

    pub fn contains(&self, channel: Channel, id: SubscriptionId) -> bool {
        match channel {
            Channel::Message => self.messages.contains(id),
            Channel::VideoFrame => self.video_frames.contains(id),
            Channel::Audio => self.audio.contains(id),
            Channel::Connect => self.connect.contains(id),
            Channel::Disconnect => self.disconnect.contains(id),
        }
    }

    pub fn len(&self, channel: Channel) -> usize {
        match channel {
            Channel::Message => self.messages.entries.len(),
            Channel::VideoFrame => self.video_frames.entries.len(),
            Channel::Audio => self.audio.entries.len(),
            Channel::Connect => self.connect.entries.len(),
            Channel::Disconnect => self.disconnect.entries.len(),
        }
    }

    pub fn message_handlers(&self) -> Vec<(SubscriptionId, MessageHandler)> {
        self.messages.snapshot()
    }

    /// Handlers for a frame channel; empty for non-frame channels
    pub fn frame_handlers(&self, channel: Channel) -> Vec<(SubscriptionId, FrameHandler)> {
        match channel {
            Channel::VideoFrame => self.video_frames.snapshot(),
            Channel::Audio => self.audio.snapshot(),
            _ => Vec::new(),
        }
    }

    /// Handlers for an event channel; empty for non-event channels
    pub fn event_handlers(&self, channel: Channel) -> Vec<(SubscriptionId, EventHandler)> {
        match channel {
            Channel::Connect => self.connect.snapshot(),
            Channel::Disconnect => self.disconnect.snapshot(),
            _ => Vec::new(),
        }
    }

    /// Drop every registration on every channel
    pub fn clear(&mut self) {
        self.messages.entries.clear();
        self.video_frames.entries.clear();
        self.audio.entries.clear();
        self.connect.entries.clear();
        self.disconnect.entries.clear();
    }
}
