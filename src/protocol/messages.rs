//! Chat control messages
//!
//! The control channel accepts any JSON value. Chat traffic uses a small
//! `{type, content}` object; this module gives it a typed form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message type sent for user-typed chat text
pub const TEXT_MESSAGE_TYPE: &str = "text";

/// Message type the server uses when echoing the user's own text
pub const USER_MESSAGE_TYPE: &str = "user";

/// A `{type, content}` chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

impl ChatMessage {
    /// A chat text message as typed by the user
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: TEXT_MESSAGE_TYPE.to_string(),
            content: content.into(),
        }
    }

    /// Interpret a control message as chat, if it has the chat shape
    pub fn from_value(value: &Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }

    /// Whether the message was authored by the local user
    pub fn is_user(&self) -> bool {
        self.kind == USER_MESSAGE_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_message_shape() {
        let value = serde_json::to_value(ChatMessage::text("hi")).unwrap();
        assert_eq!(value, json!({"type": "text", "content": "hi"}));
    }

    #[test]
    fn test_from_value() {
        let msg = ChatMessage::from_value(&json!({"type": "assistant", "content": "hello"})).unwrap();
        assert_eq!(msg.kind, "assistant");
        assert_eq!(msg.content, "hello");
        assert!(!msg.is_user());

        let msg = ChatMessage::from_value(&json!({"type": "user", "content": "x", "extra": 1})).unwrap();
        assert!(msg.is_user());
    }

    #[test]
    fn test_from_value_rejects_other_shapes() {
        assert!(ChatMessage::from_value(&json!({"type": "text"})).is_none());
        assert!(ChatMessage::from_value(&json!([1, 2, 3])).is_none());
        assert!(ChatMessage::from_value(&json!("hi")).is_none());
    }
}
