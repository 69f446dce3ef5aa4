//! Validated inbound update.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A validated webhook update. Fields are private so the update stays immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundUpdate {
    id: String,
    payload: Value,
    received_at: DateTime<Utc>,
}

impl InboundUpdate {
    /// Creates an update stamped with the current time.
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self::received(id, payload, Utc::now())
    }

    /// Creates an update with an explicit receive time.
    pub fn received(id: impl Into<String>, payload: Value, received_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            payload,
            received_at,
        }
    }

    /// Identifier assigned by the source system (`update_id` for Telegram).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// The message object carried by the update, if any (`message`, `edited_message`,
    /// `channel_post` or `edited_channel_post`).
    pub fn message(&self) -> Option<&Value> {
        ["message", "edited_message", "channel_post", "edited_channel_post"]
            .iter()
            .find_map(|key| self.payload.get(*key))
    }

    /// `message.chat.id`, when present.
    pub fn chat_id(&self) -> Option<i64> {
        self.message()?.get("chat")?.get("id")?.as_i64()
    }

    /// `message.text`, when present.
    pub fn text(&self) -> Option<&str> {
        self.message()?.get("text")?.as_str()
    }
}
