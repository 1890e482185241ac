// ABOUTME: In-memory per-session mutable state — messages, trust level, workspace, metadata.
// ABOUTME: Session type is assigned at creation from the channel and never mutates (§3).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Message;

/// Trust category of a session, derived from the channel and used as the
/// sole policy discriminator (§3, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    /// Fully trusted direct dialog.
    Main,
    /// Partial trust, same user, different channel context.
    Dm,
    /// Low trust, shared channel.
    Group,
    /// Low trust, forum sub-thread.
    Topic,
}

impl SessionType {
    /// Derive the session type from a channel name.
    ///
    /// `"cli"` and `"main"` map to `Main` (direct, trusted surfaces);
    /// `"dm"`-prefixed channels map to `Dm`; `"topic"`-prefixed channels
    /// map to `Topic`; everything else is treated as a shared `Group`
    /// channel and gets the least trust by default.
    pub fn from_channel(channel: &str) -> Self {
        let lower = channel.to_lowercase();
        if lower == "cli" || lower == "main" {
            Self::Main
        } else if lower.starts_with("dm") {
            Self::Dm
        } else if lower.starts_with("topic") {
            Self::Topic
        } else {
            Self::Group
        }
    }
}

/// In-memory aggregate for one session. The Runtime exclusively owns this;
/// concurrent turns for the same `session_id` are serialized by the Runtime
/// (§5), so no internal locking is needed here.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub channel: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub workspace: Option<PathBuf>,
    pub session_type: SessionType,
    pub messages: Vec<Message>,
    pub metadata: HashMap<String, Value>,
}

impl SessionContext {
    /// Build the session id as `{channel}_{chat_id}_{sender_id}` per §3.
    pub fn build_session_id(channel: &str, chat_id: &str, sender_id: &str) -> String {
        format!("{channel}_{chat_id}_{sender_id}")
    }

    pub fn new(session_id: impl Into<String>, channel: impl Into<String>, sender_id: impl Into<String>) -> Self {
        let channel = channel.into();
        let session_type = SessionType::from_channel(&channel);
        Self {
            session_id: session_id.into(),
            channel,
            sender_id: sender_id.into(),
            sender_name: None,
            workspace: None,
            session_type,
            messages: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Append a message. The only way `messages` grows (§4.5).
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Merge a metadata key. The only other permitted mutation (§4.5).
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }
}
