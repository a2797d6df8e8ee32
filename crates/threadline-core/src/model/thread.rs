use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{EventType, Participant, Properties, Roles, ThreadKey};

/// How the remote side of a thread is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    #[default]
    None,
    Contact,
    Room,
}

impl ChatType {
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Contact => 1,
            Self::Room => 2,
        }
    }

    /// Unknown tags decode as [`Self::None`].
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::Contact,
            2 => Self::Room,
            _ => Self::None,
        }
    }
}

/// Metadata kept for multi-user room threads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomInfo {
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub created_timestamp: Option<i64>,
    #[serde(default)]
    pub self_roles: Roles,
    #[serde(default)]
    pub joined: bool,
}

/// A persisted thread with its denormalized counters.
///
/// `count`, `unread_count` and the `last_event_*` fields are maintained by
/// the store from the event tables and are read-only for callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub account_id: String,
    pub thread_id: String,
    #[serde(default)]
    pub chat_type: ChatType,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub unread_count: u64,
    #[serde(default)]
    pub last_event_id: Option<String>,
    #[serde(default)]
    pub last_event_timestamp: Option<i64>,
    /// Message text of the latest event, for list previews. Always `None`
    /// for voice threads.
    #[serde(default)]
    pub last_event_text: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub room: Option<RoomInfo>,
}

impl Thread {
    /// An empty thread with no events or participants.
    pub fn new(
        event_type: EventType,
        account_id: impl Into<String>,
        thread_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            account_id: account_id.into(),
            thread_id: thread_id.into(),
            chat_type: ChatType::None,
            count: 0,
            unread_count: 0,
            last_event_id: None,
            last_event_timestamp: None,
            last_event_text: None,
            participants: Vec::new(),
            room: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> ThreadKey {
        ThreadKey::new(self.event_type, self.account_id.clone(), self.thread_id.clone())
    }

    #[must_use]
    pub fn is_room(&self) -> bool {
        self.chat_type == ChatType::Room
    }

    /// Participant identifiers in stored order.
    pub fn participant_ids(&self) -> impl Iterator<Item = &str> {
        self.participants.iter().map(|p| p.identifier.as_str())
    }

    /// Flatten into the property map used by predicates and in-memory sorts.
    ///
    /// Keys match the column names of the `threads` table.
    #[must_use]
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("account_id".into(), json!(self.account_id));
        props.insert("thread_id".into(), json!(self.thread_id));
        props.insert("type".into(), json!(self.event_type.as_i64()));
        props.insert("chat_type".into(), json!(self.chat_type.as_i64()));
        props.insert("count".into(), json!(self.count));
        props.insert("unread_count".into(), json!(self.unread_count));
        props.insert("last_event_id".into(), json!(self.last_event_id));
        props.insert("last_event_timestamp".into(), json!(self.last_event_timestamp));
        props.insert("last_event_text".into(), json!(self.last_event_text));
        props
    }
}
