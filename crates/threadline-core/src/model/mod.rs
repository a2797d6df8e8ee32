//! Typed records persisted by the store.
//!
//! Records are plain structs; they are flattened into [`Properties`] only
//! where a dynamic view is required (predicate matching, sorting in memory,
//! JSON output).

pub mod event;
pub mod participant;
pub mod thread;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use event::{
    Attachment, AttachmentStatus, Event, MessageStatus, MessageType, TextEvent, VoiceEvent,
};
pub use participant::{Participant, ParticipantState, Roles};
pub use thread::{ChatType, RoomInfo, Thread};

/// Flattened property map of a record, keyed by property name.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Sender id used for events originating from the local user.
pub const SELF_SENDER: &str = "self";

/// The two event families a thread can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Text,
    Voice,
}

impl EventType {
    /// Integer tag stored in the `threads.type` column.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Text => 0,
            Self::Voice => 1,
        }
    }

    #[must_use]
    pub const fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Text),
            1 => Some(Self::Voice),
            _ => None,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
        }
    }

    /// Whether threads of this type take part in conversation grouping.
    #[must_use]
    pub const fn groups_conversations(self) -> bool {
        matches!(self, Self::Text)
    }

    /// Record family holding events of this type.
    #[must_use]
    pub const fn event_family(self) -> RecordFamily {
        match self {
            Self::Text => RecordFamily::TextEvent,
            Self::Voice => RecordFamily::VoiceEvent,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "message" | "sms" => Ok(Self::Text),
            "voice" | "call" => Ok(Self::Voice),
            other => anyhow::bail!("unknown event type '{other}': expected text or voice"),
        }
    }
}

/// Queryable record families, each backed by one table.
///
/// A family knows which property names may appear in predicates and sorts
/// and which columns form its identity (used as the final sort tie-break).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordFamily {
    Thread,
    TextEvent,
    VoiceEvent,
}

impl RecordFamily {
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Thread => "threads",
            Self::TextEvent => "text_events",
            Self::VoiceEvent => "voice_events",
        }
    }

    /// Property names that map one-to-one onto columns of [`Self::table`].
    #[must_use]
    pub const fn properties(self) -> &'static [&'static str] {
        match self {
            Self::Thread => &[
                "account_id",
                "thread_id",
                "type",
                "chat_type",
                "count",
                "unread_count",
                "last_event_id",
                "last_event_timestamp",
                "last_event_text",
            ],
            Self::TextEvent => &[
                "account_id",
                "thread_id",
                "event_id",
                "sender_id",
                "timestamp",
                "new_event",
                "message",
                "message_type",
                "message_status",
                "read_timestamp",
                "subject",
                "sent_time",
            ],
            Self::VoiceEvent => &[
                "account_id",
                "thread_id",
                "event_id",
                "sender_id",
                "timestamp",
                "new_event",
                "duration",
                "missed",
                "remote_participant",
            ],
        }
    }

    /// Identity columns, in tie-break order.
    #[must_use]
    pub const fn identity(self) -> &'static [&'static str] {
        match self {
            Self::Thread => &["account_id", "thread_id"],
            Self::TextEvent | Self::VoiceEvent => &["account_id", "thread_id", "event_id"],
        }
    }

    #[must_use]
    pub fn has_property(self, name: &str) -> bool {
        self.properties().contains(&name)
    }

    /// Declared column affinity of `name`, or `None` if the family has no
    /// such property.
    #[must_use]
    pub fn affinity(self, name: &str) -> Option<Affinity> {
        if !self.has_property(name) {
            return None;
        }
        Some(match name {
            "account_id" | "thread_id" | "event_id" | "sender_id" | "last_event_id"
            | "last_event_text" | "message" | "subject" | "remote_participant" => Affinity::Text,
            _ => Affinity::Integer,
        })
    }
}

/// SQLite column affinity, which decides how a bound value is converted
/// before it is compared with the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Affinity {
    Text,
    Integer,
}

/// Identity of a thread: `(type, account_id, thread_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadKey {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub account_id: String,
    pub thread_id: String,
}

impl ThreadKey {
    pub fn new(
        event_type: EventType,
        account_id: impl Into<String>,
        thread_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            account_id: account_id.into(),
            thread_id: thread_id.into(),
        }
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.event_type, self.account_id, self.thread_id)
    }
}

/// Identity of an event: its thread key plus `event_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    #[serde(flatten)]
    pub thread: ThreadKey,
    pub event_id: String,
}

impl EventKey {
    pub fn new(
        event_type: EventType,
        account_id: impl Into<String>,
        thread_id: impl Into<String>,
        event_id: impl Into<String>,
    ) -> Self {
        Self {
            thread: ThreadKey::new(event_type, account_id, thread_id),
            event_id: event_id.into(),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.thread, self.event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_tags_roundtrip() {
        for ty in [EventType::Text, EventType::Voice] {
            assert_eq!(EventType::from_i64(ty.as_i64()), Some(ty));
        }
        assert_eq!(EventType::from_i64(7), None);
    }

    #[test]
    fn event_type_parse_aliases() {
        assert_eq!("SMS".parse::<EventType>().expect("parse"), EventType::Text);
        assert_eq!("call".parse::<EventType>().expect("parse"), EventType::Voice);
        assert!("fax".parse::<EventType>().is_err());
    }

    #[test]
    fn only_text_threads_group() {
        assert!(EventType::Text.groups_conversations());
        assert!(!EventType::Voice.groups_conversations());
    }

    #[test]
    fn identity_columns_are_queryable_properties() {
        for family in [
            RecordFamily::Thread,
            RecordFamily::TextEvent,
            RecordFamily::VoiceEvent,
        ] {
            for column in family.identity() {
                assert!(family.has_property(column), "{column} missing on {family:?}");
            }
        }
    }

    #[test]
    fn every_property_has_an_affinity() {
        for family in [
            RecordFamily::Thread,
            RecordFamily::TextEvent,
            RecordFamily::VoiceEvent,
        ] {
            for property in family.properties() {
                assert!(family.affinity(property).is_some());
            }
        }
        assert_eq!(RecordFamily::Thread.affinity("thread_id"), Some(Affinity::Text));
        assert_eq!(RecordFamily::Thread.affinity("count"), Some(Affinity::Integer));
        assert_eq!(RecordFamily::Thread.affinity("message"), None);
    }

    #[test]
    fn thread_key_ordering_is_type_first() {
        let a = ThreadKey::new(EventType::Text, "z", "z");
        let b = ThreadKey::new(EventType::Voice, "a", "a");
        assert!(a < b);
        assert_eq!(a.to_string(), "text/z/z");
    }
}
