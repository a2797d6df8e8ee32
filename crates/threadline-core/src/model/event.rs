use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{EventKey, EventType, Properties, ThreadKey};

/// Delivery status of a text event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Unknown,
    Delivered,
    TemporarilyFailed,
    PermanentlyFailed,
    Accepted,
    Read,
    Deleted,
    Pending,
    Draft,
}

impl MessageStatus {
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Unknown => 0,
            Self::Delivered => 1,
            Self::TemporarilyFailed => 2,
            Self::PermanentlyFailed => 3,
            Self::Accepted => 4,
            Self::Read => 5,
            Self::Deleted => 6,
            Self::Pending => 7,
            Self::Draft => 8,
        }
    }

    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::Delivered,
            2 => Self::TemporarilyFailed,
            3 => Self::PermanentlyFailed,
            4 => Self::Accepted,
            5 => Self::Read,
            6 => Self::Deleted,
            7 => Self::Pending,
            8 => Self::Draft,
            _ => Self::Unknown,
        }
    }
}

/// Shape of a text event's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    MultiPart,
    Information,
}

impl MessageType {
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Text => 0,
            Self::MultiPart => 1,
            Self::Information => 2,
        }
    }

    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::MultiPart,
            2 => Self::Information,
            _ => Self::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentStatus {
    #[default]
    Pending,
    Downloaded,
    Error,
}

impl AttachmentStatus {
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Downloaded => 1,
            Self::Error => 2,
        }
    }

    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::Downloaded,
            2 => Self::Error,
            _ => Self::Pending,
        }
    }
}

/// One part of a multi-part text event. The file itself lives outside the
/// store; only its path is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub attachment_id: String,
    pub content_type: String,
    pub file_path: String,
    #[serde(default)]
    pub status: AttachmentStatus,
}

/// A message event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEvent {
    pub account_id: String,
    pub thread_id: String,
    pub event_id: String,
    pub sender_id: String,
    /// Microseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub new_event: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub message_status: MessageStatus,
    #[serde(default)]
    pub read_timestamp: Option<i64>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub sent_time: Option<i64>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl TextEvent {
    pub fn new(
        account_id: impl Into<String>,
        thread_id: impl Into<String>,
        event_id: impl Into<String>,
        sender_id: impl Into<String>,
        timestamp: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            thread_id: thread_id.into(),
            event_id: event_id.into(),
            sender_id: sender_id.into(),
            timestamp,
            new_event: false,
            message: message.into(),
            message_type: MessageType::Text,
            message_status: MessageStatus::Unknown,
            read_timestamp: None,
            subject: None,
            sent_time: None,
            attachments: Vec::new(),
        }
    }

    #[must_use]
    pub const fn unread(mut self) -> Self {
        self.new_event = true;
        self
    }

    /// Attach parts; the event becomes [`MessageType::MultiPart`].
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.message_type = MessageType::MultiPart;
        self.attachments = attachments;
        self
    }

    #[must_use]
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("account_id".into(), json!(self.account_id));
        props.insert("thread_id".into(), json!(self.thread_id));
        props.insert("event_id".into(), json!(self.event_id));
        props.insert("sender_id".into(), json!(self.sender_id));
        props.insert("timestamp".into(), json!(self.timestamp));
        props.insert("new_event".into(), json!(self.new_event));
        props.insert("message".into(), json!(self.message));
        props.insert("message_type".into(), json!(self.message_type.as_i64()));
        props.insert("message_status".into(), json!(self.message_status.as_i64()));
        props.insert("read_timestamp".into(), json!(self.read_timestamp));
        props.insert("subject".into(), json!(self.subject));
        props.insert("sent_time".into(), json!(self.sent_time));
        props
    }
}

/// A call event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceEvent {
    pub account_id: String,
    pub thread_id: String,
    pub event_id: String,
    pub sender_id: String,
    /// Microseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub new_event: bool,
    /// Call duration in seconds.
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub missed: bool,
    #[serde(default)]
    pub remote_participant: Option<String>,
}

impl VoiceEvent {
    pub fn new(
        account_id: impl Into<String>,
        thread_id: impl Into<String>,
        event_id: impl Into<String>,
        sender_id: impl Into<String>,
        timestamp: i64,
        duration: i64,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            thread_id: thread_id.into(),
            event_id: event_id.into(),
            sender_id: sender_id.into(),
            timestamp,
            new_event: false,
            duration,
            missed: false,
            remote_participant: None,
        }
    }

    /// A missed call: zero duration, flagged unread.
    #[must_use]
    pub const fn missed(mut self) -> Self {
        self.missed = true;
        self.new_event = true;
        self.duration = 0;
        self
    }

    #[must_use]
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("account_id".into(), json!(self.account_id));
        props.insert("thread_id".into(), json!(self.thread_id));
        props.insert("event_id".into(), json!(self.event_id));
        props.insert("sender_id".into(), json!(self.sender_id));
        props.insert("timestamp".into(), json!(self.timestamp));
        props.insert("new_event".into(), json!(self.new_event));
        props.insert("duration".into(), json!(self.duration));
        props.insert("missed".into(), json!(self.missed));
        props.insert("remote_participant".into(), json!(self.remote_participant));
        props
    }
}

/// Any persisted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Text(TextEvent),
    Voice(VoiceEvent),
}

impl Event {
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Text(_) => EventType::Text,
            Self::Voice(_) => EventType::Voice,
        }
    }

    #[must_use]
    pub fn account_id(&self) -> &str {
        match self {
            Self::Text(e) => &e.account_id,
            Self::Voice(e) => &e.account_id,
        }
    }

    #[must_use]
    pub fn thread_id(&self) -> &str {
        match self {
            Self::Text(e) => &e.thread_id,
            Self::Voice(e) => &e.thread_id,
        }
    }

    #[must_use]
    pub fn event_id(&self) -> &str {
        match self {
            Self::Text(e) => &e.event_id,
            Self::Voice(e) => &e.event_id,
        }
    }

    #[must_use]
    pub fn sender_id(&self) -> &str {
        match self {
            Self::Text(e) => &e.sender_id,
            Self::Voice(e) => &e.sender_id,
        }
    }

    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        match self {
            Self::Text(e) => e.timestamp,
            Self::Voice(e) => e.timestamp,
        }
    }

    #[must_use]
    pub fn thread_key(&self) -> ThreadKey {
        ThreadKey::new(self.event_type(), self.account_id(), self.thread_id())
    }

    #[must_use]
    pub fn key(&self) -> EventKey {
        EventKey {
            thread: self.thread_key(),
            event_id: self.event_id().to_string(),
        }
    }

    #[must_use]
    pub fn properties(&self) -> Properties {
        match self {
            Self::Text(e) => e.properties(),
            Self::Voice(e) => e.properties(),
        }
    }
}

impl From<TextEvent> for Event {
    fn from(event: TextEvent) -> Self {
        Self::Text(event)
    }
}

impl From<VoiceEvent> for Event {
    fn from(event: VoiceEvent) -> Self {
        Self::Voice(event)
    }
}
