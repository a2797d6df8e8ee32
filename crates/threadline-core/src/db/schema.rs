//! Canonical SQLite schema for the history store.
//!
//! - `threads` holds one row per `(account_id, thread_id, type)` with
//!   denormalized counters kept current by triggers on the event tables
//! - `thread_participants` and `chat_room_info` hang off a thread and are
//!   removed with it
//! - `text_events` / `voice_events` hold the events of each family;
//!   `text_event_attachments` holds the parts of multi-part messages
//! - `store_meta` tracks the schema version

/// Migration v1: core tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS threads (
    account_id TEXT NOT NULL,
    thread_id TEXT NOT NULL,
    type INTEGER NOT NULL CHECK (type IN (0, 1)),
    chat_type INTEGER NOT NULL DEFAULT 0 CHECK (chat_type IN (0, 1, 2)),
    count INTEGER NOT NULL DEFAULT 0,
    unread_count INTEGER NOT NULL DEFAULT 0,
    last_event_id TEXT,
    last_event_timestamp INTEGER,
    last_event_text TEXT,
    PRIMARY KEY (account_id, thread_id, type)
);

CREATE TABLE IF NOT EXISTS thread_participants (
    account_id TEXT NOT NULL,
    thread_id TEXT NOT NULL,
    type INTEGER NOT NULL,
    identifier TEXT NOT NULL,
    normalized_identifier TEXT NOT NULL,
    alias TEXT,
    state INTEGER NOT NULL DEFAULT 0,
    roles INTEGER NOT NULL DEFAULT 0,
    position INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (account_id, thread_id, type, identifier),
    FOREIGN KEY (account_id, thread_id, type)
        REFERENCES threads(account_id, thread_id, type) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS chat_room_info (
    account_id TEXT NOT NULL,
    thread_id TEXT NOT NULL,
    type INTEGER NOT NULL,
    room_name TEXT,
    subject TEXT,
    created_timestamp INTEGER,
    self_roles INTEGER NOT NULL DEFAULT 0,
    joined INTEGER NOT NULL DEFAULT 0 CHECK (joined IN (0, 1)),
    PRIMARY KEY (account_id, thread_id, type),
    FOREIGN KEY (account_id, thread_id, type)
        REFERENCES threads(account_id, thread_id, type) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS text_events (
    account_id TEXT NOT NULL,
    thread_id TEXT NOT NULL,
    event_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    new_event INTEGER NOT NULL DEFAULT 0 CHECK (new_event IN (0, 1)),
    message TEXT NOT NULL DEFAULT '',
    message_type INTEGER NOT NULL DEFAULT 0,
    message_status INTEGER NOT NULL DEFAULT 0,
    read_timestamp INTEGER,
    subject TEXT,
    sent_time INTEGER,
    PRIMARY KEY (account_id, thread_id, event_id)
);

CREATE TABLE IF NOT EXISTS text_event_attachments (
    account_id TEXT NOT NULL,
    thread_id TEXT NOT NULL,
    event_id TEXT NOT NULL,
    attachment_id TEXT NOT NULL,
    content_type TEXT NOT NULL,
    file_path TEXT NOT NULL,
    status INTEGER NOT NULL DEFAULT 0,
    position INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (account_id, thread_id, event_id, attachment_id),
    FOREIGN KEY (account_id, thread_id, event_id)
        REFERENCES text_events(account_id, thread_id, event_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS voice_events (
    account_id TEXT NOT NULL,
    thread_id TEXT NOT NULL,
    event_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    new_event INTEGER NOT NULL DEFAULT 0 CHECK (new_event IN (0, 1)),
    duration INTEGER NOT NULL DEFAULT 0,
    missed INTEGER NOT NULL DEFAULT 0 CHECK (missed IN (0, 1)),
    remote_participant TEXT,
    PRIMARY KEY (account_id, thread_id, event_id)
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, created_at_us)
VALUES (1, 1, 0);
";

/// Migration v2: read-path indexes and the triggers that keep thread
/// counters equal to the live events of each thread.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_threads_type_last_event
    ON threads(type, last_event_timestamp DESC);

CREATE INDEX IF NOT EXISTS idx_participants_normalized
    ON thread_participants(normalized_identifier, type);

CREATE INDEX IF NOT EXISTS idx_text_events_thread_timestamp
    ON text_events(account_id, thread_id, timestamp DESC);

CREATE INDEX IF NOT EXISTS idx_text_events_unread
    ON text_events(account_id, thread_id, new_event);

CREATE INDEX IF NOT EXISTS idx_voice_events_thread_timestamp
    ON voice_events(account_id, thread_id, timestamp DESC);

CREATE TRIGGER IF NOT EXISTS text_events_ai
AFTER INSERT ON text_events
BEGIN
    UPDATE threads SET
        count = (SELECT COUNT(*) FROM text_events e
                 WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id),
        unread_count = (SELECT COUNT(*) FROM text_events e
                        WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id
                          AND e.new_event = 1),
        last_event_id = (SELECT e.event_id FROM text_events e
                         WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id
                         ORDER BY e.timestamp DESC, e.event_id DESC LIMIT 1),
        last_event_timestamp = (SELECT MAX(e.timestamp) FROM text_events e
                                WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id),
        last_event_text = (SELECT e.message FROM text_events e
                           WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id
                           ORDER BY e.timestamp DESC, e.event_id DESC LIMIT 1)
    WHERE account_id = new.account_id AND thread_id = new.thread_id AND type = 0;
END;

CREATE TRIGGER IF NOT EXISTS text_events_au
AFTER UPDATE ON text_events
BEGIN
    UPDATE threads SET
        unread_count = (SELECT COUNT(*) FROM text_events e
                        WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id
                          AND e.new_event = 1),
        last_event_id = (SELECT e.event_id FROM text_events e
                         WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id
                         ORDER BY e.timestamp DESC, e.event_id DESC LIMIT 1),
        last_event_timestamp = (SELECT MAX(e.timestamp) FROM text_events e
                                WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id),
        last_event_text = (SELECT e.message FROM text_events e
                           WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id
                           ORDER BY e.timestamp DESC, e.event_id DESC LIMIT 1)
    WHERE account_id = new.account_id AND thread_id = new.thread_id AND type = 0;
END;

CREATE TRIGGER IF NOT EXISTS text_events_ad
AFTER DELETE ON text_events
BEGIN
    UPDATE threads SET
        count = (SELECT COUNT(*) FROM text_events e
                 WHERE e.account_id = old.account_id AND e.thread_id = old.thread_id),
        unread_count = (SELECT COUNT(*) FROM text_events e
                        WHERE e.account_id = old.account_id AND e.thread_id = old.thread_id
                          AND e.new_event = 1),
        last_event_id = (SELECT e.event_id FROM text_events e
                         WHERE e.account_id = old.account_id AND e.thread_id = old.thread_id
                         ORDER BY e.timestamp DESC, e.event_id DESC LIMIT 1),
        last_event_timestamp = (SELECT MAX(e.timestamp) FROM text_events e
                                WHERE e.account_id = old.account_id AND e.thread_id = old.thread_id),
        last_event_text = (SELECT e.message FROM text_events e
                           WHERE e.account_id = old.account_id AND e.thread_id = old.thread_id
                           ORDER BY e.timestamp DESC, e.event_id DESC LIMIT 1)
    WHERE account_id = old.account_id AND thread_id = old.thread_id AND type = 0;
END;

CREATE TRIGGER IF NOT EXISTS voice_events_ai
AFTER INSERT ON voice_events
BEGIN
    UPDATE threads SET
        count = (SELECT COUNT(*) FROM voice_events e
                 WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id),
        unread_count = (SELECT COUNT(*) FROM voice_events e
                        WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id
                          AND e.new_event = 1),
        last_event_id = (SELECT e.event_id FROM voice_events e
                         WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id
                         ORDER BY e.timestamp DESC, e.event_id DESC LIMIT 1),
        last_event_timestamp = (SELECT MAX(e.timestamp) FROM voice_events e
                                WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id)
    WHERE account_id = new.account_id AND thread_id = new.thread_id AND type = 1;
END;

CREATE TRIGGER IF NOT EXISTS voice_events_au
AFTER UPDATE ON voice_events
BEGIN
    UPDATE threads SET
        unread_count = (SELECT COUNT(*) FROM voice_events e
                        WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id
                          AND e.new_event = 1),
        last_event_id = (SELECT e.event_id FROM voice_events e
                         WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id
                         ORDER BY e.timestamp DESC, e.event_id DESC LIMIT 1),
        last_event_timestamp = (SELECT MAX(e.timestamp) FROM voice_events e
                                WHERE e.account_id = new.account_id AND e.thread_id = new.thread_id)
    WHERE account_id = new.account_id AND thread_id = new.thread_id AND type = 1;
END;

CREATE TRIGGER IF NOT EXISTS voice_events_ad
AFTER DELETE ON voice_events
BEGIN
    UPDATE threads SET
        count = (SELECT COUNT(*) FROM voice_events e
                 WHERE e.account_id = old.account_id AND e.thread_id = old.thread_id),
        unread_count = (SELECT COUNT(*) FROM voice_events e
                        WHERE e.account_id = old.account_id AND e.thread_id = old.thread_id
                          AND e.new_event = 1),
        last_event_id = (SELECT e.event_id FROM voice_events e
                         WHERE e.account_id = old.account_id AND e.thread_id = old.thread_id
                         ORDER BY e.timestamp DESC, e.event_id DESC LIMIT 1),
        last_event_timestamp = (SELECT MAX(e.timestamp) FROM voice_events e
                                WHERE e.account_id = old.account_id AND e.thread_id = old.thread_id)
    WHERE account_id = old.account_id AND thread_id = old.thread_id AND type = 1;
END;

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
";

/// Indexes expected by the thread and event read paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_threads_type_last_event",
    "idx_participants_normalized",
    "idx_text_events_thread_timestamp",
    "idx_text_events_unread",
    "idx_voice_events_thread_timestamp",
];

/// Triggers that maintain thread counters.
pub const REQUIRED_TRIGGERS: &[&str] = &[
    "text_events_ai",
    "text_events_au",
    "text_events_ad",
    "voice_events_ai",
    "voice_events_au",
    "voice_events_ad",
];
