//! Read helpers over the history store.
//!
//! Every public function runs its statements inside one read transaction
//! when the connection is idle, so a thread and its participants come from
//! the same snapshot. Inside an open batch the batch itself is the snapshot.

use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use crate::cache::phone::PhoneMatcher;
use crate::filter::{Compiled, Predicate, compile};
use crate::model::{
    Attachment, AttachmentStatus, ChatType, Event, EventKey, EventType, MessageStatus,
    MessageType, Participant, ParticipantState, RecordFamily, Roles, RoomInfo, TextEvent, Thread,
    ThreadKey, VoiceEvent,
};
use crate::sort::Sort;

const THREAD_COLUMNS: &str = "t.account_id, t.thread_id, t.type, t.chat_type, t.count, \
     t.unread_count, t.last_event_id, t.last_event_timestamp, t.last_event_text";

const TEXT_EVENT_COLUMNS: &str = "e.account_id, e.thread_id, e.event_id, e.sender_id, \
     e.timestamp, e.new_event, e.message, e.message_type, e.message_status, \
     e.read_timestamp, e.subject, e.sent_time";

const VOICE_EVENT_COLUMNS: &str = "e.account_id, e.thread_id, e.event_id, e.sender_id, \
     e.timestamp, e.new_event, e.duration, e.missed, e.remote_participant";

/// Window of a paged read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    /// `None` reads to the end.
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Page {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            limit: None,
            offset: 0,
        }
    }

    #[must_use]
    pub const fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }

    fn sql_clause(self) -> String {
        match (self.limit, self.offset) {
            (Some(limit), 0) => format!(" LIMIT {limit}"),
            (Some(limit), offset) => format!(" LIMIT {limit} OFFSET {offset}"),
            (None, 0) => String::new(),
            (None, offset) => format!(" LIMIT -1 OFFSET {offset}"),
        }
    }
}

fn read_snapshot<T>(conn: &Connection, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    if !conn.is_autocommit() {
        return f(conn);
    }
    let tx = conn
        .unchecked_transaction()
        .context("begin read transaction")?;
    let out = f(&tx)?;
    tx.finish().context("finish read transaction")?;
    Ok(out)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_roles(value: i64) -> Roles {
    Roles(u32::try_from(value).unwrap_or(0))
}

fn event_type_from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<EventType> {
    let raw: i64 = row.get(idx)?;
    EventType::from_i64(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            format!("unknown event type tag {raw}").into(),
        )
    })
}

fn row_to_thread(row: &Row<'_>) -> rusqlite::Result<Thread> {
    let mut thread = Thread::new(
        event_type_from_column(row, 2)?,
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
    );
    thread.chat_type = ChatType::from_i64(row.get(3)?);
    thread.count = to_u64(row.get(4)?);
    thread.unread_count = to_u64(row.get(5)?);
    thread.last_event_id = row.get(6)?;
    thread.last_event_timestamp = row.get(7)?;
    thread.last_event_text = row.get(8)?;
    Ok(thread)
}

fn row_to_text_event(row: &Row<'_>) -> rusqlite::Result<TextEvent> {
    Ok(TextEvent {
        account_id: row.get(0)?,
        thread_id: row.get(1)?,
        event_id: row.get(2)?,
        sender_id: row.get(3)?,
        timestamp: row.get(4)?,
        new_event: row.get(5)?,
        message: row.get(6)?,
        message_type: MessageType::from_i64(row.get(7)?),
        message_status: MessageStatus::from_i64(row.get(8)?),
        read_timestamp: row.get(9)?,
        subject: row.get(10)?,
        sent_time: row.get(11)?,
        attachments: Vec::new(),
    })
}

fn row_to_voice_event(row: &Row<'_>) -> rusqlite::Result<VoiceEvent> {
    Ok(VoiceEvent {
        account_id: row.get(0)?,
        thread_id: row.get(1)?,
        event_id: row.get(2)?,
        sender_id: row.get(3)?,
        timestamp: row.get(4)?,
        new_event: row.get(5)?,
        duration: row.get(6)?,
        missed: row.get(7)?,
        remote_participant: row.get(8)?,
    })
}

/// Participants of a thread in stored order.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_participants(conn: &Connection, key: &ThreadKey) -> Result<Vec<Participant>> {
    let sql = "SELECT account_id, identifier, normalized_identifier, alias, state, roles \
               FROM thread_participants \
               WHERE account_id = ?1 AND thread_id = ?2 AND type = ?3 \
               ORDER BY position, identifier";
    let mut stmt = conn.prepare_cached(sql).context("prepare get_participants")?;
    let rows = stmt
        .query_map(
            params![key.account_id, key.thread_id, key.event_type.as_i64()],
            |row| {
                Ok(Participant {
                    account_id: row.get(0)?,
                    identifier: row.get(1)?,
                    normalized_identifier: row.get(2)?,
                    alias: row.get(3)?,
                    state: ParticipantState::from_i64(row.get(4)?),
                    roles: to_roles(row.get(5)?),
                })
            },
        )
        .with_context(|| format!("execute get_participants for {key}"))?;

    let mut participants = Vec::new();
    for row in rows {
        participants.push(row.context("read participant row")?);
    }
    Ok(participants)
}

/// Room metadata of a thread, if any was recorded.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_room_info(conn: &Connection, key: &ThreadKey) -> Result<Option<RoomInfo>> {
    let sql = "SELECT room_name, subject, created_timestamp, self_roles, joined \
               FROM chat_room_info \
               WHERE account_id = ?1 AND thread_id = ?2 AND type = ?3";
    conn.prepare_cached(sql)
        .context("prepare get_room_info")?
        .query_row(
            params![key.account_id, key.thread_id, key.event_type.as_i64()],
            |row| {
                Ok(RoomInfo {
                    room_name: row.get(0)?,
                    subject: row.get(1)?,
                    created_timestamp: row.get(2)?,
                    self_roles: to_roles(row.get(3)?),
                    joined: row.get(4)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("get_room_info for {key}"))
}

fn get_attachments(conn: &Connection, key: &EventKey) -> Result<Vec<Attachment>> {
    let sql = "SELECT attachment_id, content_type, file_path, status \
               FROM text_event_attachments \
               WHERE account_id = ?1 AND thread_id = ?2 AND event_id = ?3 \
               ORDER BY position";
    let mut stmt = conn.prepare_cached(sql).context("prepare get_attachments")?;
    let rows = stmt
        .query_map(
            params![key.thread.account_id, key.thread.thread_id, key.event_id],
            |row| {
                Ok(Attachment {
                    attachment_id: row.get(0)?,
                    content_type: row.get(1)?,
                    file_path: row.get(2)?,
                    status: AttachmentStatus::from_i64(row.get(3)?),
                })
            },
        )
        .with_context(|| format!("execute get_attachments for {key}"))?;

    let mut attachments = Vec::new();
    for row in rows {
        attachments.push(row.context("read attachment row")?);
    }
    Ok(attachments)
}

fn hydrate_thread(conn: &Connection, mut thread: Thread) -> Result<Thread> {
    let key = thread.key();
    thread.participants = get_participants(conn, &key)?;
    thread.room = get_room_info(conn, &key)?;
    Ok(thread)
}

fn hydrate_text_event(conn: &Connection, mut event: TextEvent) -> Result<TextEvent> {
    if event.message_type == MessageType::MultiPart {
        let key = EventKey::new(
            EventType::Text,
            event.account_id.clone(),
            event.thread_id.clone(),
            event.event_id.clone(),
        );
        event.attachments = get_attachments(conn, &key)?;
    }
    Ok(event)
}

/// Whether a thread row exists.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn thread_exists(conn: &Connection, key: &ThreadKey) -> Result<bool> {
    conn.prepare_cached(
        "SELECT EXISTS(SELECT 1 FROM threads \
         WHERE account_id = ?1 AND thread_id = ?2 AND type = ?3)",
    )
    .context("prepare thread_exists")?
    .query_row(
        params![key.account_id, key.thread_id, key.event_type.as_i64()],
        |row| row.get(0),
    )
    .with_context(|| format!("check thread_exists for {key}"))
}

/// Whether an event row exists in its family's table.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn event_exists(conn: &Connection, key: &EventKey) -> Result<bool> {
    let table = key.thread.event_type.event_family().table();
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {table} \
         WHERE account_id = ?1 AND thread_id = ?2 AND event_id = ?3)"
    );
    conn.prepare_cached(&sql)
        .context("prepare event_exists")?
        .query_row(
            params![key.thread.account_id, key.thread.thread_id, key.event_id],
            |row| row.get(0),
        )
        .with_context(|| format!("check event_exists for {key}"))
}

/// Fetch one thread with its participants and room info.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_single_thread(conn: &Connection, key: &ThreadKey) -> Result<Option<Thread>> {
    read_snapshot(conn, |conn| {
        let sql = format!(
            "SELECT {THREAD_COLUMNS} FROM threads t \
             WHERE t.account_id = ?1 AND t.thread_id = ?2 AND t.type = ?3"
        );
        let thread = conn
            .prepare_cached(&sql)
            .context("prepare get_single_thread")?
            .query_row(
                params![key.account_id, key.thread_id, key.event_type.as_i64()],
                row_to_thread,
            )
            .optional()
            .with_context(|| format!("get_single_thread for {key}"))?;

        thread.map(|t| hydrate_thread(conn, t)).transpose()
    })
}

/// Fetch one event (with attachments for multi-part text events).
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_single_event(conn: &Connection, key: &EventKey) -> Result<Option<Event>> {
    read_snapshot(conn, |conn| {
        let params = params![key.thread.account_id, key.thread.thread_id, key.event_id];
        let filter = "WHERE e.account_id = ?1 AND e.thread_id = ?2 AND e.event_id = ?3";
        match key.thread.event_type {
            EventType::Text => {
                let sql = format!("SELECT {TEXT_EVENT_COLUMNS} FROM text_events e {filter}");
                let event = conn
                    .prepare_cached(&sql)
                    .context("prepare get_single_event")?
                    .query_row(params, row_to_text_event)
                    .optional()
                    .with_context(|| format!("get_single_event for {key}"))?;
                event
                    .map(|e| hydrate_text_event(conn, e).map(Event::Text))
                    .transpose()
            }
            EventType::Voice => {
                let sql = format!("SELECT {VOICE_EVENT_COLUMNS} FROM voice_events e {filter}");
                conn.prepare_cached(&sql)
                    .context("prepare get_single_event")?
                    .query_row(params, row_to_voice_event)
                    .optional()
                    .map(|e| e.map(Event::Voice))
                    .with_context(|| format!("get_single_event for {key}"))
            }
        }
    })
}

/// `WHERE` clause and bound values for a read over `family`.
fn where_clause(
    family: RecordFamily,
    event_type: EventType,
    predicate: Option<&Predicate>,
) -> Result<Option<(String, Vec<SqlValue>)>> {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if family == RecordFamily::Thread {
        values.push(SqlValue::Integer(event_type.as_i64()));
        conditions.push(format!("t.type = ?{}", values.len()));
    }

    let alias = if family == RecordFamily::Thread { "t" } else { "e" };
    if let Some(predicate) = predicate {
        match compile(predicate, family, alias, values.len() + 1)? {
            Compiled::Nothing => return Ok(None),
            Compiled::Clause { sql, params } => {
                conditions.push(format!("({sql})"));
                values.extend(params);
            }
        }
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    Ok(Some((clause, values)))
}

/// Threads of `event_type` matching `predicate`, ordered by `sort`.
///
/// A predicate that compiles to nothing yields an empty page without
/// touching the database.
///
/// # Errors
///
/// Returns an error if the predicate or sort is invalid for threads or the
/// query fails.
pub fn query_threads(
    conn: &Connection,
    event_type: EventType,
    sort: &Sort,
    predicate: Option<&Predicate>,
    page: Page,
) -> Result<Vec<Thread>> {
    let order_by = sort.order_by_clause(RecordFamily::Thread, "t")?;
    let Some((where_sql, values)) = where_clause(RecordFamily::Thread, event_type, predicate)?
    else {
        return Ok(Vec::new());
    };

    let sql = format!(
        "SELECT {THREAD_COLUMNS} FROM threads t{where_sql} {order_by}{}",
        page.sql_clause()
    );

    read_snapshot(conn, |conn| {
        let mut stmt = conn
            .prepare(&sql)
            .with_context(|| format!("prepare query_threads: {sql}"))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row_to_thread)
            .context("execute query_threads")?;

        let mut threads = Vec::new();
        for row in rows {
            threads.push(row.context("read query_threads row")?);
        }
        drop(stmt);

        threads
            .into_iter()
            .map(|t| hydrate_thread(conn, t))
            .collect()
    })
}

/// Events of `event_type` matching `predicate`, ordered by `sort`.
///
/// # Errors
///
/// Returns an error if the predicate or sort is invalid for the event
/// family or the query fails.
pub fn query_events(
    conn: &Connection,
    event_type: EventType,
    sort: &Sort,
    predicate: Option<&Predicate>,
    page: Page,
) -> Result<Vec<Event>> {
    let family = event_type.event_family();
    let order_by = sort.order_by_clause(family, "e")?;
    let Some((where_sql, values)) = where_clause(family, event_type, predicate)? else {
        return Ok(Vec::new());
    };

    let (columns, table) = match event_type {
        EventType::Text => (TEXT_EVENT_COLUMNS, "text_events"),
        EventType::Voice => (VOICE_EVENT_COLUMNS, "voice_events"),
    };
    let sql = format!(
        "SELECT {columns} FROM {table} e{where_sql} {order_by}{}",
        page.sql_clause()
    );

    read_snapshot(conn, |conn| {
        let mut stmt = conn
            .prepare(&sql)
            .with_context(|| format!("prepare query_events: {sql}"))?;
        let params = params_from_iter(values.iter());

        let mut events = Vec::new();
        match event_type {
            EventType::Text => {
                let rows = stmt
                    .query_map(params, row_to_text_event)
                    .context("execute query_events")?;
                for row in rows {
                    let event = row.context("read query_events row")?;
                    events.push(Event::Text(hydrate_text_event(conn, event)?));
                }
            }
            EventType::Voice => {
                let rows = stmt
                    .query_map(params, row_to_voice_event)
                    .context("execute query_events")?;
                for row in rows {
                    events.push(Event::Voice(row.context("read query_events row")?));
                }
            }
        }
        Ok(events)
    })
}

/// Number of threads of `event_type` matching `predicate`.
///
/// # Errors
///
/// Returns an error if the predicate is invalid or the query fails.
pub fn count_threads(
    conn: &Connection,
    event_type: EventType,
    predicate: Option<&Predicate>,
) -> Result<u64> {
    let Some((where_sql, values)) = where_clause(RecordFamily::Thread, event_type, predicate)?
    else {
        return Ok(0);
    };
    let sql = format!("SELECT COUNT(*) FROM threads t{where_sql}");
    let count: i64 = conn
        .prepare(&sql)
        .with_context(|| format!("prepare count_threads: {sql}"))?
        .query_row(params_from_iter(values.iter()), |row| row.get(0))
        .context("execute count_threads")?;
    Ok(to_u64(count))
}

/// Every thread of `event_type`, newest first. Used for cache warm-up.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn all_threads(conn: &Connection, event_type: EventType) -> Result<Vec<Thread>> {
    query_threads(conn, event_type, &Sort::default(), None, Page::all())
}

/// Find the non-room thread of `account_id` whose participants fuzzy-match
/// `identifiers` one to one. The most recently active match wins.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_thread_for_participants(
    conn: &Connection,
    event_type: EventType,
    account_id: &str,
    identifiers: &[String],
    matcher: PhoneMatcher,
) -> Result<Option<Thread>> {
    let predicate = Predicate::and(vec![
        Predicate::equals("account_id", account_id),
        Predicate::with_flags(
            "chat_type",
            ChatType::Room.as_i64(),
            crate::filter::MatchFlags::new(crate::filter::Comparison::NotEquals),
        ),
    ]);
    let candidates = query_threads(
        conn,
        event_type,
        &Sort::default(),
        Some(&predicate),
        Page::all(),
    )?;

    Ok(candidates.into_iter().find(|thread| {
        let ids: Vec<&str> = thread.participant_ids().collect();
        matcher.participants_match(identifiers, &ids)
    }))
}
