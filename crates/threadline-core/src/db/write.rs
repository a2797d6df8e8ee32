//! Mutating helpers over the history store.
//!
//! These run on the writer connection, normally inside a batch opened by
//! [`super::Store::begin_batch_operation`]. Thread counters are not touched
//! here; the event-table triggers keep them current.

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};

use super::query;
use crate::model::{
    ChatType, Event, EventKey, EventType, Participant, Roles, RoomInfo, SELF_SENDER, TextEvent,
    ThreadKey, VoiceEvent,
};

/// How a write changed the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Modified,
}

fn to_i64(value: u32) -> i64 {
    i64::from(value)
}

fn insert_participants(
    conn: &Connection,
    key: &ThreadKey,
    participants: &[Participant],
) -> Result<()> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO thread_participants \
             (account_id, thread_id, type, identifier, normalized_identifier, alias, state, roles, position) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT(account_id, thread_id, type, identifier) DO UPDATE SET \
             normalized_identifier = excluded.normalized_identifier, \
             alias = excluded.alias, state = excluded.state, roles = excluded.roles",
        )
        .context("prepare insert participant")?;

    for (position, participant) in (0_i64..).zip(participants) {
        stmt.execute(params![
            key.account_id,
            key.thread_id,
            key.event_type.as_i64(),
            participant.identifier,
            participant.normalized_identifier,
            participant.alias,
            participant.state.as_i64(),
            to_i64(participant.roles.0),
            position,
        ])
        .with_context(|| format!("insert participant '{}' of {key}", participant.identifier))?;
    }
    Ok(())
}

/// Insert an empty thread row with the given participants.
///
/// # Errors
///
/// Returns an error if the thread already exists or an insert fails.
pub fn create_thread(
    conn: &Connection,
    key: &ThreadKey,
    chat_type: ChatType,
    participants: &[Participant],
) -> Result<()> {
    conn.prepare_cached(
        "INSERT INTO threads (account_id, thread_id, type, chat_type) VALUES (?1, ?2, ?3, ?4)",
    )
    .context("prepare create_thread")?
    .execute(params![
        key.account_id,
        key.thread_id,
        key.event_type.as_i64(),
        chat_type.as_i64()
    ])
    .with_context(|| format!("create thread {key}"))?;

    insert_participants(conn, key, participants)
}

/// Make sure the thread owning `event` exists. A new thread gets the
/// sender as its only participant, unless the sender is the local user.
///
/// Returns `true` if the thread was created.
///
/// # Errors
///
/// Returns an error if a query or insert fails.
pub fn ensure_thread(conn: &Connection, event: &Event) -> Result<bool> {
    let key = event.thread_key();
    if query::thread_exists(conn, &key)? {
        return Ok(false);
    }

    let participants = if event.sender_id() == SELF_SENDER {
        Vec::new()
    } else {
        vec![Participant::new(event.account_id(), event.sender_id())]
    };
    create_thread(conn, &key, ChatType::None, &participants)?;
    tracing::debug!(
        account_id = %key.account_id,
        thread_id = %key.thread_id,
        "created thread for incoming event"
    );
    Ok(true)
}

/// Upsert a text event by identity. Attachments are replaced wholesale.
///
/// # Errors
///
/// Returns an error if a query or write fails.
pub fn write_text_event(conn: &Connection, event: &TextEvent) -> Result<WriteOutcome> {
    let key = EventKey::new(
        EventType::Text,
        event.account_id.clone(),
        event.thread_id.clone(),
        event.event_id.clone(),
    );
    let exists = query::event_exists(conn, &key)?;

    let sql = if exists {
        "UPDATE text_events SET sender_id = ?4, timestamp = ?5, new_event = ?6, message = ?7, \
         message_type = ?8, message_status = ?9, read_timestamp = ?10, subject = ?11, \
         sent_time = ?12 \
         WHERE account_id = ?1 AND thread_id = ?2 AND event_id = ?3"
    } else {
        "INSERT INTO text_events (account_id, thread_id, event_id, sender_id, timestamp, \
         new_event, message, message_type, message_status, read_timestamp, subject, sent_time) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
    };
    conn.prepare_cached(sql)
        .context("prepare write_text_event")?
        .execute(params![
            event.account_id,
            event.thread_id,
            event.event_id,
            event.sender_id,
            event.timestamp,
            event.new_event,
            event.message,
            event.message_type.as_i64(),
            event.message_status.as_i64(),
            event.read_timestamp,
            event.subject,
            event.sent_time,
        ])
        .with_context(|| format!("write text event {key}"))?;

    conn.prepare_cached(
        "DELETE FROM text_event_attachments \
         WHERE account_id = ?1 AND thread_id = ?2 AND event_id = ?3",
    )
    .context("prepare clear attachments")?
    .execute(params![event.account_id, event.thread_id, event.event_id])
    .with_context(|| format!("clear attachments of {key}"))?;

    let mut insert = conn
        .prepare_cached(
            "INSERT INTO text_event_attachments \
             (account_id, thread_id, event_id, attachment_id, content_type, file_path, status, position) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .context("prepare insert attachment")?;
    for (position, attachment) in (0_i64..).zip(&event.attachments) {
        insert
            .execute(params![
                event.account_id,
                event.thread_id,
                event.event_id,
                attachment.attachment_id,
                attachment.content_type,
                attachment.file_path,
                attachment.status.as_i64(),
                position,
            ])
            .with_context(|| format!("insert attachment '{}' of {key}", attachment.attachment_id))?;
    }

    Ok(if exists {
        WriteOutcome::Modified
    } else {
        WriteOutcome::Created
    })
}

/// Upsert a voice event by identity.
///
/// # Errors
///
/// Returns an error if a query or write fails.
pub fn write_voice_event(conn: &Connection, event: &VoiceEvent) -> Result<WriteOutcome> {
    let key = EventKey::new(
        EventType::Voice,
        event.account_id.clone(),
        event.thread_id.clone(),
        event.event_id.clone(),
    );
    let exists = query::event_exists(conn, &key)?;

    let sql = if exists {
        "UPDATE voice_events SET sender_id = ?4, timestamp = ?5, new_event = ?6, duration = ?7, \
         missed = ?8, remote_participant = ?9 \
         WHERE account_id = ?1 AND thread_id = ?2 AND event_id = ?3"
    } else {
        "INSERT INTO voice_events (account_id, thread_id, event_id, sender_id, timestamp, \
         new_event, duration, missed, remote_participant) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
    };
    conn.prepare_cached(sql)
        .context("prepare write_voice_event")?
        .execute(params![
            event.account_id,
            event.thread_id,
            event.event_id,
            event.sender_id,
            event.timestamp,
            event.new_event,
            event.duration,
            event.missed,
            event.remote_participant,
        ])
        .with_context(|| format!("write voice event {key}"))?;

    Ok(if exists {
        WriteOutcome::Modified
    } else {
        WriteOutcome::Created
    })
}

/// Upsert any event.
///
/// # Errors
///
/// See [`write_text_event`] and [`write_voice_event`].
pub fn write_event(conn: &Connection, event: &Event) -> Result<WriteOutcome> {
    match event {
        Event::Text(e) => write_text_event(conn, e),
        Event::Voice(e) => write_voice_event(conn, e),
    }
}

fn remove_event(conn: &Connection, key: &EventKey) -> Result<bool> {
    let table = key.thread.event_type.event_family().table();
    let sql =
        format!("DELETE FROM {table} WHERE account_id = ?1 AND thread_id = ?2 AND event_id = ?3");
    let removed = conn
        .prepare_cached(&sql)
        .context("prepare remove_event")?
        .execute(params![key.thread.account_id, key.thread.thread_id, key.event_id])
        .with_context(|| format!("remove event {key}"))?;
    Ok(removed > 0)
}

/// Delete a text event and its attachments. Returns `false` if it did not
/// exist.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn remove_text_event(conn: &Connection, key: &EventKey) -> Result<bool> {
    if key.thread.event_type != EventType::Text {
        bail!("{key} is not a text event");
    }
    remove_event(conn, key)
}

/// Delete a voice event. Returns `false` if it did not exist.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn remove_voice_event(conn: &Connection, key: &EventKey) -> Result<bool> {
    if key.thread.event_type != EventType::Voice {
        bail!("{key} is not a voice event");
    }
    remove_event(conn, key)
}

/// Delete a thread with its events, participants and room info. Returns
/// `false` if the thread did not exist.
///
/// # Errors
///
/// Returns an error if a delete fails.
pub fn remove_thread(conn: &Connection, key: &ThreadKey) -> Result<bool> {
    let table = key.event_type.event_family().table();
    conn.execute(
        &format!("DELETE FROM {table} WHERE account_id = ?1 AND thread_id = ?2"),
        params![key.account_id, key.thread_id],
    )
    .with_context(|| format!("remove events of {key}"))?;

    let removed = conn
        .execute(
            "DELETE FROM threads WHERE account_id = ?1 AND thread_id = ?2 AND type = ?3",
            params![key.account_id, key.thread_id, key.event_type.as_i64()],
        )
        .with_context(|| format!("remove thread {key}"))?;
    Ok(removed > 0)
}

fn require_thread(conn: &Connection, key: &ThreadKey) -> Result<()> {
    if !query::thread_exists(conn, key)? {
        bail!("thread {key} does not exist");
    }
    Ok(())
}

/// Replace the participant list of a room thread.
///
/// # Errors
///
/// Returns an error if the thread does not exist or a write fails.
pub fn update_room_participants(
    conn: &Connection,
    key: &ThreadKey,
    participants: &[Participant],
) -> Result<()> {
    require_thread(conn, key)?;
    conn.execute(
        "DELETE FROM thread_participants WHERE account_id = ?1 AND thread_id = ?2 AND type = ?3",
        params![key.account_id, key.thread_id, key.event_type.as_i64()],
    )
    .with_context(|| format!("clear participants of {key}"))?;
    insert_participants(conn, key, participants)
}

/// Set the roles of existing participants, by identifier. Unknown
/// identifiers are skipped. Returns the number of participants updated.
///
/// # Errors
///
/// Returns an error if the thread does not exist or a write fails.
pub fn update_room_participants_roles(
    conn: &Connection,
    key: &ThreadKey,
    roles: &[(String, Roles)],
) -> Result<usize> {
    require_thread(conn, key)?;
    let mut stmt = conn
        .prepare_cached(
            "UPDATE thread_participants SET roles = ?5 \
             WHERE account_id = ?1 AND thread_id = ?2 AND type = ?3 AND identifier = ?4",
        )
        .context("prepare update participant roles")?;

    let mut updated = 0;
    for (identifier, role) in roles {
        updated += stmt
            .execute(params![
                key.account_id,
                key.thread_id,
                key.event_type.as_i64(),
                identifier,
                to_i64(role.0),
            ])
            .with_context(|| format!("update roles of '{identifier}' in {key}"))?;
    }
    Ok(updated)
}

/// Upsert room metadata and mark the thread as a room.
///
/// # Errors
///
/// Returns an error if the thread does not exist or a write fails.
pub fn update_room_info(conn: &Connection, key: &ThreadKey, info: &RoomInfo) -> Result<()> {
    require_thread(conn, key)?;
    conn.execute(
        "INSERT INTO chat_room_info \
         (account_id, thread_id, type, room_name, subject, created_timestamp, self_roles, joined) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
         ON CONFLICT(account_id, thread_id, type) DO UPDATE SET \
         room_name = excluded.room_name, subject = excluded.subject, \
         created_timestamp = excluded.created_timestamp, \
         self_roles = excluded.self_roles, joined = excluded.joined",
        params![
            key.account_id,
            key.thread_id,
            key.event_type.as_i64(),
            info.room_name,
            info.subject,
            info.created_timestamp,
            to_i64(info.self_roles.0),
            info.joined,
        ],
    )
    .with_context(|| format!("update room info of {key}"))?;

    conn.execute(
        "UPDATE threads SET chat_type = ?4 WHERE account_id = ?1 AND thread_id = ?2 AND type = ?3",
        params![
            key.account_id,
            key.thread_id,
            key.event_type.as_i64(),
            ChatType::Room.as_i64()
        ],
    )
    .with_context(|| format!("mark {key} as room"))?;
    Ok(())
}

/// Clear the unread flag of every event in a thread. Text events also get
/// `read_timestamp` (microseconds) unless they already carry one. Returns
/// the number of events changed.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn mark_thread_as_read(
    conn: &Connection,
    key: &ThreadKey,
    read_timestamp: i64,
) -> Result<usize> {
    let changed = match key.event_type {
        EventType::Text => conn.execute(
            "UPDATE text_events SET new_event = 0, \
             read_timestamp = COALESCE(read_timestamp, ?3) \
             WHERE account_id = ?1 AND thread_id = ?2 AND new_event = 1",
            params![key.account_id, key.thread_id, read_timestamp],
        ),
        EventType::Voice => conn.execute(
            "UPDATE voice_events SET new_event = 0 \
             WHERE account_id = ?1 AND thread_id = ?2 AND new_event = 1",
            params![key.account_id, key.thread_id],
        ),
    }
    .with_context(|| format!("mark {key} as read"))?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::db::query::{get_single_event, get_single_thread};
    use crate::model::{Attachment, AttachmentStatus, ParticipantState};

    fn text(id: &str, ts: i64) -> TextEvent {
        TextEvent::new("acc", "t1", id, "+15550100", ts, format!("body {id}"))
    }

    fn write(conn: &Connection, event: &TextEvent) -> WriteOutcome {
        ensure_thread(conn, &Event::Text(event.clone())).expect("ensure thread");
        write_text_event(conn, event).expect("write text event")
    }

    fn thread_key() -> ThreadKey {
        ThreadKey::new(EventType::Text, "acc", "t1")
    }

    #[test]
    fn write_classifies_created_then_modified() {
        let conn = open_in_memory().expect("open store");
        assert_eq!(write(&conn, &text("e1", 1)), WriteOutcome::Created);
        let mut edited = text("e1", 1);
        edited.message = "edited".into();
        assert_eq!(write(&conn, &edited), WriteOutcome::Modified);

        let thread = get_single_thread(&conn, &thread_key()).expect("query").expect("thread");
        assert_eq!(thread.count, 1);
        assert_eq!(thread.last_event_text.as_deref(), Some("edited"));
    }

    #[test]
    fn self_sent_events_create_threads_without_participants() {
        let conn = open_in_memory().expect("open store");
        let event = TextEvent::new("acc", "t1", "e1", SELF_SENDER, 1, "hi");
        assert!(ensure_thread(&conn, &Event::Text(event.clone())).expect("ensure"));
        assert!(!ensure_thread(&conn, &Event::Text(event)).expect("ensure again"));
        let thread = get_single_thread(&conn, &thread_key()).expect("query").expect("thread");
        assert!(thread.participants.is_empty());
    }

    #[test]
    fn attachments_are_replaced_wholesale() {
        let conn = open_in_memory().expect("open store");
        let part = |id: &str| Attachment {
            attachment_id: id.into(),
            content_type: "image/png".into(),
            file_path: format!("/tmp/{id}.png"),
            status: AttachmentStatus::Downloaded,
        };

        write(&conn, &text("e1", 1).with_attachments(vec![part("a"), part("b")]));
        write(&conn, &text("e1", 1).with_attachments(vec![part("c")]));

        let key = EventKey::new(EventType::Text, "acc", "t1", "e1");
        let Some(Event::Text(stored)) = get_single_event(&conn, &key).expect("query event") else {
            panic!("expected stored text event");
        };
        let ids: Vec<&str> = stored.attachments.iter().map(|a| a.attachment_id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn removal_updates_counters_and_latest_event() {
        let conn = open_in_memory().expect("open store");
        write(&conn, &text("e1", 1));
        write(&conn, &text("e2", 2).unread());

        let key = EventKey::new(EventType::Text, "acc", "t1", "e2");
        assert!(remove_text_event(&conn, &key).expect("remove"));
        assert!(!remove_text_event(&conn, &key).expect("remove again"));
        assert!(remove_voice_event(&conn, &key).is_err());

        let thread = get_single_thread(&conn, &thread_key()).expect("query").expect("thread");
        assert_eq!((thread.count, thread.unread_count), (1, 0));
        assert_eq!(thread.last_event_id.as_deref(), Some("e1"));
    }

    #[test]
    fn remove_thread_cascades() {
        let conn = open_in_memory().expect("open store");
        write(&conn, &text("e1", 1));
        update_room_info(&conn, &thread_key(), &RoomInfo::default()).expect("room info");

        assert!(remove_thread(&conn, &thread_key()).expect("remove thread"));
        assert!(get_single_thread(&conn, &thread_key()).expect("query").is_none());
        let leftovers: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM text_events) + (SELECT COUNT(*) FROM thread_participants) \
                 + (SELECT COUNT(*) FROM chat_room_info)",
                [],
                |row| row.get(0),
            )
            .expect("count leftovers");
        assert_eq!(leftovers, 0);
        assert!(!remove_thread(&conn, &thread_key()).expect("remove missing thread"));
    }

    #[test]
    fn room_updates_replace_participants_and_roles() {
        let conn = open_in_memory().expect("open store");
        write(&conn, &text("e1", 1));

        let members = vec![
            Participant::new("acc", "alice").with_roles(Roles::MEMBER),
            Participant::new("acc", "bob").with_state(ParticipantState::RemotePending),
        ];
        update_room_participants(&conn, &thread_key(), &members).expect("participants");
        let updated = update_room_participants_roles(
            &conn,
            &thread_key(),
            &[("alice".into(), Roles::ADMIN), ("carol".into(), Roles::MEMBER)],
        )
        .expect("roles");
        assert_eq!(updated, 1);

        let info = RoomInfo {
            room_name: Some("book club".into()),
            joined: true,
            ..RoomInfo::default()
        };
        update_room_info(&conn, &thread_key(), &info).expect("room info");

        let thread = get_single_thread(&conn, &thread_key()).expect("query").expect("thread");
        assert!(thread.is_room());
        assert_eq!(thread.room, Some(info));
        assert_eq!(thread.participant_ids().collect::<Vec<_>>(), vec!["alice", "bob"]);
        assert_eq!(thread.participants[0].roles, Roles::ADMIN);
        assert_eq!(thread.participants[1].state, ParticipantState::RemotePending);

        let missing = ThreadKey::new(EventType::Text, "acc", "nope");
        assert!(update_room_info(&conn, &missing, &RoomInfo::default()).is_err());
    }

    #[test]
    fn mark_as_read_clears_unread_count() {
        let conn = open_in_memory().expect("open store");
        write(&conn, &text("e1", 1).unread());
        write(&conn, &text("e2", 2).unread());

        assert_eq!(mark_thread_as_read(&conn, &thread_key(), 99).expect("mark read"), 2);
        assert_eq!(mark_thread_as_read(&conn, &thread_key(), 100).expect("mark read again"), 0);

        let thread = get_single_thread(&conn, &thread_key()).expect("query").expect("thread");
        assert_eq!(thread.unread_count, 0);
        let key = EventKey::new(EventType::Text, "acc", "t1", "e1");
        let Some(Event::Text(event)) = get_single_event(&conn, &key).expect("query event") else {
            panic!("expected text event");
        };
        assert_eq!(event.read_timestamp, Some(99));
    }
}
