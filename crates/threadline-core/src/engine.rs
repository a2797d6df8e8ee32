//! The engine handle: one writer, one reader, the conversation cache and the
//! notification hub, driven together.
//!
//! Every mutation follows the same protocol:
//! 1. take the writer and open a batch
//! 2. apply each change, then re-read every affected thread
//! 3. commit, or roll back and return [`EngineError::Write`] on any failure
//! 4. update the cache, then publish notifications (events first)
//!
//! Nothing reaches the cache or subscribers for a batch that did not commit.
//!
//! Locks are always taken in the order reader → writer → cache.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::phone::PhoneMatcher;
use crate::cache::{Conversation, ConversationIndex};
use crate::config::{EngineConfig, STORE_FILE_NAME, load_engine_config};
use crate::db::query;
use crate::db::write::{self, WriteOutcome};
use crate::db::{Store, open_reader};
use crate::error::EngineError;
use crate::filter::{Predicate, compile};
use crate::model::{
    ChatType, Event, EventKey, EventType, Participant, RecordFamily, Roles, RoomInfo, Thread,
    ThreadKey,
};
use crate::notify::{Hub, Notification, Scope, Subscription};
use crate::readmark::ReadMarkQueue;
use crate::sort::Sort;
use crate::view::{EventView, ThreadView, ViewOptions};

/// Outcome counts of [`Engine::write_events`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub events_added: usize,
    pub events_modified: usize,
    pub threads_added: usize,
    pub threads_modified: usize,
}

/// Outcome counts of [`Engine::remove_events`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemoveReport {
    pub events_removed: usize,
    pub threads_modified: usize,
    pub threads_removed: usize,
}

/// Everything one committed batch changed.
#[derive(Debug, Default)]
struct Changes {
    events_added: Vec<Event>,
    events_modified: Vec<Event>,
    events_removed: Vec<Event>,
    threads_added: Vec<Thread>,
    threads_modified: Vec<Thread>,
    threads_removed: Vec<Thread>,
}

impl Changes {
    fn is_empty(&self) -> bool {
        self.events_added.is_empty()
            && self.events_modified.is_empty()
            && self.events_removed.is_empty()
            && self.threads_added.is_empty()
            && self.threads_modified.is_empty()
            && self.threads_removed.is_empty()
    }

    /// Event changes first, then the thread changes they caused.
    fn notifications(&self) -> Vec<Notification> {
        [
            Notification::EventsAdded(self.events_added.clone()),
            Notification::EventsModified(self.events_modified.clone()),
            Notification::EventsRemoved(self.events_removed.clone()),
            Notification::ThreadsAdded(self.threads_added.clone()),
            Notification::ThreadsModified(self.threads_modified.clone()),
            Notification::ThreadsRemoved(self.threads_removed.clone()),
        ]
        .into_iter()
        .filter(|n| !n.is_empty())
        .collect()
    }
}

/// Ordered set of thread keys touched by a batch.
#[derive(Default)]
struct Touched {
    seen: HashSet<ThreadKey>,
    order: Vec<ThreadKey>,
}

impl Touched {
    fn insert(&mut self, key: ThreadKey) {
        if self.seen.insert(key.clone()) {
            self.order.push(key);
        }
    }
}

/// Run `f` inside a batch on `store`: commit on success, roll back on any
/// error. A failed commit is rolled back too.
fn run_batch<T>(
    store: &mut Store,
    operation: &'static str,
    f: impl FnOnce(&Connection) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    store.begin_batch_operation()?;
    let result = f(store.conn()).and_then(|value| store.end_batch_operation().map(|()| value));
    if let Err(e) = &result {
        if let Err(rollback) = store.rollback_batch_operation() {
            warn!(operation, error = %format!("{rollback:#}"), "rollback failed");
        }
        warn!(operation, error = %format!("{e:#}"), "batch rolled back");
    }
    result
}

fn require_event_identity(event: &Event) -> anyhow::Result<()> {
    if event.account_id().is_empty() || event.thread_id().is_empty() || event.event_id().is_empty()
    {
        bail!(
            "event '{}/{}/{}' has an empty identity field",
            event.account_id(),
            event.thread_id(),
            event.event_id()
        );
    }
    Ok(())
}

fn reread_thread(conn: &Connection, key: &ThreadKey) -> anyhow::Result<Thread> {
    query::get_single_thread(conn, key)?.ok_or_else(|| anyhow!("thread {key} vanished mid-batch"))
}

fn validate_query(
    family: RecordFamily,
    sort: &Sort,
    predicate: Option<&Predicate>,
) -> Result<(), EngineError> {
    sort.validate(family)
        .map_err(|e| EngineError::InvalidSort(format!("{e:#}")))?;
    if let Some(predicate) = predicate {
        compile(predicate, family, "x", 1)
            .map_err(|e| EngineError::InvalidPredicate(format!("{e:#}")))?;
    }
    Ok(())
}

/// State shared by the engine handle and its views.
pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    path: PathBuf,
    writer: Mutex<Store>,
    pub(crate) reader: Mutex<Connection>,
    pub(crate) cache: RwLock<ConversationIndex>,
    pub(crate) hub: Hub,
    read_marks: Mutex<ReadMarkQueue>,
}

impl Shared {
    /// Reload the cache from committed state.
    pub(crate) fn rebuild_cache(&self) -> anyhow::Result<()> {
        let store = self.writer.lock();
        let mut threads = query::all_threads(store.conn(), EventType::Text)?;
        threads.extend(query::all_threads(store.conn(), EventType::Voice)?);
        let count = threads.len();

        let mut cache = self.cache.write();
        cache.rebuild(threads);
        info!(
            threads = count,
            conversations = cache.conversation_count(),
            "loaded conversation cache"
        );
        Ok(())
    }

    /// The conversation holding `thread`. A miss rebuilds the cache once;
    /// a thread still unknown after that is returned on its own.
    pub(crate) fn conversation_for(&self, thread: &Thread) -> anyhow::Result<Conversation> {
        let key = thread.key();
        if let Ok(conversation) = self.cache.read().conversation_for(&key) {
            return Ok(conversation.clone());
        }

        warn!(
            account_id = %key.account_id,
            thread_id = %key.thread_id,
            "conversation cache miss, rebuilding"
        );
        self.rebuild_cache()?;

        Ok(match self.cache.read().conversation_for(&key) {
            Ok(conversation) => conversation.clone(),
            Err(miss) => {
                debug!(%miss, "thread is not in the store anymore");
                Conversation::detached(thread.clone())
            }
        })
    }

    /// Fold committed changes into the cache and notify subscribers. Called
    /// with the writer still held so batches publish in commit order.
    fn apply(&self, changes: &Changes) {
        if changes.is_empty() {
            return;
        }
        let mut cache = self.cache.write();
        if cache.is_loaded() {
            cache.add_threads(
                changes
                    .threads_added
                    .iter()
                    .chain(&changes.threads_modified)
                    .cloned(),
            );
            for thread in &changes.threads_removed {
                cache.remove_thread(&thread.key());
            }
        }
        let cache = RwLockWriteGuard::downgrade(cache);
        self.hub.publish(&changes.notifications(), &cache);
    }

    fn flush_read_marks(&self) -> Result<usize, EngineError> {
        let marks = self.read_marks.lock().drain();
        if marks.is_empty() {
            return Ok(0);
        }

        let mut store = self.writer.lock();
        let result = run_batch(&mut store, "mark_threads_as_read", |conn| {
            let mut changes = Changes::default();
            for (key, read_timestamp) in &marks {
                if write::mark_thread_as_read(conn, key, *read_timestamp)? > 0
                    && let Some(thread) = query::get_single_thread(conn, key)?
                {
                    changes.threads_modified.push(thread);
                }
            }
            Ok(changes)
        });

        match result {
            Ok(changes) => {
                let marked = changes.threads_modified.len();
                self.apply(&changes);
                debug!(requested = marks.len(), marked, "flushed read marks");
                Ok(marked)
            }
            Err(e) => {
                self.read_marks.lock().requeue(marks);
                Err(EngineError::Write(e))
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Err(e) = self.flush_read_marks() {
            warn!(error = %e, "dropping unflushed read marks");
        }
    }
}

/// Handle to an open conversation store. Cheap to clone; clones share the
/// same connections, cache and subscribers.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Shared>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.inner.path)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Open the store at `<data_dir>/threadline.sqlite3` with the config in
    /// `<data_dir>/threadline.toml` (or defaults).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the config file is malformed and
    /// [`EngineError::Open`] if the store cannot be opened.
    pub fn open_dir(data_dir: &Path) -> Result<Self, EngineError> {
        let config = load_engine_config(data_dir).map_err(EngineError::Config)?;
        Self::open(&data_dir.join(STORE_FILE_NAME), config)
    }

    /// Open (or create) the store at `path` and warm the conversation cache.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the grouping sort is invalid and
    /// [`EngineError::Open`] if the store cannot be opened or loaded.
    pub fn open(path: &Path, config: EngineConfig) -> Result<Self, EngineError> {
        config
            .grouping
            .sort
            .validate(RecordFamily::Thread)
            .context("grouping.sort")
            .map_err(EngineError::Config)?;

        let open_error = |cause: anyhow::Error| EngineError::Open {
            path: path.to_path_buf(),
            cause,
        };
        let store = Store::open(path, config.busy_timeout()).map_err(open_error)?;
        let reader = open_reader(path, config.busy_timeout()).map_err(open_error)?;

        let cache = ConversationIndex::new(
            config.grouping.sort.clone(),
            config.grouping.enabled,
            PhoneMatcher::new(config.grouping.min_phone_match_digits),
        );

        let shared = Shared {
            config,
            path: path.to_path_buf(),
            writer: Mutex::new(store),
            reader: Mutex::new(reader),
            cache: RwLock::new(cache),
            hub: Hub::new(),
            read_marks: Mutex::new(ReadMarkQueue::new()),
        };
        shared.rebuild_cache().map_err(open_error)?;
        info!(path = %path.display(), "opened conversation store");

        Ok(Self {
            inner: Arc::new(shared),
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Upsert a batch of events atomically.
    ///
    /// Missing threads are created. After commit, subscribers see
    /// `EventsAdded`/`EventsModified`, then `ThreadsAdded` for threads the
    /// batch created and `ThreadsModified` for the other affected threads.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Write`] if any event fails; the whole batch is
    /// rolled back and nothing is published.
    pub fn write_events(&self, events: &[Event]) -> Result<WriteReport, EngineError> {
        if events.is_empty() {
            return Ok(WriteReport::default());
        }

        let mut store = self.inner.writer.lock();
        let changes = run_batch(&mut store, "write_events", |conn| {
            let mut changes = Changes::default();
            let mut created = HashSet::new();
            let mut touched = Touched::default();

            for event in events {
                require_event_identity(event)?;
                let key = event.thread_key();
                if write::ensure_thread(conn, event)? {
                    created.insert(key.clone());
                }
                match write::write_event(conn, event)? {
                    WriteOutcome::Created => changes.events_added.push(event.clone()),
                    WriteOutcome::Modified => changes.events_modified.push(event.clone()),
                }
                touched.insert(key);
            }

            for key in touched.order {
                let thread = reread_thread(conn, &key)?;
                if created.contains(&key) {
                    changes.threads_added.push(thread);
                } else if thread.count > 0 {
                    changes.threads_modified.push(thread);
                }
            }
            Ok(changes)
        })
        .map_err(EngineError::Write)?;

        self.inner.apply(&changes);
        let report = WriteReport {
            events_added: changes.events_added.len(),
            events_modified: changes.events_modified.len(),
            threads_added: changes.threads_added.len(),
            threads_modified: changes.threads_modified.len(),
        };
        info!(
            events = events.len(),
            added = report.events_added,
            modified = report.events_modified,
            threads_added = report.threads_added,
            "committed event batch"
        );
        Ok(report)
    }

    /// Delete events atomically. A thread left without events is deleted
    /// too and reported as removed; other affected threads as modified.
    /// Unknown keys are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Write`] if any delete fails; the whole batch
    /// is rolled back.
    pub fn remove_events(&self, keys: &[EventKey]) -> Result<RemoveReport, EngineError> {
        if keys.is_empty() {
            return Ok(RemoveReport::default());
        }

        let mut store = self.inner.writer.lock();
        let changes = run_batch(&mut store, "remove_events", |conn| {
            let mut changes = Changes::default();
            let mut touched = Touched::default();

            for key in keys {
                let Some(event) = query::get_single_event(conn, key)? else {
                    continue;
                };
                match key.thread.event_type {
                    EventType::Text => write::remove_text_event(conn, key)?,
                    EventType::Voice => write::remove_voice_event(conn, key)?,
                };
                changes.events_removed.push(event);
                touched.insert(key.thread.clone());
            }

            for key in touched.order {
                let Some(thread) = query::get_single_thread(conn, &key)? else {
                    continue;
                };
                if thread.count == 0 {
                    write::remove_thread(conn, &key)?;
                    changes.threads_removed.push(thread);
                } else {
                    changes.threads_modified.push(thread);
                }
            }
            Ok(changes)
        })
        .map_err(EngineError::Write)?;

        self.inner.apply(&changes);
        let report = RemoveReport {
            events_removed: changes.events_removed.len(),
            threads_modified: changes.threads_modified.len(),
            threads_removed: changes.threads_removed.len(),
        };
        info!(
            removed = report.events_removed,
            threads_removed = report.threads_removed,
            "committed event removal"
        );
        Ok(report)
    }

    /// Delete threads with all their events. Returns how many existed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Write`] if a delete fails; the batch is rolled
    /// back.
    pub fn remove_threads(&self, keys: &[ThreadKey]) -> Result<usize, EngineError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut store = self.inner.writer.lock();
        let changes = run_batch(&mut store, "remove_threads", |conn| {
            let mut changes = Changes::default();
            for key in keys {
                if let Some(thread) = query::get_single_thread(conn, key)? {
                    write::remove_thread(conn, key)?;
                    changes.threads_removed.push(thread);
                }
            }
            Ok(changes)
        })
        .map_err(EngineError::Write)?;

        self.inner.apply(&changes);
        info!(
            requested = keys.len(),
            removed = changes.threads_removed.len(),
            "committed thread removal"
        );
        Ok(changes.threads_removed.len())
    }

    /// The non-room thread of `account_id` whose participants match
    /// `identifiers` under phone-number rules, if any.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Read`] if the lookup fails.
    pub fn find_thread_for_participants(
        &self,
        event_type: EventType,
        account_id: &str,
        identifiers: &[String],
    ) -> Result<Option<Thread>, EngineError> {
        let conn = self.inner.reader.lock();
        query::find_thread_for_participants(
            &conn,
            event_type,
            account_id,
            identifiers,
            self.matcher(),
        )
        .map_err(EngineError::Read)
    }

    /// Find the thread for `identifiers` in `key`'s account, or create `key`
    /// with those participants. A created thread is published as added.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Write`] if creating the thread fails.
    pub fn thread_for_participants(
        &self,
        key: &ThreadKey,
        identifiers: &[String],
    ) -> Result<Thread, EngineError> {
        let mut store = self.inner.writer.lock();
        let matcher = self.matcher();
        let changes = run_batch(&mut store, "thread_for_participants", |conn| {
            let mut changes = Changes::default();
            if let Some(existing) = query::find_thread_for_participants(
                conn,
                key.event_type,
                &key.account_id,
                identifiers,
                matcher,
            )? {
                changes.threads_modified.push(existing);
                return Ok((changes, false));
            }

            let participants: Vec<Participant> = identifiers
                .iter()
                .map(|id| Participant::new(key.account_id.clone(), id.clone()))
                .collect();
            let chat_type = if participants.len() == 1 {
                ChatType::Contact
            } else {
                ChatType::None
            };
            write::create_thread(conn, key, chat_type, &participants)?;
            changes.threads_added.push(reread_thread(conn, key)?);
            Ok((changes, true))
        })
        .map_err(EngineError::Write)?;

        let (mut changes, created) = changes;
        if created {
            self.inner.apply(&changes);
            info!(
                account_id = %key.account_id,
                thread_id = %key.thread_id,
                "created thread for participants"
            );
            return changes.threads_added.pop().ok_or_else(|| {
                EngineError::Write(anyhow!("created thread {key} was not re-read"))
            });
        }
        changes
            .threads_modified
            .pop()
            .ok_or_else(|| EngineError::Write(anyhow!("matched thread for {key} was not kept")))
    }

    fn matcher(&self) -> PhoneMatcher {
        PhoneMatcher::new(self.inner.config.grouping.min_phone_match_digits)
    }

    fn update_thread(
        &self,
        operation: &'static str,
        key: &ThreadKey,
        f: impl FnOnce(&Connection) -> anyhow::Result<()>,
    ) -> Result<Thread, EngineError> {
        let mut store = self.inner.writer.lock();
        let changes = run_batch(&mut store, operation, |conn| {
            f(conn)?;
            Ok(Changes {
                threads_modified: vec![reread_thread(conn, key)?],
                ..Changes::default()
            })
        })
        .map_err(EngineError::Write)?;

        self.inner.apply(&changes);
        debug!(
            operation,
            account_id = %key.account_id,
            thread_id = %key.thread_id,
            "updated thread"
        );
        changes
            .threads_modified
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Write(anyhow!("{operation}: thread {key} was not re-read")))
    }

    /// Replace the participants of a room thread.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Write`] if the thread does not exist or the
    /// update fails.
    pub fn update_room_participants(
        &self,
        key: &ThreadKey,
        participants: &[Participant],
    ) -> Result<Thread, EngineError> {
        self.update_thread("update_room_participants", key, |conn| {
            write::update_room_participants(conn, key, participants)
        })
    }

    /// Set roles of room participants by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Write`] if the thread does not exist or the
    /// update fails.
    pub fn update_room_participants_roles(
        &self,
        key: &ThreadKey,
        roles: &[(String, Roles)],
    ) -> Result<Thread, EngineError> {
        self.update_thread("update_room_participants_roles", key, |conn| {
            write::update_room_participants_roles(conn, key, roles).map(|_| ())
        })
    }

    /// Upsert room metadata; the thread becomes a room thread.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Write`] if the thread does not exist or the
    /// update fails.
    pub fn update_room_info(
        &self,
        key: &ThreadKey,
        info: &RoomInfo,
    ) -> Result<Thread, EngineError> {
        self.update_thread("update_room_info", key, |conn| {
            write::update_room_info(conn, key, info)
        })
    }

    /// Queue threads to be marked read on the next [`Self::tick`].
    pub fn mark_threads_as_read(&self, keys: &[ThreadKey]) {
        let mut queue = self.inner.read_marks.lock();
        for key in keys {
            queue.enqueue(key.clone());
        }
    }

    #[must_use]
    pub fn pending_read_marks(&self) -> usize {
        self.inner.read_marks.lock().len()
    }

    /// Apply queued read marks in one batch. Returns the number of threads
    /// whose unread state changed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Write`] if the batch fails; the marks stay
    /// queued.
    pub fn tick(&self) -> Result<usize, EngineError> {
        self.inner.flush_read_marks()
    }

    /// Flush pending work and close this handle.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Write`] if queued read marks cannot be applied.
    pub fn shutdown(self) -> Result<(), EngineError> {
        self.inner.flush_read_marks()?;
        info!(path = %self.inner.path.display(), "engine shut down");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Read`] if the query fails.
    pub fn get_single_thread(&self, key: &ThreadKey) -> Result<Option<Thread>, EngineError> {
        let conn = self.inner.reader.lock();
        query::get_single_thread(&conn, key).map_err(EngineError::Read)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Read`] if the query fails.
    pub fn get_single_event(&self, key: &EventKey) -> Result<Option<Event>, EngineError> {
        let conn = self.inner.reader.lock();
        query::get_single_event(&conn, key).map_err(EngineError::Read)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::InvalidPredicate`] for an unknown property and
    /// [`EngineError::Read`] if the query fails.
    pub fn count_threads(
        &self,
        event_type: EventType,
        predicate: Option<&Predicate>,
    ) -> Result<u64, EngineError> {
        validate_query(RecordFamily::Thread, &Sort::default(), predicate)?;
        let conn = self.inner.reader.lock();
        query::count_threads(&conn, event_type, predicate).map_err(EngineError::Read)
    }

    /// Open a paginated, live view over threads.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSort`] or
    /// [`EngineError::InvalidPredicate`] if either names an unknown
    /// property.
    pub fn query_threads(
        &self,
        event_type: EventType,
        sort: Sort,
        predicate: Option<Predicate>,
        options: ViewOptions,
    ) -> Result<ThreadView, EngineError> {
        validate_query(RecordFamily::Thread, &sort, predicate.as_ref())?;
        let subscription = self.inner.hub.subscribe(Scope::Threads {
            event_type,
            predicate: predicate.clone(),
            sort: sort.clone(),
            grouped: options.grouped,
        });
        let page_size = options.page_size.unwrap_or(self.inner.config.page_size);
        debug!(%event_type, %sort, grouped = options.grouped, page_size, "opened thread view");
        Ok(ThreadView::new(
            Arc::clone(&self.inner),
            event_type,
            sort,
            predicate,
            options.grouped,
            page_size,
            subscription,
        ))
    }

    /// Open a paginated, live view over events.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSort`] or
    /// [`EngineError::InvalidPredicate`] if either names an unknown
    /// property.
    pub fn query_events(
        &self,
        event_type: EventType,
        sort: Sort,
        predicate: Option<Predicate>,
        options: ViewOptions,
    ) -> Result<EventView, EngineError> {
        validate_query(event_type.event_family(), &sort, predicate.as_ref())?;
        let subscription = self.inner.hub.subscribe(Scope::Events {
            event_type,
            predicate: predicate.clone(),
        });
        let page_size = options.page_size.unwrap_or(self.inner.config.page_size);
        debug!(%event_type, %sort, page_size, "opened event view");
        Ok(EventView::new(
            Arc::clone(&self.inner),
            event_type,
            sort,
            predicate,
            page_size,
            subscription,
        ))
    }

    /// The conversation holding `key`, or `None` if the thread does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Read`] if the store lookup or a cache rebuild
    /// fails.
    pub fn conversation(&self, key: &ThreadKey) -> Result<Option<Conversation>, EngineError> {
        if let Ok(conversation) = self.inner.cache.read().conversation_for(key) {
            return Ok(Some(conversation.clone()));
        }
        // Only a stored thread the cache lost is worth a rebuild.
        if self.get_single_thread(key)?.is_none() {
            return Ok(None);
        }
        self.inner.rebuild_cache().map_err(EngineError::Read)?;
        Ok(self.inner.cache.read().conversation_for(key).ok().cloned())
    }

    /// All conversations of `event_type`, ordered by displayed thread.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Read`] if the cache has to be reloaded and
    /// that fails.
    pub fn conversations(&self, event_type: EventType) -> Result<Vec<Conversation>, EngineError> {
        if !self.inner.cache.read().is_loaded() {
            self.inner.rebuild_cache().map_err(EngineError::Read)?;
        }
        Ok(self
            .inner
            .cache
            .read()
            .conversations(event_type)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Reload the conversation cache from the store.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Read`] if the scan fails.
    pub fn rebuild_cache(&self) -> Result<(), EngineError> {
        self.inner.rebuild_cache().map_err(EngineError::Read)
    }

    /// Receive every notification, unfiltered.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.inner.hub.subscribe(Scope::All)
    }
}
