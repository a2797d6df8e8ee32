//! Paginated, live views over the store.
//!
//! A view remembers its sort, predicate and cursor. Each `next_page` call
//! reads the following window through the shared reader connection; updates
//! committed after the view opened arrive through its subscription. Once a
//! view is exhausted or destroyed, `next_page` returns empty pages.
//!
//! Grouped thread views page over conversations: rows whose conversation
//! already appeared are skipped, and each conversation is shown once through
//! its first member under the view's sort and predicate, together with all
//! member threads.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::db::query::{self, Page};
use crate::engine::Shared;
use crate::error::EngineError;
use crate::filter::Predicate;
use crate::model::{Event, EventType, Thread, ThreadKey};
use crate::notify::{Notification, Subscription};
use crate::sort::Sort;

/// Per-view options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewOptions {
    /// Collapse threads into conversations. Only meaningful for thread views.
    pub grouped: bool,
    /// Rows per page; `None` uses the configured default.
    pub page_size: Option<usize>,
}

impl ViewOptions {
    #[must_use]
    pub const fn grouped() -> Self {
        Self {
            grouped: true,
            page_size: None,
        }
    }

    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// One row of a thread view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadItem {
    /// The thread to show. In grouped views, the conversation's first member
    /// under the view's sort that satisfies its predicate.
    pub thread: Thread,
    /// Every thread of the conversation in view order, `thread` first. Empty
    /// in ungrouped views.
    pub members: Vec<Thread>,
}

/// Cloneable handle that destroys a view from another thread.
#[derive(Debug, Clone)]
pub struct DestroyHandle(Arc<AtomicBool>);

impl DestroyHandle {
    pub fn destroy(&self) {
        self.0.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        !self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
struct Cursor {
    offset: usize,
    exhausted: bool,
}

impl Cursor {
    /// Advance past a plain page of `rows` rows.
    const fn advance(&mut self, rows: usize, page_size: usize) {
        self.offset += rows;
        if rows < page_size {
            self.exhausted = true;
        }
    }
}

/// Live view over threads.
pub struct ThreadView {
    shared: Arc<Shared>,
    event_type: EventType,
    sort: Sort,
    predicate: Option<Predicate>,
    grouped: bool,
    page_size: usize,
    cursor: Cursor,
    seen: HashSet<ThreadKey>,
    subscription: Subscription,
}

impl std::fmt::Debug for ThreadView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadView")
            .field("event_type", &self.event_type)
            .field("sort", &self.sort)
            .field("predicate", &self.predicate)
            .field("grouped", &self.grouped)
            .field("page_size", &self.page_size)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl ThreadView {
    pub(crate) fn new(
        shared: Arc<Shared>,
        event_type: EventType,
        sort: Sort,
        predicate: Option<Predicate>,
        grouped: bool,
        page_size: usize,
        subscription: Subscription,
    ) -> Self {
        Self {
            shared,
            event_type,
            sort,
            predicate,
            grouped,
            page_size: page_size.max(1),
            cursor: Cursor::default(),
            seen: HashSet::new(),
            subscription,
        }
    }

    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    #[must_use]
    pub const fn is_grouped(&self) -> bool {
        self.grouped
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.cursor.exhausted
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        !self.subscription.is_open()
    }

    fn fetch(&self, offset: usize) -> Result<Vec<Thread>, EngineError> {
        let conn = self.shared.reader.lock();
        query::query_threads(
            &conn,
            self.event_type,
            &self.sort,
            self.predicate.as_ref(),
            Page::new(self.page_size, offset),
        )
        .map_err(EngineError::Read)
    }

    /// The next page of up to `page_size` rows.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Read`] if the store read fails. The cursor is
    /// left where it was.
    pub fn next_page(&mut self) -> Result<Vec<ThreadItem>, EngineError> {
        if self.is_destroyed() || self.cursor.exhausted {
            return Ok(Vec::new());
        }
        let items = if self.grouped {
            self.next_grouped_page()?
        } else {
            let rows = self.fetch(self.cursor.offset)?;
            if self.is_destroyed() {
                return Ok(Vec::new());
            }
            self.cursor.advance(rows.len(), self.page_size);
            rows.into_iter()
                .map(|thread| ThreadItem {
                    thread,
                    members: Vec::new(),
                })
                .collect()
        };
        debug!(
            event_type = %self.event_type,
            grouped = self.grouped,
            rows = items.len(),
            offset = self.cursor.offset,
            exhausted = self.cursor.exhausted,
            "thread view page"
        );
        Ok(items)
    }

    fn next_grouped_page(&mut self) -> Result<Vec<ThreadItem>, EngineError> {
        let mut items = Vec::new();
        let mut offset = self.cursor.offset;
        let mut seen = self.seen.clone();
        let mut exhausted = false;

        while items.len() < self.page_size && !exhausted {
            let rows = self.fetch(offset)?;
            if self.is_destroyed() {
                return Ok(Vec::new());
            }
            let fetched = rows.len();
            let mut consumed = 0;

            for thread in rows {
                if items.len() == self.page_size {
                    break;
                }
                consumed += 1;
                if seen.contains(&thread.key()) {
                    continue;
                }
                let conversation = self
                    .shared
                    .conversation_for(&thread)
                    .map_err(EngineError::Read)?;
                // Rows arrive in view order, so the first unseen member is
                // the conversation's representative for this view.
                let members = conversation.members_led_by(&thread.key(), &self.sort);
                seen.insert(thread.key());
                seen.extend(conversation.member_keys());
                items.push(ThreadItem { thread, members });
            }

            offset += consumed;
            exhausted = fetched < self.page_size && consumed == fetched;
        }

        self.cursor.offset = offset;
        self.cursor.exhausted = exhausted;
        self.seen = seen;
        Ok(items)
    }

    /// Notifications delivered since the last call, without blocking.
    #[must_use]
    pub fn poll_updates(&self) -> Vec<Notification> {
        self.subscription.drain()
    }

    /// Wait up to `timeout` for the next notification.
    #[must_use]
    pub fn wait_update(&self, timeout: Duration) -> Option<Notification> {
        self.subscription.recv_timeout(timeout)
    }

    /// Stop paging and receiving updates. Idempotent.
    pub fn destroy(&self) {
        self.subscription.close();
    }

    #[must_use]
    pub fn destroy_handle(&self) -> DestroyHandle {
        DestroyHandle(self.subscription.alive_flag())
    }
}

/// Live view over events.
pub struct EventView {
    shared: Arc<Shared>,
    event_type: EventType,
    sort: Sort,
    predicate: Option<Predicate>,
    page_size: usize,
    cursor: Cursor,
    subscription: Subscription,
}

impl std::fmt::Debug for EventView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventView")
            .field("event_type", &self.event_type)
            .field("sort", &self.sort)
            .field("predicate", &self.predicate)
            .field("page_size", &self.page_size)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl EventView {
    pub(crate) fn new(
        shared: Arc<Shared>,
        event_type: EventType,
        sort: Sort,
        predicate: Option<Predicate>,
        page_size: usize,
        subscription: Subscription,
    ) -> Self {
        Self {
            shared,
            event_type,
            sort,
            predicate,
            page_size: page_size.max(1),
            cursor: Cursor::default(),
            subscription,
        }
    }

    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.cursor.exhausted
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        !self.subscription.is_open()
    }

    /// The next page of up to `page_size` events.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Read`] if the store read fails.
    pub fn next_page(&mut self) -> Result<Vec<Event>, EngineError> {
        if self.is_destroyed() || self.cursor.exhausted {
            return Ok(Vec::new());
        }
        let events = {
            let conn = self.shared.reader.lock();
            query::query_events(
                &conn,
                self.event_type,
                &self.sort,
                self.predicate.as_ref(),
                Page::new(self.page_size, self.cursor.offset),
            )
            .map_err(EngineError::Read)?
        };
        if self.is_destroyed() {
            return Ok(Vec::new());
        }
        self.cursor.advance(events.len(), self.page_size);
        debug!(
            event_type = %self.event_type,
            rows = events.len(),
            offset = self.cursor.offset,
            exhausted = self.cursor.exhausted,
            "event view page"
        );
        Ok(events)
    }

    #[must_use]
    pub fn poll_updates(&self) -> Vec<Notification> {
        self.subscription.drain()
    }

    #[must_use]
    pub fn wait_update(&self, timeout: Duration) -> Option<Notification> {
        self.subscription.recv_timeout(timeout)
    }

    pub fn destroy(&self) {
        self.subscription.close();
    }

    #[must_use]
    pub fn destroy_handle(&self) -> DestroyHandle {
        DestroyHandle(self.subscription.alive_flag())
    }
}
