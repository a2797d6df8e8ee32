//! Change notifications fanned out to open views.
//!
//! Every committed mutation produces [`Notification`]s in a fixed order:
//! event changes before the thread changes they caused. The [`Hub`] keeps one
//! channel per subscriber and forwards only what the subscriber's scope
//! selects. Thread removals bypass the predicate: a view cannot evaluate a
//! predicate against a record that no longer exists.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::cache::ConversationIndex;
use crate::filter::Predicate;
use crate::model::{Event, EventType, Thread, ThreadKey};
use crate::sort::Sort;

/// A batch of changes of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum Notification {
    ThreadsAdded(Vec<Thread>),
    ThreadsModified(Vec<Thread>),
    ThreadsRemoved(Vec<Thread>),
    EventsAdded(Vec<Event>),
    EventsModified(Vec<Event>),
    EventsRemoved(Vec<Event>),
}

impl Notification {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::ThreadsAdded(t) | Self::ThreadsModified(t) | Self::ThreadsRemoved(t) => t.len(),
            Self::EventsAdded(e) | Self::EventsModified(e) | Self::EventsRemoved(e) => e.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ThreadsAdded(_) => "threads_added",
            Self::ThreadsModified(_) => "threads_modified",
            Self::ThreadsRemoved(_) => "threads_removed",
            Self::EventsAdded(_) => "events_added",
            Self::EventsModified(_) => "events_modified",
            Self::EventsRemoved(_) => "events_removed",
        }
    }
}

/// What a subscriber wants to hear about.
#[derive(Debug, Clone)]
pub(crate) enum Scope {
    /// Every notification, unfiltered.
    All,
    Threads {
        event_type: EventType,
        predicate: Option<Predicate>,
        sort: Sort,
        grouped: bool,
    },
    Events {
        event_type: EventType,
        predicate: Option<Predicate>,
    },
}

impl Scope {
    fn matches_thread(
        event_type: EventType,
        predicate: Option<&Predicate>,
        thread: &Thread,
    ) -> bool {
        thread.event_type == event_type
            && predicate.is_none_or(|p| p.matches(&thread.properties()))
    }

    fn matches_event(event_type: EventType, predicate: Option<&Predicate>, event: &Event) -> bool {
        event.event_type() == event_type && predicate.is_none_or(|p| p.matches(&event.properties()))
    }

    /// The part of `notification` this scope forwards, if any.
    fn select(
        &self,
        notification: &Notification,
        cache: &ConversationIndex,
    ) -> Option<Notification> {
        let selected = match (self, notification) {
            (Self::All, n) => n.clone(),
            (
                Self::Threads {
                    event_type,
                    predicate,
                    sort,
                    grouped,
                },
                Notification::ThreadsAdded(threads) | Notification::ThreadsModified(threads),
            ) => {
                let kept: Vec<Thread> = threads
                    .iter()
                    .filter(|t| Self::matches_thread(*event_type, predicate.as_ref(), t))
                    .cloned()
                    .collect();
                let kept = if *grouped {
                    representatives(kept, cache, sort, predicate.as_ref())
                } else {
                    kept
                };
                rewrap(notification, kept)
            }
            (
                Self::Threads { event_type, .. } | Self::Events { event_type, .. },
                Notification::ThreadsRemoved(threads),
            ) => Notification::ThreadsRemoved(
                threads
                    .iter()
                    .filter(|t| t.event_type == *event_type)
                    .cloned()
                    .collect(),
            ),
            (
                Self::Events {
                    event_type,
                    predicate,
                },
                Notification::EventsAdded(events) | Notification::EventsModified(events),
            ) => {
                let kept = events
                    .iter()
                    .filter(|e| Self::matches_event(*event_type, predicate.as_ref(), e))
                    .cloned()
                    .collect();
                match notification {
                    Notification::EventsAdded(_) => Notification::EventsAdded(kept),
                    _ => Notification::EventsModified(kept),
                }
            }
            (Self::Events { event_type, .. }, Notification::EventsRemoved(events)) => {
                Notification::EventsRemoved(
                    events
                        .iter()
                        .filter(|e| e.event_type() == *event_type)
                        .cloned()
                        .collect(),
                )
            }
            _ => return None,
        };
        (!selected.is_empty()).then_some(selected)
    }
}

fn rewrap(template: &Notification, threads: Vec<Thread>) -> Notification {
    match template {
        Notification::ThreadsAdded(_) => Notification::ThreadsAdded(threads),
        Notification::ThreadsRemoved(_) => Notification::ThreadsRemoved(threads),
        _ => Notification::ThreadsModified(threads),
    }
}

/// Replace each thread by the member its conversation shows in a view
/// sorted by `sort`, once per conversation. Threads the cache does not know
/// pass through unchanged.
fn representatives(
    threads: Vec<Thread>,
    cache: &ConversationIndex,
    sort: &Sort,
    predicate: Option<&Predicate>,
) -> Vec<Thread> {
    let mut seen: HashSet<ThreadKey> = HashSet::new();
    let mut out = Vec::with_capacity(threads.len());
    for thread in threads {
        let shown = cache
            .conversation_for(&thread.key())
            .ok()
            .and_then(|c| c.representative(sort, predicate))
            .cloned()
            .unwrap_or(thread);
        if seen.insert(shown.key()) {
            out.push(shown);
        }
    }
    out
}

struct Subscriber {
    scope: Scope,
    tx: Sender<Notification>,
    alive: Arc<AtomicBool>,
}

/// Fan-out point for notifications.
#[derive(Default)]
pub struct Hub {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl Hub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&self, scope: Scope) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let alive = Arc::new(AtomicBool::new(true));
        self.subscribers.lock().push(Subscriber {
            scope,
            tx,
            alive: Arc::clone(&alive),
        });
        Subscription { rx, alive }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver `notifications` in order to every live subscriber. Closed
    /// subscribers are dropped.
    pub fn publish(&self, notifications: &[Notification], cache: &ConversationIndex) {
        if notifications.is_empty() {
            return;
        }
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sub| {
            if !sub.alive.load(Ordering::Acquire) {
                return false;
            }
            for notification in notifications {
                if let Some(selected) = sub.scope.select(notification, cache)
                    && sub.tx.send(selected).is_err()
                {
                    return false;
                }
            }
            true
        });
        tracing::debug!(
            batches = notifications.len(),
            subscribers = subscribers.len(),
            "published notifications"
        );
    }
}

/// Receiving end of a hub subscription.
#[derive(Debug)]
pub struct Subscription {
    rx: Receiver<Notification>,
    alive: Arc<AtomicBool>,
}

impl Subscription {
    /// Everything delivered so far, without blocking.
    #[must_use]
    pub fn drain(&self) -> Vec<Notification> {
        if !self.is_open() {
            return Vec::new();
        }
        self.rx.try_iter().collect()
    }

    /// Wait up to `timeout` for the next notification.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Notification> {
        if !self.is_open() {
            return None;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(n) => Some(n),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Stop receiving. The hub forgets the subscriber on its next publish.
    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub(crate) fn alive_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}
