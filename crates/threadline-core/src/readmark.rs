//! Coalescing queue for mark-as-read requests.
//!
//! Requests are cheap to enqueue from any thread and are applied to the
//! store in one batch by [`crate::Engine::tick`] or on shutdown. Marking
//! the same thread twice before a flush keeps the later timestamp.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::model::ThreadKey;

#[derive(Debug, Default)]
pub struct ReadMarkQueue {
    pending: BTreeMap<ThreadKey, i64>,
}

impl ReadMarkQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `key` with the current time.
    pub fn enqueue(&mut self, key: ThreadKey) {
        self.enqueue_at(key, Utc::now().timestamp_micros());
    }

    /// Queue `key` with an explicit read time in microseconds.
    pub fn enqueue_at(&mut self, key: ThreadKey, read_timestamp: i64) {
        self.pending
            .entry(key)
            .and_modify(|ts| *ts = (*ts).max(read_timestamp))
            .or_insert(read_timestamp);
    }

    /// Take every pending request, in thread-key order.
    pub fn drain(&mut self) -> Vec<(ThreadKey, i64)> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// Put requests back after a failed flush. Newer requests win.
    pub fn requeue(&mut self, marks: Vec<(ThreadKey, i64)>) {
        for (key, ts) in marks {
            self.enqueue_at(key, ts);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventType;

    fn key(id: &str) -> ThreadKey {
        ThreadKey::new(EventType::Text, "acc", id)
    }

    #[test]
    fn repeated_marks_coalesce_to_latest() {
        let mut queue = ReadMarkQueue::new();
        queue.enqueue_at(key("t1"), 10);
        queue.enqueue_at(key("t1"), 5);
        queue.enqueue_at(key("t2"), 7);
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained, vec![(key("t1"), 10), (key("t2"), 7)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn requeue_keeps_newer_requests() {
        let mut queue = ReadMarkQueue::new();
        queue.enqueue_at(key("t1"), 20);
        queue.requeue(vec![(key("t1"), 10), (key("t2"), 3)]);
        assert_eq!(queue.drain(), vec![(key("t1"), 20), (key("t2"), 3)]);
    }

    #[test]
    fn enqueue_uses_wall_clock_micros() {
        let before = Utc::now().timestamp_micros();
        let mut queue = ReadMarkQueue::new();
        queue.enqueue(key("t1"));
        let (_, ts) = queue.drain().pop().expect("one mark");
        assert!(ts >= before);
    }
}
