//! In-memory conversation grouping.
//!
//! A [`ConversationIndex`] merges threads that are "the same conversation"
//! into one [`Conversation`]: same identity, or (for text threads) the same
//! participants under phone-number matching. Each conversation shows one
//! displayed thread, the member listed first under the index's [`Sort`].
//!
//! The index never talks to the store. The engine feeds it threads after
//! each committed batch and rebuilds it from a full scan on warm-up or when
//! a lookup misses.

pub mod phone;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use thiserror::Error;

use crate::filter::Predicate;
use crate::model::{EventType, Thread, ThreadKey};
use crate::sort::Sort;
use phone::PhoneMatcher;

/// Arena id of a conversation. Ids are never reused within one index.
pub type ConversationId = u64;

/// A thread was looked up that the index does not hold.
///
/// Callers recover by rebuilding the index from the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("thread {0} is not in the conversation cache")]
pub struct CacheMiss(pub ThreadKey);

/// One or more threads shown as a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    id: ConversationId,
    event_type: EventType,
    /// Sorted by the index's sort; the first member is displayed.
    members: Vec<Thread>,
}

impl Conversation {
    /// A one-thread conversation outside any index, for threads the cache
    /// cannot place.
    pub(crate) fn detached(thread: Thread) -> Self {
        Self {
            id: ConversationId::MAX,
            event_type: thread.event_type,
            members: vec![thread],
        }
    }

    #[must_use]
    pub const fn id(&self) -> ConversationId {
        self.id
    }

    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    /// The member listed first under the active sort.
    #[must_use]
    pub fn displayed_thread(&self) -> &Thread {
        // Empty conversations are dropped by `relink`.
        &self.members[0]
    }

    #[must_use]
    pub fn members(&self) -> &[Thread] {
        &self.members
    }

    pub fn member_keys(&self) -> impl Iterator<Item = ThreadKey> + '_ {
        self.members.iter().map(Thread::key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The member a view sorted by `sort` shows for this conversation: the
    /// first member under `sort` that satisfies `predicate`.
    #[must_use]
    pub fn representative(&self, sort: &Sort, predicate: Option<&Predicate>) -> Option<&Thread> {
        self.members
            .iter()
            .filter(|t| predicate.is_none_or(|p| p.matches(&t.properties())))
            .min_by(|a, b| sort.compare_threads(a, b))
    }

    /// Members ordered by `sort`, with `first` moved to the front.
    #[must_use]
    pub fn members_led_by(&self, first: &ThreadKey, sort: &Sort) -> Vec<Thread> {
        let mut members = self.members.clone();
        members.sort_by(|a, b| sort.compare_threads(a, b));
        if let Some(pos) = members.iter().position(|m| m.key() == *first) {
            let lead = members.remove(pos);
            members.insert(0, lead);
        }
        members
    }

    /// Total unread events across members.
    #[must_use]
    pub fn unread_count(&self) -> u64 {
        self.members.iter().map(|t| t.unread_count).sum()
    }
}

/// Thread → conversation index.
#[derive(Debug, Clone)]
pub struct ConversationIndex {
    sort: Sort,
    grouping: bool,
    matcher: PhoneMatcher,
    next_id: ConversationId,
    loaded: bool,
    conversations: BTreeMap<ConversationId, Conversation>,
    by_thread: HashMap<ThreadKey, ConversationId>,
}

impl ConversationIndex {
    /// An empty, not yet loaded index. With `grouping` off every thread is
    /// its own conversation.
    #[must_use]
    pub fn new(sort: Sort, grouping: bool, matcher: PhoneMatcher) -> Self {
        Self {
            sort,
            grouping,
            matcher,
            next_id: 0,
            loaded: false,
            conversations: BTreeMap::new(),
            by_thread: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn sort(&self) -> &Sort {
        &self.sort
    }

    /// Whether the index reflects a full scan of the store.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Forget everything; the next lookup misses.
    pub fn invalidate(&mut self) {
        self.conversations.clear();
        self.by_thread.clear();
        self.loaded = false;
    }

    /// Replace the contents with `threads` and mark the index loaded.
    pub fn rebuild(&mut self, threads: impl IntoIterator<Item = Thread>) {
        self.invalidate();
        self.add_threads(threads);
        self.loaded = true;
        tracing::debug!(
            conversations = self.conversations.len(),
            threads = self.by_thread.len(),
            "rebuilt conversation cache"
        );
    }

    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.by_thread.len()
    }

    #[must_use]
    pub fn contains(&self, key: &ThreadKey) -> bool {
        self.by_thread.contains_key(key)
    }

    /// # Errors
    ///
    /// Returns [`CacheMiss`] if the thread is not indexed.
    pub fn conversation_for(&self, key: &ThreadKey) -> Result<&Conversation, CacheMiss> {
        self.by_thread
            .get(key)
            .and_then(|id| self.conversations.get(id))
            .ok_or_else(|| CacheMiss(key.clone()))
    }

    /// Conversations of `event_type`, ordered by their displayed threads.
    #[must_use]
    pub fn conversations(&self, event_type: EventType) -> Vec<&Conversation> {
        let mut out: Vec<&Conversation> = self
            .conversations
            .values()
            .filter(|c| c.event_type == event_type)
            .collect();
        out.sort_by(|a, b| {
            self.sort
                .compare_threads(a.displayed_thread(), b.displayed_thread())
        });
        out
    }

    /// Index `threads`, in order.
    pub fn add_threads(&mut self, threads: impl IntoIterator<Item = Thread>) {
        for thread in threads {
            self.add_thread(thread);
        }
    }

    /// Index one thread and return its conversation id.
    ///
    /// A known identity replaces its member, unless the thread can no longer
    /// be grouped and shares its conversation, in which case it moves to a
    /// conversation of its own. Otherwise a text thread joins
    /// the first conversation whose displayed thread has matching
    /// participants; room threads, threads without participants and voice
    /// threads always start a conversation of their own.
    pub fn add_thread(&mut self, thread: Thread) -> ConversationId {
        let key = thread.key();

        if let Some(&id) = self.by_thread.get(&key) {
            let alone = self.conversations.get(&id).is_some_and(|c| c.len() == 1);
            if alone || self.groups(&thread) {
                self.relink(id, |members| {
                    if let Some(slot) = members.iter_mut().find(|m| m.key() == key) {
                        *slot = thread;
                    }
                });
                return id;
            }
            // Became a room or lost its participants: leave the group.
            self.remove_thread(&key);
        }

        if let Some(id) = self.find_match(&thread) {
            tracing::debug!(
                account_id = %thread.account_id,
                thread_id = %thread.thread_id,
                conversation = id,
                "merged thread into conversation"
            );
            self.relink(id, |members| members.push(thread));
            return id;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.conversations.insert(
            id,
            Conversation {
                id,
                event_type: thread.event_type,
                members: Vec::new(),
            },
        );
        self.relink(id, |members| members.push(thread));
        id
    }

    /// Drop a thread. Returns `false` if it was not indexed.
    pub fn remove_thread(&mut self, key: &ThreadKey) -> bool {
        let Some(&id) = self.by_thread.get(key) else {
            return false;
        };
        self.relink(id, |members| members.retain(|m| m.key() != *key));
        true
    }

    fn groups(&self, thread: &Thread) -> bool {
        self.grouping
            && thread.event_type.groups_conversations()
            && !thread.is_room()
            && !thread.participants.is_empty()
    }

    fn find_match(&self, thread: &Thread) -> Option<ConversationId> {
        if !self.groups(thread) {
            return None;
        }
        let incoming: Vec<&str> = thread.participant_ids().collect();
        self.conversations
            .values()
            .filter(|c| c.event_type == thread.event_type)
            .find(|c| {
                let displayed = c.displayed_thread();
                self.groups(displayed) && {
                    let candidate: Vec<&str> = displayed.participant_ids().collect();
                    self.matcher.participants_match(&incoming, &candidate)
                }
            })
            .map(|c| c.id)
    }

    /// The one place membership changes: take the conversation out, apply
    /// `f` to its members, then re-sort and re-point every member, or drop
    /// the conversation if it is now empty.
    fn relink(&mut self, id: ConversationId, f: impl FnOnce(&mut Vec<Thread>)) {
        let Some(mut conversation) = self.conversations.remove(&id) else {
            return;
        };
        for member in &conversation.members {
            self.by_thread.remove(&member.key());
        }

        f(&mut conversation.members);

        if conversation.members.is_empty() {
            tracing::debug!(conversation = id, "dropped empty conversation");
            return;
        }

        let sort = &self.sort;
        conversation
            .members
            .sort_by(|a, b| sort.compare_threads(a, b));
        for member in &conversation.members {
            self.by_thread.insert(member.key(), id);
        }
        self.conversations.insert(id, conversation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChatType, Participant};

    fn thread(id: &str, participants: &[&str], last: i64) -> Thread {
        let mut t = Thread::new(EventType::Text, "acc", id);
        t.participants = participants
            .iter()
            .map(|p| Participant::new("acc", *p))
            .collect();
        t.count = 1;
        t.last_event_timestamp = Some(last);
        t
    }

    fn index() -> ConversationIndex {
        ConversationIndex::new(Sort::default(), true, PhoneMatcher::default())
    }

    #[test]
    fn phone_variants_group_into_one_conversation() {
        let mut cache = index();
        cache.add_threads([
            thread("t1", &["+1-555-0100"], 10),
            thread("t2", &["5550100"], 20),
        ]);

        assert_eq!(cache.conversation_count(), 1);
        let conv = cache
            .conversation_for(&ThreadKey::new(EventType::Text, "acc", "t1"))
            .expect("indexed");
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.displayed_thread().thread_id, "t2");
    }

    #[test]
    fn replacing_a_member_recomputes_displayed_thread() {
        let mut cache = index();
        cache.add_threads([thread("t1", &["5550100"], 10), thread("t2", &["5550100"], 20)]);
        cache.add_thread(thread("t1", &["5550100"], 30));

        let conv = cache
            .conversation_for(&ThreadKey::new(EventType::Text, "acc", "t2"))
            .expect("indexed");
        assert_eq!(conv.displayed_thread().thread_id, "t1");
        assert_eq!(cache.thread_count(), 2);
    }

    #[test]
    fn removing_the_displayed_thread_promotes_the_next() {
        let mut cache = index();
        cache.add_threads([thread("t1", &["5550100"], 10), thread("t2", &["5550100"], 20)]);

        assert!(cache.remove_thread(&ThreadKey::new(EventType::Text, "acc", "t2")));
        let conv = cache
            .conversation_for(&ThreadKey::new(EventType::Text, "acc", "t1"))
            .expect("indexed");
        assert_eq!(conv.displayed_thread().thread_id, "t1");

        assert!(cache.remove_thread(&ThreadKey::new(EventType::Text, "acc", "t1")));
        assert_eq!(cache.conversation_count(), 0);
        assert!(!cache.remove_thread(&ThreadKey::new(EventType::Text, "acc", "t1")));
    }

    #[test]
    fn rooms_voice_and_empty_threads_stay_alone() {
        let mut cache = index();
        let mut room = thread("room", &["5550100"], 1);
        room.chat_type = ChatType::Room;
        let mut call = thread("call", &["5550100"], 2);
        call.event_type = EventType::Voice;
        let mut call2 = thread("call2", &["5550100"], 3);
        call2.event_type = EventType::Voice;

        cache.add_threads([
            thread("t1", &["5550100"], 4),
            room,
            call,
            call2,
            thread("e1", &[], 5),
            thread("e2", &[], 6),
        ]);
        assert_eq!(cache.conversation_count(), 6);
        assert_eq!(cache.conversations(EventType::Voice).len(), 2);
    }

    #[test]
    fn thread_turning_into_a_room_leaves_its_group() {
        let mut cache = index();
        cache.add_threads([thread("t1", &["5550100"], 10), thread("t2", &["5550100"], 20)]);
        assert_eq!(cache.conversation_count(), 1);

        let mut room = thread("t1", &["5550100"], 10);
        room.chat_type = ChatType::Room;
        cache.add_thread(room);
        assert_eq!(cache.conversation_count(), 2);
        let conv = cache
            .conversation_for(&ThreadKey::new(EventType::Text, "acc", "t1"))
            .expect("indexed");
        assert_eq!(conv.len(), 1);
        assert!(conv.displayed_thread().is_room());
    }

    #[test]
    fn grouping_disabled_keeps_singletons() {
        let mut cache = ConversationIndex::new(Sort::default(), false, PhoneMatcher::default());
        cache.add_threads([thread("t1", &["5550100"], 1), thread("t2", &["5550100"], 2)]);
        assert_eq!(cache.conversation_count(), 2);
    }

    #[test]
    fn different_cardinality_does_not_group() {
        let mut cache = index();
        cache.add_threads([
            thread("t1", &["5550100"], 1),
            thread("t2", &["5550100", "5550199"], 2),
        ]);
        assert_eq!(cache.conversation_count(), 2);
    }

    #[test]
    fn lookups_miss_until_indexed() {
        let mut cache = index();
        let key = ThreadKey::new(EventType::Text, "acc", "t1");
        assert_eq!(cache.conversation_for(&key), Err(CacheMiss(key.clone())));
        assert!(!cache.is_loaded());

        cache.rebuild([thread("t1", &["5550100"], 1)]);
        assert!(cache.is_loaded());
        assert!(cache.conversation_for(&key).is_ok());

        cache.invalidate();
        assert!(cache.conversation_for(&key).is_err());
    }

    #[test]
    fn conversations_are_listed_in_sort_order() {
        let mut cache = index();
        cache.add_threads([
            thread("old", &["111111111"], 1),
            thread("new", &["222222222"], 9),
            thread("mid", &["333333333"], 5),
        ]);
        let order: Vec<&str> = cache
            .conversations(EventType::Text)
            .into_iter()
            .map(|c| c.displayed_thread().thread_id.as_str())
            .collect();
        assert_eq!(order, vec!["new", "mid", "old"]);
    }
}
