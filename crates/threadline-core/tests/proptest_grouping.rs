use std::cmp::Ordering;
use std::collections::HashSet;

use proptest::prelude::*;
use threadline_core::cache::ConversationIndex;
use threadline_core::cache::phone::PhoneMatcher;
use threadline_core::{
    Engine, Event, EventType, Participant, Sort, TextEvent, Thread, ThreadKey, ViewOptions,
};

const IDENTIFIERS: &[&str] = &[
    "+15550100",
    "5550100",
    "555-0100",
    "+15550199",
    "alice@example.org",
    "Alice@Example.org",
    "+442071838750",
];

fn arb_thread(index: usize) -> impl Strategy<Value = Thread> {
    (
        prop::collection::vec(0..IDENTIFIERS.len(), 0..3),
        0i64..1_000,
        any::<bool>(),
    )
        .prop_map(move |(ids, ts, voice)| {
            let event_type = if voice {
                EventType::Voice
            } else {
                EventType::Text
            };
            let mut thread = Thread::new(event_type, "acc", format!("t{index}"));
            thread.count = 1;
            thread.last_event_timestamp = Some(ts);
            thread.participants = ids
                .into_iter()
                .map(|i| Participant::new("acc", IDENTIFIERS[i]))
                .collect();
            thread
        })
}

fn arb_threads() -> impl Strategy<Value = Vec<Thread>> {
    (1usize..24).prop_flat_map(|n| (0..n).map(arb_thread).collect::<Vec<_>>())
}

fn index_of(threads: &[Thread]) -> ConversationIndex {
    let mut index = ConversationIndex::new(Sort::default(), true, PhoneMatcher::default());
    index.rebuild(threads.iter().cloned());
    index
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    #[test]
    fn every_thread_lands_in_exactly_one_conversation(threads in arb_threads()) {
        let index = index_of(&threads);
        prop_assert_eq!(index.thread_count(), threads.len());

        let mut seen = HashSet::new();
        for event_type in [EventType::Text, EventType::Voice] {
            for conversation in index.conversations(event_type) {
                prop_assert!(!conversation.is_empty());
                for key in conversation.member_keys() {
                    prop_assert!(seen.insert(key));
                }
            }
        }
        prop_assert_eq!(seen.len(), threads.len());
    }

    #[test]
    fn displayed_thread_sorts_first(threads in arb_threads()) {
        let index = index_of(&threads);
        let sort = Sort::default();
        for event_type in [EventType::Text, EventType::Voice] {
            for conversation in index.conversations(event_type) {
                let members = conversation.members();
                prop_assert_eq!(conversation.displayed_thread(), &members[0]);
                for pair in members.windows(2) {
                    prop_assert_ne!(sort.compare_threads(&pair[0], &pair[1]), Ordering::Greater);
                }
            }
        }
    }

    #[test]
    fn only_plain_text_threads_share_conversations(threads in arb_threads()) {
        let index = index_of(&threads);
        for conversation in index.conversations(EventType::Voice) {
            prop_assert_eq!(conversation.len(), 1);
        }
        for conversation in index.conversations(EventType::Text) {
            if conversation.len() > 1 {
                prop_assert!(conversation.members().iter().all(|t| !t.participants.is_empty()));
            }
        }
    }

    #[test]
    fn re_adding_known_threads_is_idempotent(threads in arb_threads()) {
        let mut index = index_of(&threads);
        let before: Vec<Vec<ThreadKey>> = index
            .conversations(EventType::Text)
            .iter()
            .map(|c| c.member_keys().collect())
            .collect();

        index.add_threads(threads.iter().cloned());
        let after: Vec<Vec<ThreadKey>> = index
            .conversations(EventType::Text)
            .iter()
            .map(|c| c.member_keys().collect())
            .collect();
        prop_assert_eq!(before, after);
        prop_assert_eq!(index.thread_count(), threads.len());
    }

    #[test]
    fn participant_lists_of_different_sizes_never_match(
        incoming in prop::collection::vec(0..IDENTIFIERS.len(), 0..4),
        candidate in prop::collection::vec(0..IDENTIFIERS.len(), 0..4),
    ) {
        let incoming: Vec<&str> = incoming.into_iter().map(|i| IDENTIFIERS[i]).collect();
        let candidate: Vec<&str> = candidate.into_iter().map(|i| IDENTIFIERS[i]).collect();
        let matcher = PhoneMatcher::default();
        if incoming.len() != candidate.len() {
            prop_assert!(!matcher.participants_match(&incoming, &candidate));
        }
        prop_assert_eq!(
            matcher.participants_match(&incoming, &candidate),
            matcher.participants_match(&candidate, &incoming)
        );
    }

    #[test]
    fn removing_every_thread_empties_the_index(threads in arb_threads()) {
        let mut index = index_of(&threads);
        for thread in &threads {
            prop_assert!(index.remove_thread(&thread.key()));
        }
        prop_assert_eq!(index.thread_count(), 0);
        prop_assert_eq!(index.conversation_count(), 0);
    }
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(24))]

    #[test]
    fn paging_visits_every_thread_once(thread_count in 0usize..30, page_size in 1usize..8) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let engine = Engine::open_dir(dir.path()).expect("open engine");
        let events: Vec<Event> = (0..thread_count)
            .map(|i| {
                let ts = i64::try_from(i % 5).expect("small index");
                let sender = format!("user{i}@example.org");
                TextEvent::new("acc", format!("t{i}"), "e1", sender, ts, "hi").into()
            })
            .collect();
        engine.write_events(&events).expect("write");

        let mut view = engine
            .query_threads(
                EventType::Text,
                Sort::default(),
                None,
                ViewOptions::default().with_page_size(page_size),
            )
            .expect("view");

        let mut seen = HashSet::new();
        let mut pages = 0;
        loop {
            let page = view.next_page().expect("page");
            prop_assert!(page.len() <= page_size);
            if page.is_empty() {
                break;
            }
            pages += 1;
            for item in page {
                prop_assert!(seen.insert(item.thread.key()));
            }
        }
        prop_assert_eq!(seen.len(), thread_count);
        prop_assert!(view.is_exhausted());
        prop_assert!(pages <= thread_count / page_size + 1);
    }
}
