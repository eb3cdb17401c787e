//! Process-local short-term append log per conversation.
//!
//! Fastest path, no network hop, lost on restart. Each entry remembers
//! whether it has been confirmed in the shared cache; FIFO eviction never
//! drops a turn whose only copy is still local.

use dashmap::DashMap;
use std::collections::VecDeque;

use crate::models::chat::ConversationTurn;

struct LogEntry {
    turn: ConversationTurn,
    flushed: bool,
}

#[derive(Default)]
struct TurnLog {
    entries: VecDeque<LogEntry>,
}

/// Bounded in-process turn log, keyed by conversation id.
pub struct ShortTermStore {
    logs: DashMap<String, TurnLog>,
    capacity: usize,
}

impl ShortTermStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            logs: DashMap::new(),
            capacity,
        }
    }

    /// Append a turn, initially unflushed.
    pub fn push(&self, conversation_id: &str, turn: ConversationTurn) {
        self.logs
            .entry(conversation_id.to_string())
            .or_default()
            .entries
            .push_back(LogEntry {
                turn,
                flushed: false,
            });
    }

    /// Replace the log with turns rehydrated from the shared cache.
    /// Rehydrated turns are flushed by definition.
    pub fn replay(&self, conversation_id: &str, turns: Vec<ConversationTurn>) {
        let mut log = TurnLog::default();
        for turn in turns.into_iter() {
            log.entries.push_back(LogEntry {
                turn,
                flushed: true,
            });
        }
        self.logs.insert(conversation_id.to_string(), log);
    }

    pub fn mark_flushed(&self, conversation_id: &str, turn_id: &str) {
        if let Some(mut log) = self.logs.get_mut(conversation_id)
            && let Some(entry) = log.entries.iter_mut().find(|e| e.turn.id == turn_id)
        {
            entry.flushed = true;
        }
    }

    /// Evict oldest-first down to capacity, skipping anything unflushed.
    /// The log may temporarily exceed capacity while the shared cache is down.
    pub fn evict_to_capacity(&self, conversation_id: &str) {
        if let Some(mut log) = self.logs.get_mut(conversation_id) {
            while log.entries.len() > self.capacity
                && log.entries.front().is_some_and(|e| e.flushed)
            {
                log.entries.pop_front();
            }
        }
    }

    pub fn turns(&self, conversation_id: &str) -> Vec<ConversationTurn> {
        self.logs
            .get(conversation_id)
            .map(|log| log.entries.iter().map(|e| e.turn.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self, conversation_id: &str) -> usize {
        self.logs
            .get(conversation_id)
            .map(|log| log.entries.len())
            .unwrap_or(0)
    }

    pub fn remove(&self, conversation_id: &str) {
        self.logs.remove(conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(text: &str) -> ConversationTurn {
        ConversationTurn::user(text)
    }

    #[test]
    fn test_push_and_read_in_order() {
        let store = ShortTermStore::new(5);
        store.push("c1", turn("one"));
        store.push("c1", turn("two"));

        let turns = store.turns("c1");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "one");
        assert_eq!(turns[1].content, "two");
    }

    #[test]
    fn test_fifo_eviction_of_flushed_turns() {
        let store = ShortTermStore::new(2);
        for text in ["one", "two", "three"] {
            let t = turn(text);
            let id = t.id.clone();
            store.push("c1", t);
            store.mark_flushed("c1", &id);
            store.evict_to_capacity("c1");
        }

        let turns = store.turns("c1");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "two");
        assert_eq!(turns[1].content, "three");
    }

    #[test]
    fn test_unflushed_turns_are_not_evicted() {
        let store = ShortTermStore::new(1);
        store.push("c1", turn("unflushed"));
        store.push("c1", turn("also unflushed"));
        store.evict_to_capacity("c1");

        // Over capacity, but nothing was safe to drop.
        assert_eq!(store.len("c1"), 2);
    }

    #[test]
    fn test_replay_marks_turns_flushed() {
        let store = ShortTermStore::new(2);
        store.replay("c1", vec![turn("a"), turn("b")]);
        store.push("c1", turn("c"));
        store.evict_to_capacity("c1");

        let turns = store.turns("c1");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "b");
        assert_eq!(turns[1].content, "c");
    }

    #[test]
    fn test_conversations_are_isolated() {
        let store = ShortTermStore::new(5);
        store.push("c1", turn("for c1"));
        store.push("c2", turn("for c2"));

        assert_eq!(store.turns("c1")[0].content, "for c1");
        assert_eq!(store.turns("c2")[0].content, "for c2");

        store.remove("c1");
        assert!(store.turns("c1").is_empty());
        assert_eq!(store.len("c2"), 1);
    }
}
