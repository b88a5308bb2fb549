//! Short-term memory: per-session bounded ring buffers of conversation turns.
//!
//! Nothing here is durable. A turn survives only until it is evicted (buffer
//! full or too old) or promoted into long-term memory by consolidation.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::types::ConversationTurn;
use crate::config::ConsolidationConfig;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    user_id: String,
    session_id: String,
}

#[derive(Debug, Default)]
struct SessionBuffer {
    turns: VecDeque<ConversationTurn>,
    /// Turns pushed since the last consolidation of this session.
    pending: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushOutcome {
    /// Turns dropped to make room or for age.
    pub evicted: Vec<ConversationTurn>,
    pub session_len: usize,
    /// The session has accumulated enough new turns to consolidate.
    pub consolidation_due: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StmOccupancy {
    pub sessions: usize,
    pub turns: usize,
    /// Per-session turn capacity.
    pub capacity_per_session: usize,
}

#[derive(Debug)]
pub struct ShortTermMemory {
    sessions: Mutex<HashMap<SessionKey, SessionBuffer>>,
    max_turns: usize,
    max_age_secs: i64,
    consolidate_every: usize,
}

impl ShortTermMemory {
    pub fn new(max_turns: usize, max_age_secs: i64, consolidate_every: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_turns: max_turns.max(1),
            max_age_secs,
            consolidate_every,
        }
    }

    pub fn from_config(config: &ConsolidationConfig) -> Self {
        Self::new(
            config.stm_max_turns,
            config.stm_max_age_secs,
            config.auto_consolidate_every,
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionKey, SessionBuffer>> {
        // A panic mid-push leaves at worst a partially trimmed buffer.
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Append a turn, evicting the oldest turns beyond capacity and any older
    /// than `max_age_secs` relative to this turn's timestamp. Other sessions
    /// are aged against the same clock, and sessions left empty are dropped.
    pub fn push(&self, turn: ConversationTurn) -> PushOutcome {
        let key = SessionKey {
            user_id: turn.user_id.clone(),
            session_id: turn.session_id.clone(),
        };
        let now = turn.timestamp;
        let cutoff = now.saturating_sub(self.max_age_secs);

        let mut sessions = self.lock();
        let pruned = self.prune_locked(&mut sessions, now, Some(&key));
        if pruned > 0 {
            tracing::debug!(pruned, "aged out turns from idle sessions");
        }
        let buffer = sessions.entry(key).or_default();
        buffer.turns.push_back(turn);
        buffer.pending += 1;

        let mut evicted = Vec::new();
        while buffer.turns.len() > self.max_turns {
            if let Some(old) = buffer.turns.pop_front() {
                evicted.push(old);
            }
        }
        if self.max_age_secs > 0 {
            while buffer.turns.front().is_some_and(|t| t.timestamp < cutoff) {
                if let Some(old) = buffer.turns.pop_front() {
                    evicted.push(old);
                }
            }
        }
        buffer.pending = buffer.pending.min(buffer.turns.len());

        PushOutcome {
            evicted,
            session_len: buffer.turns.len(),
            consolidation_due: self.consolidate_every > 0 && buffer.pending >= self.consolidate_every,
        }
    }

    /// Snapshot of a session's turns, oldest first.
    pub fn session(&self, user_id: &str, session_id: &str) -> Vec<ConversationTurn> {
        let key = SessionKey {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        };
        self.lock()
            .get(&key)
            .map(|b| b.turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The turns pushed since the last [`mark_consolidated`](Self::mark_consolidated).
    pub fn pending_turns(&self, user_id: &str, session_id: &str) -> Vec<ConversationTurn> {
        let key = SessionKey {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        };
        self.lock()
            .get(&key)
            .map(|b| {
                let skip = b.turns.len() - b.pending;
                b.turns.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Clear pending status for the `window` oldest pending turns. Turns pushed
    /// after the window was read stay pending.
    pub fn mark_consolidated(&self, user_id: &str, session_id: &str, window: usize) {
        let key = SessionKey {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        };
        if let Some(buffer) = self.lock().get_mut(&key) {
            buffer.pending = buffer.pending.saturating_sub(window);
        }
    }

    /// Drop turns older than `max_age_secs` before `now` from every session
    /// and forget sessions left empty. Returns the number of turns removed.
    pub fn prune_expired(&self, now: i64) -> usize {
        let mut sessions = self.lock();
        self.prune_locked(&mut sessions, now, None)
    }

    fn prune_locked(
        &self,
        sessions: &mut HashMap<SessionKey, SessionBuffer>,
        now: i64,
        keep: Option<&SessionKey>,
    ) -> usize {
        if self.max_age_secs <= 0 {
            return 0;
        }
        let cutoff = now.saturating_sub(self.max_age_secs);
        let mut removed = 0;
        sessions.retain(|key, buffer| {
            let before = buffer.turns.len();
            while buffer.turns.front().is_some_and(|t| t.timestamp < cutoff) {
                buffer.turns.pop_front();
            }
            removed += before - buffer.turns.len();
            buffer.pending = buffer.pending.min(buffer.turns.len());
            !buffer.turns.is_empty() || keep == Some(key)
        });
        removed
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn occupancy(&self) -> StmOccupancy {
        let sessions = self.lock();
        StmOccupancy {
            sessions: sessions.len(),
            turns: sessions.values().map(|b| b.turns.len()).sum(),
            capacity_per_session: self.max_turns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::Role;

    fn turn(session: &str, content: &str, ts: i64) -> ConversationTurn {
        ConversationTurn {
            user_id: "u1".into(),
            session_id: session.into(),
            role: Role::User,
            content: content.into(),
            timestamp: ts,
        }
    }

    #[test]
    fn ring_buffer_drops_oldest() {
        let stm = ShortTermMemory::new(3, 0, 0);
        for i in 0..5 {
            stm.push(turn("s", &format!("m{i}"), i));
        }
        let contents: Vec<String> = stm.session("u1", "s").into_iter().map(|t| t.content).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn push_reports_evictions() {
        let stm = ShortTermMemory::new(1, 0, 0);
        stm.push(turn("s", "first", 0));
        let outcome = stm.push(turn("s", "second", 1));
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.evicted[0].content, "first");
        assert_eq!(outcome.session_len, 1);
    }

    #[test]
    fn old_turns_age_out() {
        let stm = ShortTermMemory::new(10, 100, 0);
        stm.push(turn("s", "ancient", 0));
        stm.push(turn("s", "recent", 50));
        let outcome = stm.push(turn("s", "now", 150));
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.session_len, 2);
    }

    #[test]
    fn sessions_are_isolated() {
        let stm = ShortTermMemory::new(10, 0, 0);
        stm.push(turn("a", "x", 0));
        stm.push(turn("b", "y", 0));
        stm.push(turn("b", "z", 0));
        let occ = stm.occupancy();
        assert_eq!(occ.sessions, 2);
        assert_eq!(occ.turns, 3);
        assert_eq!(stm.session("u1", "b").len(), 2);
        assert_eq!(stm.session("u1", "a").len(), 1);
        assert!(stm.session("u2", "b").is_empty());
    }

    #[test]
    fn consolidation_becomes_due_every_n_turns() {
        let stm = ShortTermMemory::new(100, 0, 3);
        assert!(!stm.push(turn("s", "1", 0)).consolidation_due);
        assert!(!stm.push(turn("s", "2", 0)).consolidation_due);
        assert!(stm.push(turn("s", "3", 0)).consolidation_due);
        assert_eq!(stm.pending_turns("u1", "s").len(), 3);

        stm.mark_consolidated("u1", "s", 3);
        assert!(stm.pending_turns("u1", "s").is_empty());
        assert!(!stm.push(turn("s", "4", 0)).consolidation_due);
        assert_eq!(stm.session("u1", "s").len(), 4);
    }

    #[test]
    fn turns_pushed_during_consolidation_stay_pending() {
        let stm = ShortTermMemory::new(100, 0, 3);
        for i in 0..3 {
            stm.push(turn("s", &format!("t{i}"), i));
        }
        let window = stm.pending_turns("u1", "s");
        // Arrives while the window is being consolidated.
        stm.push(turn("s", "late", 3));

        stm.mark_consolidated("u1", "s", window.len());
        let pending: Vec<String> = stm.pending_turns("u1", "s").into_iter().map(|t| t.content).collect();
        assert_eq!(pending, vec!["late"]);
    }

    #[test]
    fn idle_sessions_age_out_on_any_push() {
        let stm = ShortTermMemory::new(10, 60, 0);
        for i in 0..1000 {
            stm.push(turn(&format!("s{i}"), "hello", i));
        }
        // Only sessions inside the last 60 seconds survive each push.
        assert_eq!(stm.occupancy().sessions, 61);

        stm.push(turn("fresh", "hi", 1_000_000));
        let occ = stm.occupancy();
        assert_eq!(occ.sessions, 1);
        assert_eq!(occ.turns, 1);
    }

    #[test]
    fn prune_expired_drops_stale_sessions_without_a_push() {
        let stm = ShortTermMemory::new(10, 60, 0);
        stm.push(turn("old", "a", 0));
        stm.push(turn("mixed", "b", 50));
        stm.push(turn("mixed", "c", 55));
        assert_eq!(stm.occupancy().turns, 3);

        assert_eq!(stm.prune_expired(112), 2);
        let occ = stm.occupancy();
        assert_eq!(occ.sessions, 1);
        assert_eq!(stm.session("u1", "mixed").len(), 1);
        assert_eq!(stm.prune_expired(120), 0);
    }
}
