mod conversation;
pub mod export;
mod player;
mod topic;
pub mod turn;

pub use topic::TopicSummary;
pub use turn::{TurnAccumulator, TurnHandle, TurnRequest};

use crate::config::GameConfig;
use crate::error::{GameError, GameResult};
use crate::judge::NearMatchJudge;
use crate::llm::{LlmConfig, LlmManager};
use crate::round::RoundMachine;
use crate::types::*;
use crate::words::WordSource;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::RwLock;

/// All persisted records.
///
/// Kept behind a single lock so a turn commit (bot message, round state,
/// player stats, prompt log) is published in one write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameStore {
    pub players: HashMap<PlayerId, Player>,
    pub profiles: HashMap<PlayerId, PlayerProfile>,
    pub conversations: HashMap<ConversationId, Conversation>,
    /// Messages per conversation, in append order
    pub messages: HashMap<ConversationId, Vec<Message>>,
    pub topics: HashMap<TopicId, Topic>,
    pub prompt_logs: Vec<PromptLog>,
}

impl GameStore {
    pub fn append_message(&mut self, message: Message) {
        self.messages
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message);
    }

    /// The last `limit` messages of a conversation, oldest first
    pub fn recent_messages(&self, conversation_id: &str, limit: usize) -> Vec<Message> {
        let messages = self
            .messages
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        messages[messages.len().saturating_sub(limit)..].to_vec()
    }

    /// Custom topic owned by `owner` with the given normalized key
    pub fn custom_topic(&self, key: &str, owner: &str) -> Option<&Topic> {
        self.topics
            .values()
            .find(|t| t.key == key && t.owner.as_deref() == Some(owner))
    }

    pub fn custom_words(&self, key: &str, owner: &str) -> Option<Vec<String>> {
        self.custom_topic(key, owner).map(|t| t.words.clone())
    }
}

/// Shared application state
pub struct AppState {
    pub store: RwLock<GameStore>,
    pub words: WordSource,
    pub rounds: RoundMachine,
    pub llm: LlmManager,
    pub config: GameConfig,
    pub llm_config: LlmConfig,
    /// Conversations currently held by a [`TurnGuard`]
    turn_locks: BusySet,
}

impl AppState {
    pub fn new(
        config: GameConfig,
        words: WordSource,
        llm: LlmManager,
        llm_config: LlmConfig,
    ) -> Self {
        let rounds = RoundMachine::new(config.round_rules(), NearMatchJudge::default());
        Self {
            store: RwLock::new(GameStore::default()),
            words,
            rounds,
            llm,
            config,
            llm_config,
            turn_locks: BusySet::default(),
        }
    }

    /// Exclusive access to a conversation's round state.
    ///
    /// Fails instead of waiting, so a double-submitted turn is rejected
    /// rather than queued behind the first one. Callers check that the
    /// conversation exists and is theirs before locking.
    pub(crate) fn lock_conversation(&self, conversation_id: &str) -> GameResult<TurnGuard> {
        let mut busy = lock_busy(&self.turn_locks);
        if !busy.insert(conversation_id.to_string()) {
            return Err(GameError::TurnInProgress);
        }
        Ok(TurnGuard {
            busy: self.turn_locks.clone(),
            conversation_id: conversation_id.to_string(),
        })
    }

    /// Number of conversations with a turn or round mutation running
    pub fn turns_in_progress(&self) -> usize {
        lock_busy(&self.turn_locks).len()
    }
}

type BusySet = Arc<Mutex<HashSet<ConversationId>>>;

fn lock_busy(busy: &BusySet) -> MutexGuard<'_, HashSet<ConversationId>> {
    // The set stays consistent even if a holder panicked
    busy.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Held for the whole turn; the conversation is released on drop
#[derive(Debug)]
pub struct TurnGuard {
    busy: BusySet,
    conversation_id: ConversationId,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        lock_busy(&self.busy).remove(&self.conversation_id);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_messages_window() {
        let mut store = GameStore::default();
        for i in 0..12 {
            let sender = if i % 2 == 0 { Sender::User } else { Sender::Bot };
            store.append_message(Message::new("c1", sender, format!("m{}", i)));
        }

        let recent = store.recent_messages("c1", 10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent.first().unwrap().content, "m2");
        assert_eq!(recent.last().unwrap().content, "m11");

        assert_eq!(store.recent_messages("c1", 50).len(), 12);
        assert!(store.recent_messages("missing", 10).is_empty());
    }

    #[tokio::test]
    async fn test_conversation_lock_rejects_second_holder() {
        let state = test_support::state_with(&["Stalin"]);

        let guard = state.lock_conversation("c1").unwrap();
        assert!(matches!(
            state.lock_conversation("c1"),
            Err(GameError::TurnInProgress)
        ));
        // Other conversations are independent
        let other = state.lock_conversation("c2").unwrap();
        assert_eq!(state.turns_in_progress(), 2);

        drop(guard);
        drop(other);
        assert_eq!(state.turns_in_progress(), 0);
        assert!(state.lock_conversation("c1").is_ok());
    }

    #[tokio::test]
    async fn test_released_locks_leave_no_entries() {
        let state = test_support::state_with(&["Stalin"]);

        for i in 0..100 {
            let _guard = state.lock_conversation(&format!("c{}", i)).unwrap();
        }
        assert_eq!(state.turns_in_progress(), 0);
    }
}
