//! State export/import for backups and restarts.
//!
//! Snapshots cover every persisted record. Word lists, providers and locks
//! are runtime-only and rebuilt from configuration.

use super::{AppState, GameStore};
use crate::error::{GameError, GameResult};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Schema version for export format compatibility
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateExport {
    pub schema_version: u32,
    /// Export timestamp (RFC 3339)
    pub exported_at: String,
    pub players: HashMap<PlayerId, Player>,
    #[serde(default)]
    pub profiles: HashMap<PlayerId, PlayerProfile>,
    pub conversations: HashMap<ConversationId, Conversation>,
    pub messages: HashMap<ConversationId, Vec<Message>>,
    #[serde(default)]
    pub topics: HashMap<TopicId, Topic>,
    #[serde(default)]
    pub prompt_logs: Vec<PromptLog>,
}

impl StateExport {
    pub fn new(store: GameStore) -> Self {
        Self {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            players: store.players,
            profiles: store.profiles,
            conversations: store.conversations,
            messages: store.messages,
            topics: store.topics,
            prompt_logs: store.prompt_logs,
        }
    }

    /// Validate the export before import
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > EXPORT_SCHEMA_VERSION {
            return Err(format!(
                "Export schema version {} is newer than supported version {}. \
                 Please update the server.",
                self.schema_version, EXPORT_SCHEMA_VERSION
            ));
        }

        let mut tokens = HashSet::new();
        for player in self.players.values() {
            if !tokens.insert(player.token.as_str()) {
                return Err(format!("Player '{}' reuses another player's token", player.id));
            }
        }

        for (id, conversation) in &self.conversations {
            if !self.players.contains_key(&conversation.owner) {
                return Err(format!(
                    "Conversation '{}' references player '{}' which doesn't exist",
                    id, conversation.owner
                ));
            }
            let round = &conversation.round;
            if !round.is_over() && (round.guesses_remaining == 0 || round.num_rounds == 0) {
                return Err(format!(
                    "Conversation '{}' is still in play with no guesses or rounds left",
                    id
                ));
            }
            if !round.is_over() && round.current_word.trim().is_empty() {
                return Err(format!("Conversation '{}' has no current word", id));
            }
        }

        for (conversation_id, messages) in &self.messages {
            if !self.conversations.contains_key(conversation_id) {
                return Err(format!(
                    "Messages reference conversation '{}' which doesn't exist",
                    conversation_id
                ));
            }
            if let Some(message) = messages
                .iter()
                .find(|m| &m.conversation_id != conversation_id)
            {
                return Err(format!(
                    "Message '{}' is filed under the wrong conversation",
                    message.id
                ));
            }
        }

        for topic in self.topics.values() {
            if topic.words.is_empty() {
                return Err(format!("Topic '{}' has an empty word list", topic.key));
            }
        }

        Ok(())
    }

    fn into_store(self) -> GameStore {
        GameStore {
            players: self.players,
            profiles: self.profiles,
            conversations: self.conversations,
            messages: self.messages,
            topics: self.topics,
            prompt_logs: self.prompt_logs,
        }
    }
}

impl AppState {
    pub async fn export_state(&self) -> StateExport {
        let store = self.store.read().await.clone();
        StateExport::new(store)
    }

    /// Replace every persisted record with the snapshot's.
    ///
    /// Refused while any conversation is locked by a running turn.
    pub async fn import_state(&self, export: StateExport) -> GameResult<()> {
        export.validate().map_err(GameError::Validation)?;

        let conversations = export.conversations.len();
        let players = export.players.len();
        {
            let mut store = self.store.write().await;
            let running = self.turns_in_progress();
            if running > 0 {
                tracing::warn!("Import refused: {} turns in progress", running);
                return Err(GameError::TurnInProgress);
            }
            *store = export.into_store();
        }

        tracing::info!(
            "Imported state with {} players and {} conversations",
            players,
            conversations
        );
        Ok(())
    }
}
