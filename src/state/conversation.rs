use super::{AppState, GameStore};
use crate::error::{GameError, GameResult};
use crate::types::*;
use crate::words::{display_name, topic_key};

fn check_owner(conversation: &Conversation, player_id: &str) -> GameResult<()> {
    if conversation.owner != player_id {
        return Err(GameError::Forbidden("access this conversation"));
    }
    Ok(())
}

impl AppState {
    /// Human readable name for a topic as seen by `owner`
    pub(crate) fn topic_display_name(&self, store: &GameStore, key: &str, owner: &str) -> String {
        if !self.words.is_builtin(key) {
            if let Some(topic) = store.custom_topic(key, owner) {
                return topic.name.clone();
            }
        }
        display_name(key)
    }

    /// Draw a word for `topic` as seen by `owner` (built-in, then custom, then default)
    pub(crate) fn draw_word(&self, store: &GameStore, topic: &str, owner: &str) -> String {
        let custom = store.custom_words(topic, owner);
        self.words
            .draw(topic, custom.as_deref(), &mut rand::rng())
    }

    /// Start a fresh game on `topic` with a newly drawn word
    pub(crate) fn new_conversation(
        &self,
        store: &mut GameStore,
        owner: &str,
        topic: &str,
    ) -> Conversation {
        let key = topic_key(topic);
        let key = if key.is_empty() {
            self.words.default_topic().to_string()
        } else {
            key
        };

        let first_word = self.draw_word(store, &key, owner);
        let now = chrono::Utc::now().to_rfc3339();
        let conversation = Conversation {
            id: ulid::Ulid::new().to_string(),
            owner: owner.to_string(),
            title: format!("TOPIC: {}", self.topic_display_name(store, &key, owner)),
            topic: key,
            created_at: now.clone(),
            updated_at: now,
            version: 1,
            round: Round::new(
                first_word,
                self.config.guesses_per_word,
                self.config.rounds_per_game,
            ),
        };

        store
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        store.messages.entry(conversation.id.clone()).or_default();

        tracing::info!(
            "Created conversation {} on topic {} for player {}",
            conversation.id,
            conversation.topic,
            owner
        );
        conversation
    }

    pub async fn create_conversation(&self, player: &Player, topic: &str) -> Conversation {
        let mut store = self.store.write().await;
        self.new_conversation(&mut store, &player.id, topic)
    }

    pub async fn get_conversation(
        &self,
        player_id: &str,
        conversation_id: &str,
    ) -> GameResult<Conversation> {
        let store = self.store.read().await;
        let conversation = store
            .conversations
            .get(conversation_id)
            .ok_or(GameError::NotFound("Conversation"))?;
        check_owner(conversation, player_id)?;
        Ok(conversation.clone())
    }

    /// Player's conversations, most recently updated first
    pub async fn list_conversations(&self, player_id: &str) -> Vec<Conversation> {
        let store = self.store.read().await;
        let mut conversations: Vec<Conversation> = store
            .conversations
            .values()
            .filter(|c| c.owner == player_id)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        conversations
    }

    pub async fn get_messages(
        &self,
        player_id: &str,
        conversation_id: &str,
    ) -> GameResult<Vec<Message>> {
        let store = self.store.read().await;
        let conversation = store
            .conversations
            .get(conversation_id)
            .ok_or(GameError::NotFound("Conversation"))?;
        check_owner(conversation, player_id)?;
        Ok(store
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Give the current word a fresh set of guesses
    pub async fn reset_round(
        &self,
        player_id: &str,
        conversation_id: &str,
    ) -> GameResult<Conversation> {
        self.get_conversation(player_id, conversation_id).await?;
        let _turn = self.lock_conversation(conversation_id)?;
        let mut store = self.store.write().await;

        let conversation = store
            .conversations
            .get_mut(conversation_id)
            .ok_or(GameError::NotFound("Conversation"))?;
        check_owner(conversation, player_id)?;
        if conversation.round.is_over() {
            return Err(GameError::GameOver);
        }

        self.rounds.reset_guesses(&mut conversation.round);
        conversation.version += 1;
        conversation.updated_at = chrono::Utc::now().to_rfc3339();

        tracing::info!("Reset guesses for conversation {}", conversation_id);
        Ok(conversation.clone())
    }

    /// Rewrite a user message and drop every message after it.
    ///
    /// Round state is left as is.
    pub async fn edit_message(
        &self,
        player_id: &str,
        message_id: &str,
        content: String,
    ) -> GameResult<Message> {
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(GameError::Validation("Message content is empty".to_string()));
        }

        let conversation_id = {
            let store = self.store.read().await;
            let conversation_id = store
                .messages
                .iter()
                .find(|(_, messages)| {
                    messages
                        .iter()
                        .any(|m| m.id == message_id && m.sender == Sender::User)
                })
                .map(|(id, _)| id.clone())
                .ok_or(GameError::NotFound("Message"))?;
            let conversation = store
                .conversations
                .get(&conversation_id)
                .ok_or(GameError::NotFound("Conversation"))?;
            if conversation.owner != player_id {
                return Err(GameError::Forbidden("edit this message"));
            }
            conversation_id
        };

        let _turn = self.lock_conversation(&conversation_id)?;
        let mut store = self.store.write().await;
        let (message, removed) = store.rewrite_message(&conversation_id, message_id, content)?;

        if removed > 0 {
            tracing::warn!(
                "Edited message {} in conversation {}: dropped {} later messages, round state kept",
                message_id,
                conversation_id,
                removed
            );
        }
        Ok(message)
    }
}

impl GameStore {
    /// Replace a message's content and truncate everything after it.
    ///
    /// Returns the rewritten message and how many later messages were dropped.
    fn rewrite_message(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        content: String,
    ) -> GameResult<(Message, usize)> {
        let messages = self
            .messages
            .get_mut(conversation_id)
            .ok_or(GameError::NotFound("Message"))?;
        let index = messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or(GameError::NotFound("Message"))?;
        let conversation = self
            .conversations
            .get_mut(conversation_id)
            .ok_or(GameError::NotFound("Conversation"))?;

        let removed = messages.len() - index - 1;
        messages.truncate(index + 1);
        let message = &mut messages[index];
        message.content = content;
        conversation.version += 1;
        conversation.updated_at = chrono::Utc::now().to_rfc3339();

        Ok((message.clone(), removed))
    }
}
