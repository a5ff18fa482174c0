use super::AppState;
use crate::error::{GameError, GameResult};
use crate::types::*;
use crate::words::{clean_words, display_name, topic_key};
use serde::Serialize;
use std::collections::HashSet;

/// Upper bound on the size of an uploaded word list
pub const MAX_TERMS: usize = 500;
const MAX_TERM_LEN: usize = 100;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopicSummary {
    pub key: String,
    pub name: String,
    pub builtin: bool,
    pub word_count: usize,
}

impl AppState {
    /// Create or replace the player's word list for `name`
    pub async fn upload_terms(
        &self,
        player: &Player,
        name: &str,
        terms: Vec<String>,
    ) -> GameResult<Topic> {
        let key = topic_key(name);
        if key.is_empty() {
            return Err(GameError::Validation(
                "Topic name must contain letters or digits".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let words: Vec<String> = clean_words(terms)
            .into_iter()
            .filter(|w| seen.insert(w.to_lowercase()))
            .collect();

        if words.is_empty() {
            return Err(GameError::Validation("Word list is empty".to_string()));
        }
        if words.len() > MAX_TERMS {
            return Err(GameError::Validation(format!(
                "Word list has {} terms, at most {} allowed",
                words.len(),
                MAX_TERMS
            )));
        }
        if let Some(term) = words.iter().find(|w| w.chars().count() > MAX_TERM_LEN) {
            return Err(GameError::Validation(format!(
                "Term '{}...' exceeds {} characters",
                term.chars().take(20).collect::<String>(),
                MAX_TERM_LEN
            )));
        }

        if self.words.is_builtin(&key) {
            tracing::warn!(
                "Player {} uploaded topic '{}' which is shadowed by a built-in list",
                player.id,
                key
            );
        }

        let now = chrono::Utc::now().to_rfc3339();
        let display = name.trim().to_string();
        let mut store = self.store.write().await;

        let existing = store
            .topics
            .values_mut()
            .find(|t| t.key == key && t.owner.as_deref() == Some(player.id.as_str()));

        let topic = match existing {
            Some(topic) => {
                topic.name = display;
                topic.words = words;
                topic.updated_at = now;
                tracing::info!("Updated topic {} for player {}", key, player.id);
                topic.clone()
            }
            None => {
                let topic = Topic {
                    id: ulid::Ulid::new().to_string(),
                    key: key.clone(),
                    name: display,
                    words,
                    owner: Some(player.id.clone()),
                    created_at: now.clone(),
                    updated_at: now,
                };
                store.topics.insert(topic.id.clone(), topic.clone());
                tracing::info!("Created topic {} for player {}", key, player.id);
                topic
            }
        };

        Ok(topic)
    }

    /// Built-in topics followed by the player's own lists
    pub async fn list_topics(&self, player_id: &str) -> Vec<TopicSummary> {
        let mut topics: Vec<TopicSummary> = self
            .words
            .topics()
            .into_iter()
            .map(|key| TopicSummary {
                name: display_name(&key),
                word_count: self.words.resolve(&key, None).len(),
                builtin: true,
                key,
            })
            .collect();

        let store = self.store.read().await;
        let mut custom: Vec<TopicSummary> = store
            .topics
            .values()
            .filter(|t| t.owner.as_deref() == Some(player_id) && !self.words.is_builtin(&t.key))
            .map(|t| TopicSummary {
                key: t.key.clone(),
                name: t.name.clone(),
                builtin: false,
                word_count: t.words.len(),
            })
            .collect();
        custom.sort_by(|a, b| a.key.cmp(&b.key));

        topics.extend(custom);
        topics
    }

    /// One random word from a topic, without starting a game
    pub async fn random_subject(&self, player_id: &str, topic: &str) -> String {
        let store = self.store.read().await;
        self.draw_word(&store, &topic_key(topic), player_id)
    }
}
