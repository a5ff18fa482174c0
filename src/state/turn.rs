//! One chat turn: user message in, streamed AI guess out, one commit at the end.
//!
//! The turn runs in its own task that owns the conversation lock. Fragments
//! are forwarded through a bounded channel; when the receiving side goes away
//! the generation is dropped and nothing is committed.

use super::{AppState, TurnGuard};
use crate::error::{GameError, GameResult};
use crate::llm::GenerateRequest;
use crate::round::RoundOutcome;
use crate::types::*;
use crate::words::topic_key;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Streamed to the player in place of an answer when generation fails
pub const GENERATION_ERROR_MESSAGE: &str =
    "I apologize, but I encountered an error while processing your request. Please try again.";

pub const MAX_PROMPT_LEN: usize = 2000;

const DEMO_NOTICE: &str = "Sign in to save chat history and access the full chatbot.";

#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    /// Continue this conversation; a new one is started when absent
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    /// Topic for a new conversation, ignored when continuing
    #[serde(default)]
    pub topic: Option<String>,
    pub prompt: String,
}

/// Collects the fragments of one generation in arrival order
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    text: String,
    fragments: usize,
}

impl TurnAccumulator {
    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        self.fragments += 1;
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// The complete text, or None if nothing but whitespace arrived
    pub fn finish(self) -> Option<String> {
        (!self.text.trim().is_empty()).then_some(self.text)
    }
}

fn user_turn(content: &str) -> String {
    format!("[INST] {} [/INST]\n", content)
}

/// Render messages oldest first: user turns wrapped in `[INST]` tags, AI turns plain
pub fn render_history(messages: &[Message]) -> String {
    let mut rendered = String::new();
    for message in messages {
        match message.sender {
            Sender::User => rendered.push_str(&user_turn(&message.content)),
            Sender::Bot => {
                rendered.push_str(&message.content);
                rendered.push_str("\n\n");
            }
        }
    }
    rendered
}

pub fn system_prompt(topic_name: &str) -> String {
    format!(
        "You are playing a word guessing game on the topic \"{}\". \
         The player describes a secret word without saying it. \
         Reply with your single best guess, named explicitly, and at most one short sentence.",
        topic_name
    )
}

/// A started turn
pub struct TurnHandle {
    pub conversation_id: ConversationId,
    /// Fragments followed by exactly one final unit
    pub units: BoxStream<'static, StreamUnit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemoReply {
    pub response: String,
    pub demo_mode: bool,
    pub message: &'static str,
}

struct PreparedTurn {
    player_id: PlayerId,
    conversation_id: ConversationId,
    user_message: String,
    request: GenerateRequest,
    started: Instant,
    _guard: TurnGuard,
}

enum TurnEnd {
    Completed { provider: String, text: String },
    Failed(String),
    Cancelled,
}

fn validate_prompt(prompt: &str) -> GameResult<String> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(GameError::Validation("Prompt is required".to_string()));
    }
    if prompt.chars().count() > MAX_PROMPT_LEN {
        return Err(GameError::Validation(format!(
            "Prompt must be at most {} characters",
            MAX_PROMPT_LEN
        )));
    }
    Ok(prompt.to_string())
}

impl AppState {
    /// Validate, persist the user message and start streaming the AI's guess.
    ///
    /// Everything that can be rejected is rejected here, before any fragment
    /// is produced.
    pub async fn start_turn(
        self: &Arc<Self>,
        player: &Player,
        request: TurnRequest,
    ) -> GameResult<TurnHandle> {
        let prompt = validate_prompt(&request.prompt)?;

        let topic = match request.topic.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                let key = topic_key(raw);
                if key.is_empty() {
                    return Err(GameError::Validation(format!("Invalid topic '{}'", raw)));
                }
                key
            }
            _ => self.words.default_topic().to_string(),
        };

        let conversation_id = match request.conversation_id {
            Some(id) => self.get_conversation(&player.id, &id).await?.id,
            None => self.create_conversation(player, &topic).await.id,
        };

        let guard = self.lock_conversation(&conversation_id)?;

        let request = {
            let mut store = self.store.write().await;
            let conversation = store
                .conversations
                .get_mut(&conversation_id)
                .ok_or(GameError::NotFound("Conversation"))?;
            if conversation.owner != player.id {
                return Err(GameError::Forbidden("access this conversation"));
            }
            if conversation.round.is_over() {
                return Err(GameError::GameOver);
            }
            conversation.updated_at = chrono::Utc::now().to_rfc3339();
            let topic = conversation.topic.clone();

            store.append_message(Message::new(&conversation_id, Sender::User, prompt.clone()));
            let history = store.recent_messages(&conversation_id, self.config.history_window);
            let topic_name = self.topic_display_name(&store, &topic, &player.id);

            GenerateRequest {
                prompt: render_history(&history),
                system_prompt: Some(system_prompt(&topic_name)),
                max_tokens: Some(self.llm_config.default_max_tokens),
                timeout: self.config.turn_timeout,
            }
        };

        tracing::debug!(
            "Starting turn for conversation {} ({} prompt chars)",
            conversation_id,
            request.prompt.len()
        );

        let turn = PreparedTurn {
            player_id: player.id.clone(),
            conversation_id: conversation_id.clone(),
            user_message: prompt,
            request,
            started: Instant::now(),
            _guard: guard,
        };

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(self.clone().drive_turn(turn, tx));

        let units = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|unit| (unit, rx))
        })
        .boxed();

        Ok(TurnHandle {
            conversation_id,
            units,
        })
    }

    async fn drive_turn(self: Arc<Self>, turn: PreparedTurn, tx: mpsc::Sender<StreamUnit>) {
        match self.stream_generation(&turn, &tx).await {
            TurnEnd::Completed { provider, text } => {
                match self.commit_turn(&turn, text).await {
                    Ok(outcome) => tracing::info!(
                        conversation = %turn.conversation_id,
                        provider = %provider,
                        ?outcome,
                        "Turn committed"
                    ),
                    Err(e) => tracing::error!(
                        "Turn for conversation {} was not committed: {}",
                        turn.conversation_id,
                        e
                    ),
                }
            }
            TurnEnd::Failed(reason) => {
                tracing::warn!(
                    "Generation failed for conversation {}: {}",
                    turn.conversation_id,
                    reason
                );
                if tx
                    .send(StreamUnit::fragment(GENERATION_ERROR_MESSAGE))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            TurnEnd::Cancelled => {
                tracing::info!(
                    "Client left conversation {} mid-turn, nothing committed",
                    turn.conversation_id
                );
                return;
            }
        }

        // Release the conversation before the client learns the turn is over
        let conversation_id = turn.conversation_id.clone();
        drop(turn);
        let _ = tx.send(StreamUnit::finished(&conversation_id)).await;
    }

    /// Forward fragments until the stream ends, fails, times out or the client leaves
    async fn stream_generation(
        &self,
        turn: &PreparedTurn,
        tx: &mpsc::Sender<StreamUnit>,
    ) -> TurnEnd {
        let deadline = tokio::time::Instant::now() + self.config.turn_timeout;

        let opened = tokio::select! {
            _ = tx.closed() => return TurnEnd::Cancelled,
            opened = tokio::time::timeout_at(deadline, self.llm.stream(turn.request.clone())) => opened,
        };
        let (provider, mut stream) = match opened {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => return TurnEnd::Failed(e.to_string()),
            Err(_) => {
                return TurnEnd::Failed(format!(
                    "no stream within {:?}",
                    self.config.turn_timeout
                ))
            }
        };

        let mut accumulator = TurnAccumulator::default();
        loop {
            let next = tokio::select! {
                _ = tx.closed() => return TurnEnd::Cancelled,
                next = tokio::time::timeout_at(deadline, stream.next()) => next,
            };

            match next {
                Ok(Some(Ok(fragment))) => {
                    accumulator.push(&fragment);
                    if tx.send(StreamUnit::fragment(fragment)).await.is_err() {
                        return TurnEnd::Cancelled;
                    }
                }
                Ok(Some(Err(e))) => return TurnEnd::Failed(e.to_string()),
                Ok(None) => break,
                Err(_) => {
                    return TurnEnd::Failed(format!(
                        "generation exceeded {:?} after {} fragments",
                        self.config.turn_timeout,
                        accumulator.fragments()
                    ))
                }
            }
        }

        match accumulator.finish() {
            Some(text) => TurnEnd::Completed { provider, text },
            None => TurnEnd::Failed("empty response".to_string()),
        }
    }

    /// Bot message, round transition, player stats and prompt log in one write
    async fn commit_turn(&self, turn: &PreparedTurn, text: String) -> GameResult<RoundOutcome> {
        let processing_time = turn.started.elapsed().as_secs_f64();
        let mut store = self.store.write().await;

        let conversation = store
            .conversations
            .get(&turn.conversation_id)
            .ok_or(GameError::NotFound("Conversation"))?;
        let topic = conversation.topic.clone();
        let mut round = conversation.round.clone();
        let mut profile = store
            .profiles
            .get(&turn.player_id)
            .cloned()
            .unwrap_or_default();

        let outcome = self.rounds.apply(
            &mut round,
            &text,
            &turn.user_message,
            &mut profile,
            || self.draw_word(&store, &topic, &turn.player_id),
        )?;

        let now = chrono::Utc::now().to_rfc3339();
        profile.last_active = Some(now.clone());

        store.append_message(Message::new(&turn.conversation_id, Sender::Bot, text.clone()));
        if let Some(conversation) = store.conversations.get_mut(&turn.conversation_id) {
            conversation.round = round;
            conversation.version += 1;
            conversation.updated_at = now;
        }
        store.profiles.insert(turn.player_id.clone(), profile);
        store.prompt_logs.push(PromptLog::new(
            Some(turn.player_id.clone()),
            Some(turn.conversation_id.clone()),
            turn.request.prompt.clone(),
            text,
            processing_time,
        ));

        Ok(outcome)
    }

    /// Single unsaved reply without history, still logged
    pub async fn chat_demo(&self, player: Option<&Player>, prompt: &str) -> GameResult<DemoReply> {
        let prompt = validate_prompt(prompt)?;
        let started = Instant::now();

        let request = GenerateRequest {
            prompt: user_turn(&prompt),
            system_prompt: Some(system_prompt(&crate::words::display_name(
                self.words.default_topic(),
            ))),
            max_tokens: Some(self.llm_config.default_max_tokens),
            timeout: self.llm_config.default_timeout,
        };

        let (provider, response) = self.llm.generate(request).await?;
        tracing::debug!(
            provider = %provider,
            latency_ms = response.metadata.latency_ms,
            "Demo reply generated"
        );

        self.store.write().await.prompt_logs.push(PromptLog::new(
            player.map(|p| p.id.clone()),
            None,
            prompt,
            response.text.clone(),
            started.elapsed().as_secs_f64(),
        ));

        Ok(DemoReply {
            response: response.text,
            demo_mode: true,
            message: DEMO_NOTICE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: Sender, content: &str) -> Message {
        Message::new("c1", sender, content.to_string())
    }

    #[test]
    fn test_render_history_format() {
        let rendered = render_history(&[
            message(Sender::User, "a Soviet leader"),
            message(Sender::Bot, "Is it Lenin?"),
            message(Sender::User, "later, with a moustache"),
        ]);
        assert_eq!(
            rendered,
            "[INST] a Soviet leader [/INST]\nIs it Lenin?\n\n[INST] later, with a moustache [/INST]\n"
        );
    }

    #[test]
    fn test_accumulator() {
        let mut accumulator = TurnAccumulator::default();
        accumulator.push("Is it ");
        accumulator.push("Stalin?");
        assert_eq!(accumulator.fragments(), 2);
        assert_eq!(accumulator.finish().as_deref(), Some("Is it Stalin?"));

        let mut blank = TurnAccumulator::default();
        blank.push("  ");
        assert!(blank.finish().is_none());
    }

    #[test]
    fn test_validate_prompt() {
        assert_eq!(validate_prompt("  a dictator ").unwrap(), "a dictator");
        assert!(validate_prompt("   ").is_err());
        assert!(validate_prompt(&"x".repeat(MAX_PROMPT_LEN + 1)).is_err());
    }
}
