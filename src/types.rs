use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type ConversationId = String;
pub type MessageId = String;
pub type PlayerId = String;
pub type TopicId = String;
pub type PromptLogId = String;

/// Guesses granted for every freshly drawn word
pub const GUESSES_PER_WORD: u32 = 3;

/// Words a game starts with before it is over
pub const DEFAULT_ROUNDS_PER_GAME: u32 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundPhase {
    #[default]
    AwaitingGuess,
    GameOver,
}

/// Round state embedded in every conversation.
///
/// Mutated only by [`crate::round::RoundMachine`] after a completed AI turn
/// (plus the explicit guess reset).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub current_word: String,
    /// Shown to the player once a word has been rotated out
    pub word_description: Option<String>,
    pub guesses_remaining: u32,
    pub score: u32,
    pub num_rounds: u32,
    #[serde(default)]
    pub phase: RoundPhase,
}

impl Round {
    pub fn new(first_word: String, guesses: u32, num_rounds: u32) -> Self {
        Self {
            current_word: first_word,
            word_description: None,
            guesses_remaining: guesses,
            score: 0,
            num_rounds,
            phase: RoundPhase::AwaitingGuess,
        }
    }

    pub fn is_over(&self) -> bool {
        self.phase == RoundPhase::GameOver
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub owner: PlayerId,
    pub title: String,
    /// Normalized topic key the words are drawn from
    pub topic: String,
    pub created_at: String,
    pub updated_at: String,
    /// Bumped on every mutation so clients can detect stale views
    pub version: u64,
    #[serde(flatten)]
    pub round: Round,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: Sender,
    pub content: String,
    pub created_at: String,
}

impl Message {
    pub fn new(conversation_id: &str, sender: Sender, content: String) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            conversation_id: conversation_id.to_string(),
            sender,
            content,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A user-uploaded word list. Built-in lists live in [`crate::words::WordSource`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub key: String,
    pub name: String,
    pub words: Vec<String>,
    pub owner: Option<PlayerId>,
    pub created_at: String,
    pub updated_at: String,
}

/// Audit record for every generation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptLog {
    pub id: PromptLogId,
    pub player_id: Option<PlayerId>,
    pub conversation_id: Option<ConversationId>,
    pub prompt: String,
    pub response: String,
    pub tokens_used: u32,
    pub processing_time_secs: f64,
    pub created_at: String,
}

impl PromptLog {
    pub fn new(
        player_id: Option<PlayerId>,
        conversation_id: Option<ConversationId>,
        prompt: String,
        response: String,
        processing_time_secs: f64,
    ) -> Self {
        let tokens_used = estimate_tokens(&prompt, &response);
        Self {
            id: ulid::Ulid::new().to_string(),
            player_id,
            conversation_id,
            prompt,
            response,
            tokens_used,
            processing_time_secs,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Word count of prompt and response, a rough proxy for tokens
pub fn estimate_tokens(prompt: &str, response: &str) -> u32 {
    (prompt.split_whitespace().count() + response.split_whitespace().count()) as u32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub token: String,
    pub display_name: String,
}

/// Aggregate per-player counters, updated once per resolved round
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerProfile {
    pub rounds_played: u32,
    pub rounds_won: u32,
    pub last_active: Option<String>,
}

impl crate::round::PlayerStats for PlayerProfile {
    fn increment_played(&mut self) {
        self.rounds_played += 1;
    }

    fn increment_won(&mut self) {
        self.rounds_won += 1;
    }
}

/// One unit of the streamed chat response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamUnit {
    pub chunk: String,
    pub done: bool,
    pub conversation_id: Option<ConversationId>,
}

impl StreamUnit {
    pub fn fragment(chunk: impl Into<String>) -> Self {
        Self {
            chunk: chunk.into(),
            done: false,
            conversation_id: None,
        }
    }

    pub fn finished(conversation_id: &str) -> Self {
        Self {
            chunk: String::new(),
            done: true,
            conversation_id: Some(conversation_id.to_string()),
        }
    }
}
