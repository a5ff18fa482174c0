use std::path::PathBuf;
use std::time::Duration;

use crate::round::RoundRules;
use crate::types::{DEFAULT_ROUNDS_PER_GAME, GUESSES_PER_WORD};
use crate::words::DEFAULT_TOPIC;

/// Sentinel the client appends when the round timer runs out
pub const DEFAULT_TIMEOUT_TOKEN: &str = "[TIMEOUT]";

/// Sentinel that counts the turn as a correct guess
pub const DEFAULT_OVERRIDE_TOKEN: &str = "[FORCE_WIN]";

/// Game configuration, loaded once at startup
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Directory holding the built-in `<topic>.json` word lists
    pub words_dir: PathBuf,
    /// Topic used when a requested topic is unknown or empty
    pub default_topic: String,
    pub guesses_per_word: u32,
    pub rounds_per_game: u32,
    /// Number of recent messages rendered into the prompt
    pub history_window: usize,
    pub timeout_token: String,
    /// None disables the forced-win bypass
    pub override_token: Option<String>,
    /// Upper bound on the whole generation stream of one turn
    pub turn_timeout: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            words_dir: PathBuf::from("words"),
            default_topic: DEFAULT_TOPIC.to_string(),
            guesses_per_word: GUESSES_PER_WORD,
            rounds_per_game: DEFAULT_ROUNDS_PER_GAME,
            history_window: 10,
            timeout_token: DEFAULT_TIMEOUT_TOKEN.to_string(),
            override_token: Some(DEFAULT_OVERRIDE_TOKEN.to_string()),
            turn_timeout: Duration::from_secs(60),
        }
    }
}

fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_trimmed(name).and_then(|s| s.parse().ok())
}

impl GameConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // An explicitly empty ROUND_OVERRIDE_TOKEN turns the bypass off
        let override_token = match std::env::var("ROUND_OVERRIDE_TOKEN") {
            Ok(token) => {
                let trimmed = token.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(_) => defaults.override_token,
        };

        let config = Self {
            words_dir: env_trimmed("WORDS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.words_dir),
            default_topic: env_trimmed("DEFAULT_TOPIC").unwrap_or(defaults.default_topic),
            guesses_per_word: env_parsed("GUESSES_PER_WORD")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.guesses_per_word),
            rounds_per_game: env_parsed("ROUNDS_PER_GAME")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.rounds_per_game),
            history_window: env_parsed("HISTORY_WINDOW")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.history_window),
            timeout_token: env_trimmed("ROUND_TIMEOUT_TOKEN").unwrap_or(defaults.timeout_token),
            override_token,
            turn_timeout: env_parsed("TURN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.turn_timeout),
        };

        tracing::info!(
            words_dir = %config.words_dir.display(),
            default_topic = %config.default_topic,
            guesses_per_word = config.guesses_per_word,
            rounds_per_game = config.rounds_per_game,
            override_enabled = config.override_token.is_some(),
            "Game config loaded"
        );

        config
    }

    pub fn round_rules(&self) -> RoundRules {
        RoundRules {
            guesses_per_word: self.guesses_per_word,
            timeout_token: self.timeout_token.clone(),
            override_token: self.override_token.clone(),
        }
    }
}
