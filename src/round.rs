//! Round state machine applied once per completed AI turn.

use serde::Serialize;

use crate::error::{GameError, GameResult};
use crate::judge::NearMatchJudge;
use crate::types::{Round, RoundPhase, GUESSES_PER_WORD};

/// Per-player aggregate counters touched by round resolution
pub trait PlayerStats {
    fn increment_played(&mut self);
    fn increment_won(&mut self);
}

/// Configurable sentinels and limits for the round machine
#[derive(Debug, Clone)]
pub struct RoundRules {
    pub guesses_per_word: u32,
    /// Forces a rotation without touching the guess count or the score
    pub timeout_token: String,
    /// Counts the turn as a correct guess; None disables it
    pub override_token: Option<String>,
}

impl Default for RoundRules {
    fn default() -> Self {
        Self {
            guesses_per_word: GUESSES_PER_WORD,
            timeout_token: crate::config::DEFAULT_TIMEOUT_TOKEN.to_string(),
            override_token: Some(crate::config::DEFAULT_OVERRIDE_TOKEN.to_string()),
        }
    }
}

fn contains_token(message: &str, token: &str) -> bool {
    !token.is_empty() && message.to_lowercase().contains(&token.to_lowercase())
}

impl RoundRules {
    pub fn is_timeout(&self, user_message: &str) -> bool {
        contains_token(user_message, &self.timeout_token)
    }

    pub fn is_forced_win(&self, user_message: &str) -> bool {
        self.override_token
            .as_deref()
            .is_some_and(|token| contains_token(user_message, token))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationReason {
    Guessed,
    OutOfGuesses,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundOutcome {
    /// Word unchanged, the player keeps giving clues
    StillGuessing { guesses_remaining: u32 },
    /// Word rotated out (and possibly the game ended)
    Rotated {
        reason: RotationReason,
        previous_word: String,
        game_over: bool,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RoundMachine {
    pub rules: RoundRules,
    pub judge: NearMatchJudge,
}

impl RoundMachine {
    pub fn new(rules: RoundRules, judge: NearMatchJudge) -> Self {
        Self { rules, judge }
    }

    /// Apply one completed turn to `round`.
    ///
    /// `next_word` is only called when the word rotates and the game goes on.
    /// A game-over round is rejected without any change.
    pub fn apply<S, F>(
        &self,
        round: &mut Round,
        generated_text: &str,
        user_message: &str,
        stats: &mut S,
        next_word: F,
    ) -> GameResult<RoundOutcome>
    where
        S: PlayerStats + ?Sized,
        F: FnOnce() -> String,
    {
        if round.is_over() {
            return Err(GameError::GameOver);
        }

        if self.rules.is_timeout(user_message) {
            stats.increment_played();
            return Ok(self.rotate(round, RotationReason::Timeout, next_word));
        }

        round.guesses_remaining = round.guesses_remaining.saturating_sub(1);

        let guessed = self.judge.is_match(generated_text, &round.current_word)
            || self.rules.is_forced_win(user_message);

        if guessed {
            round.score += 1;
            stats.increment_played();
            stats.increment_won();
            return Ok(self.rotate(round, RotationReason::Guessed, next_word));
        }

        if round.guesses_remaining == 0 {
            stats.increment_played();
            return Ok(self.rotate(round, RotationReason::OutOfGuesses, next_word));
        }

        Ok(RoundOutcome::StillGuessing {
            guesses_remaining: round.guesses_remaining,
        })
    }

    /// Give the current word a fresh set of guesses. Word and score stay.
    pub fn reset_guesses(&self, round: &mut Round) {
        round.guesses_remaining = self.rules.guesses_per_word;
    }

    fn rotate<F>(&self, round: &mut Round, reason: RotationReason, next_word: F) -> RoundOutcome
    where
        F: FnOnce() -> String,
    {
        let previous_word = std::mem::take(&mut round.current_word);
        round.word_description = Some(describe(&previous_word, reason));
        round.num_rounds = round.num_rounds.saturating_sub(1);
        round.guesses_remaining = self.rules.guesses_per_word;

        let game_over = round.num_rounds == 0;
        if game_over {
            round.phase = RoundPhase::GameOver;
        } else {
            round.current_word = next_word();
        }

        tracing::debug!(
            ?reason,
            previous_word = %previous_word,
            rounds_left = round.num_rounds,
            "Word rotated"
        );

        RoundOutcome::Rotated {
            reason,
            previous_word,
            game_over,
        }
    }
}

fn describe(word: &str, reason: RotationReason) -> String {
    match reason {
        RotationReason::Guessed => format!("Correct! The word was \"{}\".", word),
        RotationReason::OutOfGuesses => format!("Out of guesses. The word was \"{}\".", word),
        RotationReason::Timeout => format!("Time's up. The word was \"{}\".", word),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlayerProfile;

    fn machine() -> RoundMachine {
        RoundMachine::default()
    }

    fn fresh_round() -> Round {
        Round::new("Stalin".to_string(), GUESSES_PER_WORD, 5)
    }

    fn assert_invariants(round: &Round) {
        assert!(round.guesses_remaining <= GUESSES_PER_WORD);
        assert!(round.guesses_remaining > 0, "guesses left at zero");
    }

    #[test]
    fn test_wrong_guess_decrements() {
        let machine = machine();
        let mut round = fresh_round();
        let mut stats = PlayerProfile::default();

        let outcome = machine
            .apply(&mut round, "Is it Churchill?", "a dictator", &mut stats, || {
                panic!("word must not rotate")
            })
            .unwrap();

        assert_eq!(outcome, RoundOutcome::StillGuessing { guesses_remaining: 2 });
        assert_eq!(round.current_word, "Stalin");
        assert_eq!(round.guesses_remaining, 2);
        assert_eq!(stats, PlayerProfile::default());
        assert_invariants(&round);
    }

    #[test]
    fn test_three_misses_rotate_word() {
        let machine = machine();
        let mut round = fresh_round();
        let mut stats = PlayerProfile::default();

        for _ in 0..2 {
            machine
                .apply(&mut round, "Churchill?", "clue", &mut stats, || "Lenin".to_string())
                .unwrap();
        }
        let outcome = machine
            .apply(&mut round, "Churchill?", "clue", &mut stats, || "Lenin".to_string())
            .unwrap();

        assert_eq!(
            outcome,
            RoundOutcome::Rotated {
                reason: RotationReason::OutOfGuesses,
                previous_word: "Stalin".to_string(),
                game_over: false,
            }
        );
        assert_eq!(round.current_word, "Lenin");
        assert_eq!(round.guesses_remaining, 3);
        assert_eq!(round.score, 0);
        assert_eq!(round.num_rounds, 4);
        assert_eq!(stats.rounds_played, 1);
        assert_eq!(stats.rounds_won, 0);
        assert!(round.word_description.as_deref().unwrap().contains("Stalin"));
        assert_invariants(&round);
    }

    #[test]
    fn test_correct_guess_rotates_and_scores() {
        let machine = machine();
        let mut round = fresh_round();
        let mut stats = PlayerProfile::default();

        let outcome = machine
            .apply(
                &mut round,
                "Joseph Stalin was a dictator",
                "Soviet leader",
                &mut stats,
                || "Lenin".to_string(),
            )
            .unwrap();

        assert!(matches!(
            outcome,
            RoundOutcome::Rotated {
                reason: RotationReason::Guessed,
                ..
            }
        ));
        assert_eq!(round.score, 1);
        assert_eq!(round.current_word, "Lenin");
        assert_eq!(round.guesses_remaining, 3);
        assert_eq!(stats.rounds_played, 1);
        assert_eq!(stats.rounds_won, 1);
    }

    #[test]
    fn test_correct_guess_on_last_attempt_counts_as_win() {
        let machine = machine();
        let mut round = fresh_round();
        round.guesses_remaining = 1;
        let mut stats = PlayerProfile::default();

        machine
            .apply(&mut round, "Stalin!", "clue", &mut stats, || "Lenin".to_string())
            .unwrap();

        assert_eq!(round.score, 1);
        assert_eq!(stats.rounds_won, 1);
        assert_eq!(stats.rounds_played, 1);
        assert_invariants(&round);
    }

    #[test]
    fn test_timeout_does_not_spend_a_guess() {
        let machine = machine();
        let mut round = fresh_round();
        round.guesses_remaining = 2;
        let mut stats = PlayerProfile::default();

        // Even a matching text is not credited on timeout
        let outcome = machine
            .apply(&mut round, "Stalin", "out of time [timeout]", &mut stats, || {
                "Lenin".to_string()
            })
            .unwrap();

        assert!(matches!(
            outcome,
            RoundOutcome::Rotated {
                reason: RotationReason::Timeout,
                ..
            }
        ));
        assert_eq!(round.current_word, "Lenin");
        assert_eq!(round.guesses_remaining, 3);
        assert_eq!(round.score, 0);
        assert_eq!(round.num_rounds, 4);
        assert_eq!(stats.rounds_played, 1);
        assert_eq!(stats.rounds_won, 0);
    }

    #[test]
    fn test_override_token_forces_win() {
        let machine = machine();
        let mut round = fresh_round();
        let mut stats = PlayerProfile::default();

        machine
            .apply(&mut round, "No idea", "[FORCE_WIN]", &mut stats, || "Lenin".to_string())
            .unwrap();
        assert_eq!(round.score, 1);
        assert_eq!(stats.rounds_won, 1);
    }

    #[test]
    fn test_override_token_can_be_disabled() {
        let machine = RoundMachine::new(
            RoundRules {
                override_token: None,
                ..RoundRules::default()
            },
            NearMatchJudge::default(),
        );
        let mut round = fresh_round();
        let mut stats = PlayerProfile::default();

        machine
            .apply(&mut round, "No idea", "[FORCE_WIN]", &mut stats, || "Lenin".to_string())
            .unwrap();
        assert_eq!(round.score, 0);
        assert_eq!(round.guesses_remaining, 2);
    }

    #[test]
    fn test_last_rotation_ends_game() {
        let machine = machine();
        let mut round = fresh_round();
        round.num_rounds = 1;
        let mut stats = PlayerProfile::default();

        let outcome = machine
            .apply(&mut round, "Stalin", "clue", &mut stats, || {
                panic!("no word after the last round")
            })
            .unwrap();

        assert!(matches!(
            outcome,
            RoundOutcome::Rotated {
                game_over: true,
                ..
            }
        ));
        assert_eq!(round.phase, RoundPhase::GameOver);
        assert_eq!(round.num_rounds, 0);
        assert_eq!(round.guesses_remaining, 3);

        // Terminal: further turns are rejected untouched
        let before = round.clone();
        let result = machine.apply(&mut round, "Stalin", "clue", &mut stats, String::new);
        assert!(matches!(result, Err(GameError::GameOver)));
        assert_eq!(round, before);
        assert_eq!(stats.rounds_played, 1);
    }

    #[test]
    fn test_reset_guesses_is_idempotent() {
        let machine = machine();
        let mut round = fresh_round();
        round.guesses_remaining = 1;
        round.score = 2;

        machine.reset_guesses(&mut round);
        let once = round.clone();
        machine.reset_guesses(&mut round);

        assert_eq!(once.guesses_remaining, 3);
        assert_eq!(round, once);
        assert_eq!(round.current_word, "Stalin");
        assert_eq!(round.score, 2);
    }

    #[test]
    fn test_invariants_over_many_turns() {
        let machine = machine();
        let mut round = Round::new("Stalin".to_string(), GUESSES_PER_WORD, 100);
        let mut stats = PlayerProfile::default();
        let texts = ["Churchill", "Stalin", "Lenin?", "no clue"];
        let messages = ["clue", "clue", "[TIMEOUT]", "clue", "[force_win]"];

        for i in 0..60 {
            machine
                .apply(
                    &mut round,
                    texts[i % texts.len()],
                    messages[i % messages.len()],
                    &mut stats,
                    || "Stalin".to_string(),
                )
                .unwrap();
            assert_invariants(&round);
        }
        assert!(stats.rounds_won <= stats.rounds_played);
    }
}
