//! Near-match judging of AI guesses against the secret word.
//!
//! Deliberately permissive: a missed correct guess costs the player a whole
//! round, a false positive only costs a point of difficulty.

use std::collections::HashSet;
use strsim::normalized_levenshtein;

/// Lowercase, keep only `[a-z0-9]` and whitespace, trim
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct NearMatchJudge {
    /// Minimum similarity ratio (0..=1) counted as a match
    pub threshold: f64,
    /// Extra tokens a sliding window may span beyond the target length
    pub window_slack: usize,
}

impl Default for NearMatchJudge {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            window_slack: 2,
        }
    }
}

impl NearMatchJudge {
    /// Whether `candidate` counts as a correct guess of `target`
    pub fn is_match(&self, candidate: &str, target: &str) -> bool {
        let target = normalize(target);
        if target.is_empty() {
            return false;
        }
        let candidate = normalize(candidate);
        if candidate.is_empty() {
            return false;
        }

        if candidate.contains(&target) {
            return true;
        }

        let target_tokens: Vec<&str> = target.split_whitespace().collect();
        let candidate_tokens: Vec<&str> = candidate.split_whitespace().collect();

        let candidate_set: HashSet<&str> = candidate_tokens.iter().copied().collect();
        if target_tokens.iter().all(|t| candidate_set.contains(t)) {
            return true;
        }

        if ratio(&target, &candidate) >= self.threshold {
            return true;
        }

        self.best_window_ratio(&target, &target_tokens, &candidate_tokens) >= self.threshold
    }

    /// Best ratio of any window of `n..=n+slack` consecutive candidate tokens
    fn best_window_ratio(&self, target: &str, target_tokens: &[&str], candidate: &[&str]) -> f64 {
        let n = target_tokens.len();
        let max_size = (n + self.window_slack).min(candidate.len());

        let mut best = 0.0_f64;
        for size in n.max(1)..=max_size {
            for window in candidate.windows(size) {
                let joined = window.join(" ");
                best = best.max(ratio(target, &joined));
                if best >= 1.0 {
                    return best;
                }
            }
        }
        best
    }
}

fn ratio(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b)
}
