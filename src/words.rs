//! Topic word lists and random word draws.
//!
//! Built-in lists are JSON arrays stored as `<topic_key>.json` in the words
//! directory. They are loaded once at startup and never mutated. Custom
//! (uploaded) lists live in the store and are passed in per draw.

use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{GameError, GameResult};

/// Topic used when nothing else resolves
pub const DEFAULT_TOPIC: &str = "historical_figures";

/// Normalize a topic identifier into a filename-safe key.
///
/// `"Historical Figures"`, `" historical-figures "` and `"HISTORICAL_FIGURES"`
/// all map to `historical_figures`.
pub fn topic_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_') && !key.ends_with('_') {
            key.push('_');
        }
    }
    key.trim_matches('_').to_string()
}

/// Human readable name for a topic key (`animals_of_africa` -> `Animals Of Africa`)
pub fn display_name(key: &str) -> String {
    key.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trim entries and drop blanks
pub fn clean_words<I, S>(words: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .map(|w| w.as_ref().trim().to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

#[derive(Debug, Clone)]
pub struct WordSource {
    lists: HashMap<String, Vec<String>>,
    default_topic: String,
}

impl WordSource {
    /// Build from in-memory lists. Fails if the default topic has no words.
    pub fn from_lists(
        lists: HashMap<String, Vec<String>>,
        default_topic: &str,
    ) -> GameResult<Self> {
        let lists: HashMap<String, Vec<String>> = lists
            .into_iter()
            .map(|(key, words)| (topic_key(&key), clean_words(words)))
            .collect();

        let default_topic = topic_key(default_topic);
        match lists.get(&default_topic) {
            Some(words) if !words.is_empty() => {}
            Some(_) => {
                return Err(GameError::Config(format!(
                    "Default topic '{}' has an empty word list",
                    default_topic
                )))
            }
            None => {
                return Err(GameError::Config(format!(
                    "Default topic '{}' has no word list",
                    default_topic
                )))
            }
        }

        Ok(Self {
            lists,
            default_topic,
        })
    }

    /// Load every `*.json` word list in `dir`.
    ///
    /// Unreadable non-default lists are skipped with a warning; a broken
    /// default list is a configuration error.
    pub fn load(dir: &Path, default_topic: &str) -> GameResult<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            GameError::Config(format!(
                "Cannot read words directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let default_key = topic_key(default_topic);
        let mut lists = HashMap::new();

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let key = topic_key(stem);

            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| {
                    serde_json::from_str::<Vec<String>>(&raw).map_err(|e| e.to_string())
                });

            match parsed {
                Ok(words) => {
                    tracing::debug!("Loaded {} words for topic {}", words.len(), key);
                    lists.insert(key, words);
                }
                Err(e) if key == default_key => {
                    return Err(GameError::Config(format!(
                        "Default word list {} is unreadable: {}",
                        path.display(),
                        e
                    )));
                }
                Err(e) => {
                    tracing::warn!("Skipping word list {}: {}", path.display(), e);
                }
            }
        }

        let source = Self::from_lists(lists, default_topic)?;
        tracing::info!(
            "Loaded {} built-in topics from {}",
            source.lists.len(),
            dir.display()
        );
        Ok(source)
    }

    pub fn default_topic(&self) -> &str {
        &self.default_topic
    }

    /// Built-in topic keys, sorted
    pub fn topics(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lists.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_builtin(&self, topic_id: &str) -> bool {
        self.lists.contains_key(&topic_key(topic_id))
    }

    /// Resolve the word list for a topic: built-in, then custom, then default.
    pub fn resolve<'a>(&'a self, topic_id: &str, custom: Option<&'a [String]>) -> &'a [String] {
        let key = topic_key(topic_id);

        if let Some(words) = self.lists.get(&key).filter(|w| !w.is_empty()) {
            return words;
        }
        if let Some(words) = custom.filter(|w| !w.is_empty()) {
            return words;
        }

        if key != self.default_topic {
            tracing::debug!(
                "Topic '{}' has no words, falling back to '{}'",
                key,
                self.default_topic
            );
        }
        // Non-empty by construction
        &self.lists[&self.default_topic]
    }

    /// Draw one word uniformly at random. Repeats across draws are allowed.
    pub fn draw<R: Rng + ?Sized>(
        &self,
        topic_id: &str,
        custom: Option<&[String]>,
        rng: &mut R,
    ) -> String {
        let words = self.resolve(topic_id, custom);
        words.choose(rng).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source() -> WordSource {
        let mut lists = HashMap::new();
        lists.insert(
            "historical_figures".to_string(),
            vec!["Stalin".to_string(), "Napoleon Bonaparte".to_string()],
        );
        lists.insert(
            "animals".to_string(),
            vec!["Otter".to_string(), "Giraffe".to_string()],
        );
        lists.insert("empty".to_string(), vec!["  ".to_string()]);
        WordSource::from_lists(lists, DEFAULT_TOPIC).unwrap()
    }

    #[test]
    fn test_topic_key_normalization() {
        assert_eq!(topic_key("Historical Figures"), "historical_figures");
        assert_eq!(topic_key("  historical-figures "), "historical_figures");
        assert_eq!(topic_key("HISTORICAL__FIGURES"), "historical_figures");
        assert_eq!(topic_key("../etc/passwd"), "etcpasswd");
        assert_eq!(topic_key("!!!"), "");
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("historical_figures"), "Historical Figures");
        assert_eq!(display_name("animals"), "Animals");
    }

    #[test]
    fn test_draw_returns_member_of_topic() {
        let source = source();
        let mut rng = rand::rng();
        for _ in 0..50 {
            let word = source.draw("Animals", None, &mut rng);
            assert!(["Otter", "Giraffe"].contains(&word.as_str()));
        }
    }

    #[test]
    fn test_unknown_and_empty_topics_fall_back_to_default() {
        let source = source();
        let mut rng = rand::rng();
        for topic in ["space_missions", "empty", ""] {
            let word = source.draw(topic, None, &mut rng);
            assert!(
                ["Stalin", "Napoleon Bonaparte"].contains(&word.as_str()),
                "topic {:?} drew {}",
                topic,
                word
            );
        }
    }

    #[test]
    fn test_custom_list_used_when_no_builtin() {
        let source = source();
        let custom = vec!["Mitochondria".to_string()];
        assert_eq!(
            source.draw("biology terms", Some(&custom), &mut rand::rng()),
            "Mitochondria"
        );

        // Built-in wins over a custom list with the same key
        let word = source.draw("animals", Some(&custom), &mut rand::rng());
        assert_ne!(word, "Mitochondria");

        // Empty custom list falls through to the default
        let empty: Vec<String> = Vec::new();
        let word = source.draw("biology terms", Some(&empty), &mut rand::rng());
        assert!(["Stalin", "Napoleon Bonaparte"].contains(&word.as_str()));
    }

    #[test]
    fn test_missing_default_is_config_error() {
        let mut lists = HashMap::new();
        lists.insert("animals".to_string(), vec!["Otter".to_string()]);
        let err = WordSource::from_lists(lists, DEFAULT_TOPIC).unwrap_err();
        assert!(matches!(err, GameError::Config(_)));

        let mut lists = HashMap::new();
        lists.insert(DEFAULT_TOPIC.to_string(), vec![" ".to_string()]);
        assert!(WordSource::from_lists(lists, DEFAULT_TOPIC).is_err());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("historical_figures.json")).unwrap();
        write!(file, r#"["Stalin", "Lenin", ""]"#).unwrap();
        let mut file = std::fs::File::create(dir.path().join("Space Missions.json")).unwrap();
        write!(file, r#"["Voyager"]"#).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = WordSource::load(dir.path(), DEFAULT_TOPIC).unwrap();
        assert_eq!(source.topics(), vec!["historical_figures", "space_missions"]);
        assert_eq!(source.resolve("historical_figures", None).len(), 2);
        assert_eq!(source.draw("space missions", None, &mut rand::rng()), "Voyager");
    }

    #[test]
    fn test_load_fails_on_broken_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("historical_figures.json"), "[1, 2]").unwrap();
        assert!(WordSource::load(dir.path(), DEFAULT_TOPIC).is_err());

        let missing = dir.path().join("nope");
        assert!(WordSource::load(&missing, DEFAULT_TOPIC).is_err());
    }
}
