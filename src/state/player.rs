use super::AppState;
use crate::auth::constant_time_eq;
use crate::error::{GameError, GameResult};
use crate::types::*;

const MAX_DISPLAY_NAME_LEN: usize = 40;

/// Fallback name for players who don't pick one
fn generate_display_name() -> String {
    petname::petname(2, "-").unwrap_or_else(|| "anonymous-player".to_string())
}

impl AppState {
    /// Register a new player and hand out its bearer token
    pub async fn register_player(&self, display_name: Option<String>) -> GameResult<Player> {
        let display_name = match display_name.map(|n| n.trim().to_string()) {
            Some(name) if name.chars().count() > MAX_DISPLAY_NAME_LEN => {
                return Err(GameError::Validation(format!(
                    "Display name must be at most {} characters",
                    MAX_DISPLAY_NAME_LEN
                )));
            }
            Some(name) if !name.is_empty() => name,
            _ => generate_display_name(),
        };

        let player = Player {
            id: ulid::Ulid::new().to_string(),
            token: ulid::Ulid::new().to_string(),
            display_name,
        };

        let mut store = self.store.write().await;
        store.players.insert(player.id.clone(), player.clone());
        store
            .profiles
            .insert(player.id.clone(), PlayerProfile::default());

        tracing::info!("Registered player {} ({})", player.id, player.display_name);
        Ok(player)
    }

    /// Get player by token
    pub async fn get_player_by_token(&self, token: &str) -> Option<Player> {
        self.store
            .read()
            .await
            .players
            .values()
            .find(|p| constant_time_eq(p.token.as_bytes(), token.as_bytes()))
            .cloned()
    }

    pub async fn get_profile(&self, player_id: &str) -> PlayerProfile {
        self.store
            .read()
            .await
            .profiles
            .get(player_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::state::test_support::state_with;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let state = state_with(&[]);

        let player = state.register_player(Some("  Ada ".to_string())).await.unwrap();
        assert_eq!(player.display_name, "Ada");

        let found = state.get_player_by_token(&player.token).await.unwrap();
        assert_eq!(found.id, player.id);
        assert!(state.get_player_by_token("bogus").await.is_none());

        let profile = state.get_profile(&player.id).await;
        assert_eq!(profile.rounds_played, 0);
        assert_eq!(profile.rounds_won, 0);
    }

    #[tokio::test]
    async fn test_register_generates_name_when_blank() {
        let state = state_with(&[]);

        let player = state.register_player(Some("   ".to_string())).await.unwrap();
        assert!(!player.display_name.is_empty());

        let other = state.register_player(None).await.unwrap();
        assert_ne!(player.token, other.token);
    }

    #[tokio::test]
    async fn test_register_rejects_long_name() {
        let state = state_with(&[]);
        let result = state.register_player(Some("x".repeat(41))).await;
        assert!(matches!(result, Err(crate::error::GameError::Validation(_))));
    }
}
