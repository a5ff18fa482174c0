//! Error taxonomy shared by the game core and the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

pub type GameResult<T> = Result<T, GameError>;

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// Fatal at startup (missing default word list, no generation provider)
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Not authorized to {0}")]
    Forbidden(&'static str),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Game over, no rounds remaining")]
    GameOver,

    #[error("A turn is already in progress for this conversation")]
    TurnInProgress,

    #[error("Generation failed: {0}")]
    Generation(#[from] crate::llm::LlmError),
}

impl GameError {
    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Config(_) => "CONFIG_ERROR",
            GameError::NotFound(_) => "NOT_FOUND",
            GameError::Forbidden(_) => "FORBIDDEN",
            GameError::Unauthenticated => "UNAUTHENTICATED",
            GameError::Validation(_) => "INVALID_INPUT",
            GameError::GameOver => "GAME_OVER",
            GameError::TurnInProgress => "TURN_IN_PROGRESS",
            GameError::Generation(_) => "GENERATION_FAILED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GameError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::Forbidden(_) => StatusCode::FORBIDDEN,
            GameError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GameError::Validation(_) => StatusCode::BAD_REQUEST,
            GameError::GameOver | GameError::TurnInProgress => StatusCode::CONFLICT,
            GameError::Generation(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GameError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = serde_json::json!({
            "code": self.code(),
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GameError::NotFound("Conversation").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(GameError::TurnInProgress.status(), StatusCode::CONFLICT);
        assert_eq!(
            GameError::Validation("empty prompt".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            GameError::NotFound("Conversation").to_string(),
            "Conversation not found"
        );
        assert_eq!(
            GameError::Forbidden("edit this message").to_string(),
            "Not authorized to edit this message"
        );
    }
}
