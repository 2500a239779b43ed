//! Server-specific error types

use playout_core::PlayoutError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Engine error: {0}")]
    Engine(#[from] PlayoutError),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Channel already running: {0}")]
    ChannelAlreadyRunning(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match &self {
            ServerError::ChannelNotFound(_) => (axum::http::StatusCode::NOT_FOUND, self.to_string()),
            ServerError::ChannelAlreadyRunning(_) => (axum::http::StatusCode::CONFLICT, self.to_string()),
            ServerError::Engine(PlayoutError::Validation(_)) => {
                (axum::http::StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::Engine(PlayoutError::SpoolFull) => {
                (axum::http::StatusCode::INSUFFICIENT_STORAGE, self.to_string())
            }
            ServerError::Config(_) => (axum::http::StatusCode::BAD_REQUEST, self.to_string()),
            _ => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        (status, body).into_response()
    }
}
