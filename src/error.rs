use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Gateway error: {0}")]
    Gateway(String),
    #[error("Ran out of destination guilds")]
    DestinationsExhausted,
    #[error("Internal: {0}")]
    Internal(String),
}
