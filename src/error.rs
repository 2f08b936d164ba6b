use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Signing the assertion or exchanging it for a bearer token failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The journal could not be reached or answered with a non-success status.
    #[error("Journal request failed: {0}")]
    Transport(String),

    /// The journal answered with a body that is not a valid page.
    #[error("Malformed journal page: {0}")]
    Protocol(String),

    /// The sink rejected an event. Earlier deliveries of the page are already committed.
    #[error("Sink rejected event {event_id}: {message}")]
    Delivery { event_id: String, message: String },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConnectorError {
    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectorError::Auth(_) => "auth",
            ConnectorError::Transport(_) => "transport",
            ConnectorError::Protocol(_) => "protocol",
            ConnectorError::Delivery { .. } => "delivery",
            ConnectorError::Checkpoint(_) | ConnectorError::Io(_) => "checkpoint",
            ConnectorError::Config(_) => "config",
        }
    }
}

impl From<rusqlite::Error> for ConnectorError {
    fn from(e: rusqlite::Error) -> Self {
        ConnectorError::Checkpoint(e.to_string())
    }
}

impl From<toml::de::Error> for ConnectorError {
    fn from(e: toml::de::Error) -> Self {
        ConnectorError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Error reported by a sink that could not accept an event.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct SinkError(pub String);

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError(e.to_string())
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        SinkError(e.to_string())
    }
}
