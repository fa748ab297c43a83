use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("WebSocket error: {0}")]
    WebsocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failure of a single REST refresh. Recorded on the cache entry, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("{provider} rate limit hit, showing cached data")]
    RateLimited { provider: &'static str },

    #[error("{provider} returned HTTP {status}")]
    Status { provider: &'static str, status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("missing API key, set {0}")]
    MissingKey(&'static str),
}

impl FetchError {
    /// Whether a previously cached value should stay on screen after this failure.
    pub fn keeps_stale(&self) -> bool {
        match self {
            FetchError::RateLimited { .. } | FetchError::Network(_) => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Decode(_) | FetchError::MissingKey(_) => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlertError {
    #[error("alert price '{0}' is not a number")]
    NotANumber(String),

    #[error("alert price must be a positive finite number, got {0}")]
    OutOfRange(f64),
}
