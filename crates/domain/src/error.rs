/// Shared error type used across all Colloquy crates.
///
/// Variants correspond to the protocol-level error kinds; the transport
/// adapter maps each kind to a status code.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("turn not found: {0}")]
    TurnNotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("config: {0}")]
    Config(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    /// Stable kind string carried in API error bodies and log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => "Internal",
            Error::InvalidRequest(_) | Error::Config(_) => "InvalidRequest",
            Error::NotFound(_) => "NotFound",
            Error::PermissionDenied(_) => "PermissionDenied",
            Error::Conflict(_) => "Conflict",
            Error::TurnNotFound(_) => "TurnNotFound",
            Error::Timeout(_) => "Timeout",
            Error::UpstreamUnavailable(_) => "UpstreamUnavailable",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
