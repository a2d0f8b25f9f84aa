use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for SessionError {
    fn from(error: reqwest::Error) -> Self {
        SessionError::Network(error.to_string())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("entry {entry_id} not found: {message}")]
    NotFound { entry_id: String, message: String },
    #[error("entry {entry_id} has no ready .{extension} derivative")]
    NoDerivative { entry_id: String, extension: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    Response(String),
}

impl From<reqwest::Error> for ResolveError {
    fn from(error: reqwest::Error) -> Self {
        ResolveError::Network(error.to_string())
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(error: serde_json::Error) -> Self {
        ResolveError::Response(error.to_string())
    }
}

pub type ResolveResult<T> = Result<T, ResolveError>;
