// Error types for habridge

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A config/secrets file or a named server entry does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Misconfigured: {0}")]
    Misconfigured(String),

    /// Non-2xx response from the Home Assistant API.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The ssh subprocess could not be launched.
    #[error("Process error: {0}")]
    Process(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl Error {
    /// Status code of an HTTP error response, if this is one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
