use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Request-facing error taxonomy. Each variant carries enough information
/// for a handler to produce the matching HTTP status directly, mirroring
/// the `NoValid` / `NotFound` / `Unexpected` split of the original system.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("no valid request: {0}")]
    NoValid(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("url error: {0}")]
    Url(#[from] url::ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::NoValid(_) => 400,
            GatewayError::NotFound(_) => 404,
            GatewayError::Config(_) | GatewayError::Store(_) => 500,
            GatewayError::Classifier(_) => 502,
            GatewayError::Serialization(_) | GatewayError::Url(_) => 400,
            GatewayError::Io(_) | GatewayError::Unexpected(_) => 500,
        }
    }
}
