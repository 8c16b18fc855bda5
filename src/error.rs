use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParcelError {
    #[error("Invalid lot/plan token format: {0}")]
    InvalidTokenFormat(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl From<reqwest::Error> for ParcelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ParcelError::Upstream(format!("request timed out: {}", err))
        } else {
            ParcelError::Upstream(err.to_string())
        }
    }
}

impl From<zip::result::ZipError> for ParcelError {
    fn from(err: zip::result::ZipError) -> Self {
        ParcelError::Archive(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ParcelError>;
