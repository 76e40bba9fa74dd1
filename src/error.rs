use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraderError {
    #[error("Cannot open: a position is already open")]
    AlreadyPositioned,

    #[error("Cannot close: no position is open")]
    NotPositioned,

    #[error("No price data in history")]
    NoPriceData,

    #[error("Failed to load configuration")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TraderError>;
