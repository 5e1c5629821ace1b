use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] rusqlite::Error),

    #[error("record is not leased: {0}")]
    NotLeased(String),

    #[error("unknown url: {0}")]
    UnknownUrl(String),
}
