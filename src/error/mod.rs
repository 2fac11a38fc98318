use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors. Anything surfacing as an `Error` ends the run; per-item
/// failures travel as [`ItemError`](crate::report::classify::ItemError) instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("pipeline error: {context}")]
    Pipeline { context: &'static str },

    #[error("fetch error: {0}")]
    Fetch(String),

    /// Data that will not read differently on a second attempt.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("{0}")]
    Message(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn pipeline(context: &'static str) -> Self {
        Self::Pipeline { context }
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether another attempt at the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Fetch(_) | Error::Io(_))
    }
}
