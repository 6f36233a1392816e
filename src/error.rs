use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;
pub type StoreResult<T> = Result<T, StoreError>;

/// Business failures surfaced to the client as error responses.
///
/// The `Display` text of every variant except `Storage` is shown to the
/// user verbatim.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    UsernameAlreadyExists(String),

    #[error("{0}")]
    UsernameNotFound(String),

    #[error("{0}")]
    GroupAlreadyExists(String),

    #[error("{0}")]
    GroupNotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    InvalidOperation(String),

    #[error("{0}")]
    UnsuccessfulLogin(String),

    #[error("{name} cannot be blank")]
    InvalidArgument { name: &'static str },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl LedgerError {
    pub(crate) fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    pub(crate) fn username_not_found(message: impl Into<String>) -> Self {
        Self::UsernameNotFound(message.into())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity {id} already exists")]
    AlreadyExists { id: String },

    #[error("entity {id} not found")]
    NotFound { id: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a port number, got `{value}`")]
    InvalidPort { var: &'static str, value: String },

    #[error("{var} cannot be blank")]
    Blank { var: &'static str },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
