use thiserror::Error;

/// Errors from identity lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid identity service url: {0}")]
    InvalidUrl(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("identity service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("identity service unreachable: {0}")]
    Transport(String),

    #[error("malformed identity response: {0}")]
    MalformedResponse(String),

    #[error("no user name for uuid {0}")]
    NoUserName(String),

    #[error("no uuid for user name {0}")]
    NoUuid(String),
}

impl IdentityError {
    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => Self::BadRequest(message),
            401 => Self::Unauthorized(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            _ => Self::Status { status, message },
        }
    }
}

pub type IdentityResult<T> = Result<T, IdentityError>;
