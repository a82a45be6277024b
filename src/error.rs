use thiserror::Error;

/// Everything that can go wrong while composing or handing off a message.
///
/// Transport and assembly failures from the collaborating crates are
/// carried through unmodified; delivery is never retried or softened.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to build message: {0}")]
    Build(String),

    #[error("invalid server address '{0}'")]
    ServerAddress(String),

    #[error("content is not valid utf-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("bad mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("cannot assemble message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("unusable content type '{0}'")]
    ContentType(String),

    #[error("smtp failure: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("cannot export message as json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
