//! Crate-wide error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("argument error: {0}")]
    Argument(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(String),

    #[error("corrupt filesystem: {0}")]
    CorruptFilesystem(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, Error>;
