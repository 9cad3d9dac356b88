use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug)]
pub enum ModelError {
    InvalidFileName(String),
    InvalidDigest(String),
    InvalidTimeRange(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidFileName(msg) => write!(f, "invalid file name: {msg}"),
            ModelError::InvalidDigest(msg) => write!(f, "invalid digest: {msg}"),
            ModelError::InvalidTimeRange(msg) => write!(f, "invalid time range: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
