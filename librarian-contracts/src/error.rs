use thiserror::Error;

/// Errors a store or transport collaborator can report back to the core.
///
/// These map onto the relevant `LibrarianError` kinds in `librarian-core`
/// (§7); this crate stays independent of `librarian-core` so that a driver
/// implementation doesn't need to depend on the whole catalog.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("transport failed: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ContractError>;
