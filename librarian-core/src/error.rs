use thiserror::Error;

/// Error kinds surfaced by the catalog, search compiler, task manager, and
/// replication engine (§7). Variant names are the error *kind*, not a
/// mechanism — callers match on kind, never on an internal type name.
#[derive(Error, Debug)]
pub enum LibrarianError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("authentication failed")]
    AuthFailed,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("observation {0} has no stop time and cannot close a session")]
    MissingStopTime(i64),

    #[error("insufficient capacity: {0}")]
    InsufficientCapacity(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("transient failure, retry: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LibrarianError {
    pub fn bad_search(msg: impl Into<String>) -> Self {
        LibrarianError::BadRequest(format!("bad search: {}", msg.into()))
    }

    /// Whether this is safe to surface with a generic, non-leaky message
    /// (§7: `AuthFailed` is "surfaced with generic message").
    pub fn is_auth(&self) -> bool {
        matches!(self, LibrarianError::AuthFailed)
    }
}

impl From<sqlx::Error> for LibrarianError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => LibrarianError::NotFound("row not found".into()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                LibrarianError::Conflict(db_err.message().to_string())
            }
            _ => LibrarianError::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for LibrarianError {
    fn from(err: serde_json::Error) -> Self {
        LibrarianError::BadRequest(format!("malformed json: {err}"))
    }
}

impl From<librarian_model::ModelError> for LibrarianError {
    fn from(err: librarian_model::ModelError) -> Self {
        LibrarianError::BadRequest(err.to_string())
    }
}

impl From<librarian_config::InferenceError> for LibrarianError {
    fn from(err: librarian_config::InferenceError) -> Self {
        LibrarianError::BadRequest(err.to_string())
    }
}

impl From<librarian_contracts::ContractError> for LibrarianError {
    fn from(err: librarian_contracts::ContractError) -> Self {
        use librarian_contracts::ContractError as C;
        match err {
            C::NotFound(msg) => LibrarianError::NotFound(msg),
            C::AlreadyExists(msg) => LibrarianError::Conflict(msg),
            C::Unavailable(msg) => LibrarianError::StoreUnavailable(msg),
            C::Transport(msg) => LibrarianError::Transient(msg),
            C::Io(e) => LibrarianError::Internal(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LibrarianError>;
