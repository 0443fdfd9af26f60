//! Error taxonomy for the service layer.

use seminar_store::StoreError;

/// Errors surfaced by the lifecycle and registry services.
///
/// Four domain kinds plus a wrapper for backend failures:
///
/// - `Validation` — malformed input, rejected before anything is persisted.
/// - `Authorization` — insufficient role or ownership; no state change.
/// - `NotFound` — the referenced session or participant does not exist.
/// - `Conflict` — a lifecycle or uniqueness rule was violated (double
///   initiate, close of a closed session, leave while already inactive).
/// - `Store` — the persistence backend itself failed.
///
/// Store errors are mapped explicitly at each call site (never via a
/// blanket `From`), so a missing record surfaces as the domain `NotFound`
/// rather than an opaque backend error.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// HTTP-convention status code, shared by the REST mapping and the
    /// live-connection error acknowledgements.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Authorization(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Store(_) => 500,
        }
    }
}

/// Maps a [`StoreError`] into the domain taxonomy, naming the entity the
/// operation was about (so `NotFound` reads "session not found", not
/// "record not found").
pub(crate) fn map_store(entity: &'static str) -> impl FnOnce(StoreError) -> ServiceError {
    move |err| match err {
        StoreError::NotFound => ServiceError::NotFound(entity.to_string()),
        StoreError::Conflict(msg) => ServiceError::Conflict(msg),
        other => ServiceError::Store(other),
    }
}
