//! Error type for the persistence layer.

/// Errors surfaced by [`Store`](crate::Store) implementations.
///
/// `Conflict` doubles as the abort signal for conditional mutations: a
/// mutation closure that finds the record in a state the caller forbids
/// returns it, and the store propagates it without writing anything.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record for the requested key.
    #[error("record not found")]
    NotFound,

    /// A uniqueness or precondition violation; nothing was written.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend is unreachable or failed mid-operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
