//! Unified error type for the Seminar server.

use seminar_protocol::ProtocolError;
use seminar_session::ServiceError;
use seminar_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `seminar` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum SeminarError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid event).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A domain error from the lifecycle or registry services.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Invalid server configuration (bad bind address, bad env value).
    #[error("configuration error: {0}")]
    Config(String),
}
