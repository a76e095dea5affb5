//! Core error types.
//!
//! Every failure the cache and event fabric can report falls into one of four
//! kinds ([`ErrorKind`]). Transport layers map kinds to responses; nothing in
//! this crate decides response shapes.

use serde::Serialize;
use thiserror::Error;

use rosterhub_upstream::UpstreamError;

use crate::events::TransportError;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used by transport layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Unknown or inactive cache key on a hit-record path.
    NotFound,
    /// Neither the live provider nor the mock source could answer.
    UpstreamUnavailable,
    /// A streaming peer went away. Routine, never escalated.
    RoutineDisconnect,
    /// Anything else.
    UnexpectedFault,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::RoutineDisconnect => "ROUTINE_DISCONNECT",
            Self::UnexpectedFault => "UNEXPECTED_FAULT",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Cache entry not found: {0}")]
    NotFound(String),

    #[error("Upstream unavailable for {key}: live fetch failed ({live}); mock failed ({mock})")]
    UpstreamUnavailable {
        key: String,
        live: UpstreamError,
        mock: UpstreamError,
    },

    #[error("Peer disconnected: {0}")]
    RoutineDisconnect(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::RoutineDisconnect(_) => ErrorKind::RoutineDisconnect,
            Self::Unexpected(_) => ErrorKind::UnexpectedFault,
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Disconnected(detail) => Self::RoutineDisconnect(detail),
            TransportError::Failed(detail) => Self::Unexpected(detail),
        }
    }
}
