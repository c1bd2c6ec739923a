//! The public error taxonomy returned by the loader facade.
//!
//! Internal plumbing composes fallible steps with `anyhow::Context`, the way the
//! rest of this codebase does; at the boundary where the failing step first
//! determines which kind of failure occurred, it is converted into a
//! [`LinkError`] so the facade's last-error slot can report a stable, typed
//! reason instead of an arbitrary error chain.

use std::fmt;

/// Coarse classification of a loader failure, matching the taxonomy a caller
/// needs to distinguish to react sensibly (e.g. retry vs. give up vs. treat a
/// missing symbol as optional).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Magic/class/data/type/machine mismatch; no loadable segments; missing
    /// required dynamic tables.
    BadFormat,
    /// Reservation or overlay mapping refused by the host.
    MapFailure,
    /// Symbol lookup miss at the facade level.
    NotFound,
    /// Recognized-but-unimplemented operation (e.g. the `RTLD_NEXT` sentinel).
    NotSupported,
    /// Allocation failure or invariant violation.
    Internal,
}

impl ErrorKind {
    fn label(self) -> &'static str {
        match self {
            ErrorKind::BadFormat => "BadFormat",
            ErrorKind::MapFailure => "MapFailure",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::NotSupported => "NotSupported",
            ErrorKind::Internal => "Internal",
        }
    }
}

/// A loader error: a taxonomy kind plus a human-readable message.
#[derive(Debug, Clone)]
pub struct LinkError {
    kind: ErrorKind,
    message: String,
}

impl LinkError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadFormat, message)
    }

    pub fn map_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MapFailure, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.message)
    }
}

impl std::error::Error for LinkError {}

/// Result alias used throughout the engine's public API.
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// Converts an opaque `anyhow::Error` into a [`LinkError`] of the given kind,
/// preserving the original chain in the message text.
pub fn wrap(kind: ErrorKind, err: anyhow::Error) -> LinkError {
    LinkError::new(kind, format!("{err:#}"))
}
