//! Canonical error and result types for the crate.
//!
//! `DispatchError` is the single public error surface. Producer failures on
//! a resumption never appear here: they are routed to the resource's
//! [`DiagnosticSink`](crate::diagnostics::DiagnosticSink) because no caller
//! on that path can observe them.

use std::io;

/// Boxed error returned by [`Producer::produce`](crate::Producer::produce).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type exposed by `reprise`.
#[derive(Debug)]
pub enum DispatchError {
    /// The producer callback failed while a direct caller could observe it.
    Producer(BoxError),
    /// The output sink failed while materializing a synchronous response.
    Io(io::Error),
}

impl From<io::Error> for DispatchError {
    fn from(error: io::Error) -> Self { Self::Io(error) }
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Producer(error) => write!(f, "producer error: {error}"),
            Self::Io(error) => write!(f, "output error: {error}"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Producer(error) => Some(&**error),
            Self::Io(error) => Some(error),
        }
    }
}

/// Canonical result alias used by `reprise` public APIs.
pub type Result<T> = std::result::Result<T, DispatchError>;
