//! Pluggable sink for failures that have no caller to report to.
//!
//! A producer failure during a resumption cannot propagate: the resumption
//! is an asynchronous callback from the transport, not a direct
//! request/response exchange. Such failures are handed to the resource's
//! `DiagnosticSink` and otherwise suppressed.

use crate::error::DispatchError;

/// Receives producer failures swallowed on the resumption path.
pub trait DiagnosticSink: Send + Sync {
    /// A producer failed while being resumed; the response was abandoned.
    fn resumption_failed(&self, error: &DispatchError);
}

/// Default sink: emits a `tracing` error event.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn resumption_failed(&self, error: &DispatchError) {
        tracing::error!(error = %error, "producer failed during resumption; response abandoned");
    }
}
