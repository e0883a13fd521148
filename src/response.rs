//! Per-dispatch response context handed to the producer.
//!
//! A `Response` wraps either a live transport [`Exchange`] or, on the
//! synchronous path, a plain [`io::Write`] sink. It tracks whether the
//! producer asked to be invoked again and carries any state the producer
//! stashed for that next pass. The resource, never the producer, turns the
//! request flag into an actual continuation.

use std::{any::Any, io};

use crate::exchange::Exchange;

enum Body<'a> {
    Exchange(&'a mut dyn Exchange),
    Sink(&'a mut dyn io::Write),
}

/// Write side of one producer pass.
pub struct Response<'a> {
    body: Body<'a>,
    continued: bool,
    data: Option<Box<dyn Any + Send>>,
}

impl<'a> Response<'a> {
    pub(crate) fn with_exchange(exchange: &'a mut dyn Exchange) -> Self {
        Self {
            body: Body::Exchange(exchange),
            continued: false,
            data: None,
        }
    }

    pub(crate) fn with_sink(sink: &'a mut dyn io::Write) -> Self {
        Self {
            body: Body::Sink(sink),
            continued: false,
            data: None,
        }
    }

    /// Append a response header.
    ///
    /// Ignored on the synchronous path, where the sink is a bare byte
    /// stream.
    pub fn append_header(&mut self, name: &str, value: &str) {
        match &mut self.body {
            Body::Exchange(exchange) => exchange.append_header(name, value),
            Body::Sink(_) => {}
        }
    }

    /// Ask to be invoked again for this request after control returns to
    /// the transport (or immediately, on the synchronous path).
    pub fn request_continuation(&mut self) { self.continued = true; }

    /// Whether a continuation has been requested on this pass.
    #[must_use]
    pub fn continuation_requested(&self) -> bool { self.continued }

    /// Stash state for the next pass of this request, replacing any state
    /// carried into the current one.
    pub fn set_continuation_data<T: Any + Send>(&mut self, data: T) {
        self.data = Some(Box::new(data));
    }

    pub(crate) fn into_outcome(self) -> (bool, Option<Box<dyn Any + Send>>) {
        (self.continued, self.data)
    }
}

impl io::Write for Response<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.body {
            Body::Exchange(exchange) => {
                exchange.write(buf)?;
                Ok(buf.len())
            }
            Body::Sink(sink) => sink.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.body {
            Body::Exchange(_) => Ok(()),
            Body::Sink(sink) => sink.flush(),
        }
    }
}

impl std::fmt::Debug for Response<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("continued", &self.continued)
            .field("has_data", &self.data.is_some())
            .finish_non_exhaustive()
    }
}
