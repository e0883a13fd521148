//! Shared utilities for behavioural tests.
//!
//! Provides parameter-map builders and a pair of reusable producers: one
//! that streams numbered chunks across continuations and one that counts
//! its invocations. These helpers reduce duplication across test modules.

#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use reprise::{BoxError, ParamMap, Producer, Request, Response};

/// Build a parameter map from `(name, value)` pairs.
pub fn params(entries: &[(&str, &str)]) -> ParamMap {
    entries
        .iter()
        .map(|(name, value)| ((*name).to_owned(), vec![(*value).to_owned()]))
        .collect()
}

/// Producer writing one numbered chunk per pass, requesting continuation
/// until `chunks` passes have run. Progress rides on continuation data.
pub struct ChunkedProducer {
    pub chunks: usize,
}

impl Producer for ChunkedProducer {
    fn produce(
        &self,
        request: &mut Request<'_>,
        response: &mut Response<'_>,
    ) -> Result<(), BoxError> {
        let served = request.take_continuation_data::<usize>().unwrap_or(0);
        write!(response, "chunk{served};")?;
        if served + 1 < self.chunks {
            response.set_continuation_data(served + 1);
            response.request_continuation();
        }
        Ok(())
    }
}

/// Producer counting invocations and requesting continuation on the first
/// `continuations` of them.
pub struct CountingProducer {
    calls: Arc<AtomicUsize>,
    continuations: usize,
}

impl CountingProducer {
    pub fn new(continuations: usize) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: Arc::clone(&calls),
                continuations,
            },
            calls,
        )
    }
}

impl Producer for CountingProducer {
    fn produce(
        &self,
        _request: &mut Request<'_>,
        response: &mut Response<'_>,
    ) -> Result<(), BoxError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.continuations {
            response.request_continuation();
        }
        Ok(())
    }
}

/// Producer that suspends its first pass and completes on resumption,
/// counting every invocation.
pub fn suspend_once(calls: &Arc<AtomicUsize>) -> impl Producer {
    let calls = Arc::clone(calls);
    move |request: &mut Request<'_>, response: &mut Response<'_>| -> Result<(), BoxError> {
        calls.fetch_add(1, Ordering::SeqCst);
        if !request.is_continuation() {
            response.request_continuation();
        }
        Ok(())
    }
}
