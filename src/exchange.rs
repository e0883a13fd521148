//! Transport seam: the exchange a response travels through.
//!
//! An [`Exchange`] is the transport-side object for one client request. The
//! transport decodes the request into [`RequestParts`], hands both to
//! [`Resource::dispatch`](crate::Resource::dispatch), and receives headers,
//! body bytes, and exactly one terminal [`FlushMode`] back. A suspended
//! dispatch parks the exchange inside the resource until the transport calls
//! `resume` with the token it was given.

use std::{collections::HashMap, io, path::PathBuf, sync::Arc};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::continuation::ContinuationToken;

/// Decoded request parameters, keyed by name. One name may carry several
/// values; decoding is the transport's job.
pub type ParamMap = HashMap<String, Vec<String>>;

/// Decoded file uploads, keyed by field name.
pub type FileMap = HashMap<String, Vec<UploadedFile>>;

/// Metadata for one decoded upload.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    /// File name as reported by the client.
    pub client_file_name: String,
    /// Content type as reported by the client.
    pub content_type: String,
    /// Where the transport spooled the upload.
    pub spool_path: PathBuf,
}

/// Decoded request data traveling alongside an exchange.
///
/// Owned rather than borrowed so a suspended dispatch can park it next to
/// the exchange and see the same request data again on resumption.
#[derive(Clone, Debug, Default)]
pub struct RequestParts {
    pub parameters: ParamMap,
    pub uploads: FileMap,
}

/// Terminal signal for one producer pass over an exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushMode {
    /// The response is fully delivered.
    Done,
    /// Hold the connection open; the transport should later call
    /// [`resume`](crate::Resource::resume) with this token, at most once.
    Pending(ContinuationToken),
}

/// Transport contract for one client request.
///
/// Implementations deliver headers and body bytes to the client. `flush` is
/// called exactly once per producer pass; after a `Pending` flush the
/// exchange is owned by the resource until resumption, and headers appended
/// on later passes may be ignored by transports that have already committed
/// the response head. Dropping an exchange without a `Done` flush means the
/// dispatch was abandoned; transports are expected to reclaim the
/// connection through their own timeout or `Drop` handling.
pub trait Exchange: Send {
    /// Append a response header.
    fn append_header(&mut self, name: &str, value: &str);

    /// Deliver a chunk of body bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport can no longer accept bytes.
    fn write(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Signal the end of this producer pass.
    fn flush(&mut self, mode: FlushMode);
}

#[derive(Default)]
struct BufferedInner {
    headers: Vec<(String, String)>,
    body: BytesMut,
    flushes: Vec<FlushMode>,
    dropped: bool,
}

/// In-memory [`Exchange`] capturing everything written through it.
///
/// Useful for rendering a resource over the full transport path without a
/// network, and for exercising dispatch in tests. Observations are read
/// through the paired [`BufferProbe`], which stays valid after the exchange
/// has been handed to a resource.
pub struct BufferedExchange {
    inner: Arc<Mutex<BufferedInner>>,
}

impl BufferedExchange {
    /// Create an exchange together with its observation probe.
    #[must_use]
    pub fn with_probe() -> (Self, BufferProbe) {
        let inner = Arc::new(Mutex::new(BufferedInner::default()));
        (
            Self {
                inner: Arc::clone(&inner),
            },
            BufferProbe { inner },
        )
    }
}

impl Exchange for BufferedExchange {
    fn append_header(&mut self, name: &str, value: &str) {
        self.inner
            .lock()
            .headers
            .push((name.to_owned(), value.to_owned()));
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.inner.lock().body.extend_from_slice(chunk);
        Ok(())
    }

    fn flush(&mut self, mode: FlushMode) { self.inner.lock().flushes.push(mode); }
}

impl Drop for BufferedExchange {
    fn drop(&mut self) { self.inner.lock().dropped = true; }
}

/// Observation handle for a [`BufferedExchange`].
#[derive(Clone)]
pub struct BufferProbe {
    inner: Arc<Mutex<BufferedInner>>,
}

impl BufferProbe {
    /// Headers appended so far, in order, across all producer passes.
    #[must_use]
    pub fn headers(&self) -> Vec<(String, String)> { self.inner.lock().headers.clone() }

    /// Body bytes written so far.
    #[must_use]
    pub fn body(&self) -> Bytes { self.inner.lock().body.clone().freeze() }

    /// Flush signals received so far, in order.
    #[must_use]
    pub fn flushes(&self) -> Vec<FlushMode> { self.inner.lock().flushes.clone() }

    /// Token from the most recent `Pending` flush, if any.
    #[must_use]
    pub fn pending_token(&self) -> Option<ContinuationToken> {
        self.inner
            .lock()
            .flushes
            .iter()
            .rev()
            .find_map(|mode| match mode {
                FlushMode::Pending(token) => Some(*token),
                FlushMode::Done => None,
            })
    }

    /// Whether the exchange has been dropped.
    ///
    /// A drop without a preceding [`FlushMode::Done`] means the dispatch was
    /// abandoned (producer failure or resource teardown).
    #[must_use]
    pub fn is_dropped(&self) -> bool { self.inner.lock().dropped }
}
