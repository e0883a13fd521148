//! Public API for the `reprise` library.
//!
//! This crate provides resumable request dispatch: a [`Resource`] invokes
//! its [`Producer`] to generate a response in one pass or across multiple
//! suspend/resume steps (streaming, time-sliced generation, wait-for-event
//! responses), with reentrant per-resource locking and teardown that is
//! safe while continuations are outstanding. The transport delivering the
//! bytes, the URL scheme, and parameter decoding are the embedding
//! server's concern; they meet this crate at the [`Exchange`] seam.

pub mod continuation;
pub mod diagnostics;
pub mod error;
/// Result type alias re-exported for convenience when working with
/// dispatch entry points.
pub use error::Result;
pub mod exchange;
pub mod producer;
pub mod registry;
pub mod request;
pub mod resource;
pub mod response;

pub use continuation::ContinuationToken;
pub use diagnostics::{DiagnosticSink, LogSink};
pub use error::{BoxError, DispatchError};
pub use exchange::{
    BufferProbe,
    BufferedExchange,
    Exchange,
    FileMap,
    FlushMode,
    ParamMap,
    RequestParts,
    UploadedFile,
};
pub use producer::Producer;
pub use registry::{ExposureRegistry, ResourceId};
pub use request::Request;
pub use resource::{Dispatchable, Resource, ResourceHandle, SessionGuard};
pub use response::Response;
