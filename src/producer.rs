//! The producer capability implemented by concrete resources.

use crate::{error::BoxError, request::Request, response::Response};

/// Generates response content for one producer pass.
///
/// A producer writes to the response and may, before returning, call
/// [`Response::request_continuation`] to ask for another pass instead of
/// completing the dispatch. It must be safe to invoke zero, one, or many
/// times for one logical client request: the dispatcher re-invokes it on
/// every resumption and on every turn of the synchronous write loop.
///
/// Producers may call back into their own resource (for example through a
/// [`ResourceHandle`](crate::ResourceHandle)) on the same thread; the
/// resource's lock is reentrant.
pub trait Producer: Send + Sync + 'static {
    /// Produce (part of) the response for `request` into `response`.
    ///
    /// # Errors
    ///
    /// Returns an error to fail the dispatch. On a direct invocation the
    /// error propagates to the caller; on a resumption it is reported to
    /// the resource's diagnostic sink and the connection is abandoned.
    fn produce(&self, request: &mut Request<'_>, response: &mut Response<'_>)
    -> Result<(), BoxError>;
}

impl<F> Producer for F
where
    F: Fn(&mut Request<'_>, &mut Response<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn produce(
        &self,
        request: &mut Request<'_>,
        response: &mut Response<'_>,
    ) -> Result<(), BoxError> {
        self(request, response)
    }
}
