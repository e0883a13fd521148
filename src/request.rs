//! Per-dispatch view of the incoming request.
//!
//! A `Request` is built fresh for every producer invocation, whether the
//! pass is a first dispatch, a resumption, or one turn of the synchronous
//! write loop. It never survives a suspension; continuation state the
//! producer wants to keep travels through
//! [`Response::set_continuation_data`](crate::Response::set_continuation_data)
//! and comes back here on the next pass.

use std::any::Any;

use crate::exchange::{FileMap, ParamMap, UploadedFile};

/// Read side of one producer pass.
pub struct Request<'a> {
    parameters: &'a ParamMap,
    uploads: &'a FileMap,
    resuming: bool,
    data: Option<Box<dyn Any + Send>>,
}

impl<'a> Request<'a> {
    pub(crate) fn new(
        parameters: &'a ParamMap,
        uploads: &'a FileMap,
        resuming: bool,
        data: Option<Box<dyn Any + Send>>,
    ) -> Self {
        Self {
            parameters,
            uploads,
            resuming,
            data,
        }
    }

    /// First value of the named parameter, if present.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name)?.first().map(String::as_str)
    }

    /// All decoded parameters.
    #[must_use]
    pub fn parameters(&self) -> &ParamMap { self.parameters }

    /// Uploads decoded for the named field.
    #[must_use]
    pub fn uploaded_files(&self, name: &str) -> &[UploadedFile] {
        self.uploads.get(name).map_or(&[], Vec::as_slice)
    }

    /// All decoded uploads.
    #[must_use]
    pub fn uploads(&self) -> &FileMap { self.uploads }

    /// Whether this pass continues an earlier one for the same request.
    #[must_use]
    pub fn is_continuation(&self) -> bool { self.resuming }

    /// Borrow the state stashed by the previous pass, if its type matches.
    #[must_use]
    pub fn continuation_data<T: Any>(&self) -> Option<&T> { self.data.as_deref()?.downcast_ref() }

    /// Mutably borrow the stashed state, if its type matches.
    ///
    /// State left here is carried forward unchanged when the producer
    /// suspends again without stashing a replacement.
    pub fn continuation_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.data.as_deref_mut()?.downcast_mut()
    }

    /// Take the stashed state out, if its type matches.
    pub fn take_continuation_data<T: Any>(&mut self) -> Option<T> {
        if !self.data.as_deref()?.is::<T>() {
            return None;
        }
        let data = self.data.take()?;
        data.downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub(crate) fn into_data(self) -> Option<Box<dyn Any + Send>> { self.data }
}

impl std::fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("parameters", &self.parameters.len())
            .field("uploads", &self.uploads.len())
            .field("resuming", &self.resuming)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}
