//! Resources and the dispatch/resume state machine.
//!
//! A [`Resource`] is the unit of dispatch: the transport hands it decoded
//! request parts and an [`Exchange`], the resource invokes its
//! [`Producer`], and the producer either completes the response or asks
//! for a continuation. Suspension is structural: the exchange is parked
//! inside the resource, control returns to the transport, and a later
//! [`resume`](Resource::resume) picks the dispatch back up. Teardown is
//! safe while continuations are outstanding, including when it is
//! triggered from inside a producer callback.

use std::{
    cell::RefCell,
    fmt, io,
    sync::{Arc, Weak},
};

use parking_lot::ReentrantMutex;
use tracing::debug;

use crate::{
    continuation::{ContinuationArena, ContinuationData, ContinuationToken},
    diagnostics::{DiagnosticSink, LogSink},
    error::{DispatchError, Result},
    exchange::{Exchange, FileMap, FlushMode, ParamMap, RequestParts},
    producer::Producer,
    registry::{ExposureRegistry, ResourceId},
    request::Request,
    response::Response,
};

type ChangedHook = Arc<dyn Fn() + Send + Sync>;

/// A session-wide guard the caller was holding when it entered
/// [`Resource::dispatch`].
///
/// The resource drops the guard (running its release action) before the
/// producer runs, so no caller ends up holding two locks across a
/// potentially long user callback. Resumptions never carry one.
pub struct SessionGuard(Option<Box<dyn FnOnce() + Send>>);

impl SessionGuard {
    /// Wrap a release action to run when the guard is dropped.
    #[must_use]
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(release)))
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionGuard").finish_non_exhaustive()
    }
}

/// Type-erased dispatch surface of a resource.
///
/// Implemented by every [`Resource`]; this is what [`ResourceHandle`]s and
/// the [`ExposureRegistry`](crate::ExposureRegistry) traffic in, so
/// transports can drive heterogeneous resources uniformly.
pub trait Dispatchable: Send + Sync {
    /// Dispatch a fresh, un-suspended request. See [`Resource::dispatch`].
    ///
    /// # Errors
    ///
    /// Propagates a producer failure; see [`Resource::dispatch`].
    fn dispatch(
        &self,
        parts: RequestParts,
        exchange: Box<dyn Exchange>,
        session: Option<SessionGuard>,
    ) -> Result<()>;

    /// Resume a suspended dispatch. See [`Resource::resume`].
    fn resume(&self, token: ContinuationToken);

    /// Materialize the full response synchronously. See
    /// [`Resource::write_sync`].
    ///
    /// # Errors
    ///
    /// Propagates a producer or sink failure; see [`Resource::write_sync`].
    fn write_sync(
        &self,
        parameters: &ParamMap,
        files: &FileMap,
        out: &mut dyn io::Write,
    ) -> Result<()>;

    /// Stop serving: see [`Resource::teardown`].
    fn teardown(&self);
}

/// Cloneable, type-erased handle to a resource.
///
/// This is what the registry stores (weakly) and returns, and what
/// transport glue or a producer re-entering its own resource holds on to.
#[derive(Clone)]
pub struct ResourceHandle(Arc<dyn Dispatchable>);

impl ResourceHandle {
    pub(crate) fn from_arc(arc: Arc<dyn Dispatchable>) -> Self { Self(arc) }

    /// Downgrade to a `Weak` reference for storage in a registry.
    pub(crate) fn downgrade(&self) -> Weak<dyn Dispatchable> { Arc::downgrade(&self.0) }

    /// See [`Resource::dispatch`].
    ///
    /// # Errors
    ///
    /// Propagates a producer failure; see [`Resource::dispatch`].
    pub fn dispatch(
        &self,
        parts: RequestParts,
        exchange: Box<dyn Exchange>,
        session: Option<SessionGuard>,
    ) -> Result<()> {
        self.0.dispatch(parts, exchange, session)
    }

    /// See [`Resource::resume`].
    pub fn resume(&self, token: ContinuationToken) { self.0.resume(token); }

    /// See [`Resource::write_sync`].
    ///
    /// # Errors
    ///
    /// Propagates a producer or sink failure; see [`Resource::write_sync`].
    pub fn write_sync(
        &self,
        parameters: &ParamMap,
        files: &FileMap,
        out: &mut dyn io::Write,
    ) -> Result<()> {
        self.0.write_sync(parameters, files, out)
    }

    /// See [`Resource::teardown`].
    pub fn teardown(&self) { self.0.teardown(); }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceHandle").finish_non_exhaustive()
    }
}

struct State {
    being_deleted: bool,
    suggested_file_name: Option<String>,
    continuations: ContinuationArena,
    exposure: Option<(Arc<ExposureRegistry>, ResourceId)>,
    changed_hooks: Vec<ChangedHook>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl State {
    fn new() -> Self {
        Self {
            being_deleted: false,
            suggested_file_name: None,
            continuations: ContinuationArena::default(),
            exposure: None,
            changed_hooks: Vec::new(),
            diagnostics: Arc::new(LogSink),
        }
    }
}

struct Shared<P> {
    producer: P,
    // Kept behind its own `Arc` and cloned at the start of every entry
    // point, so the lock stays valid even if the producer callback drops
    // the last other handle to this resource mid-call.
    lock: Arc<ReentrantMutex<RefCell<State>>>,
}

impl<P: Producer> Shared<P> {
    fn dispatch(
        &self,
        parts: RequestParts,
        exchange: Box<dyn Exchange>,
        session: Option<SessionGuard>,
    ) -> Result<()> {
        let lock = Arc::clone(&self.lock);
        let guard = lock.lock();
        if guard.borrow().being_deleted {
            // Too late, not invalid: the transport reclaims the dropped
            // exchange through its own timeout handling.
            return Ok(());
        }
        // Release the caller's session-wide guard before the producer runs.
        drop(session);
        self.run(&guard, parts, exchange, None)
    }

    fn resume(&self, token: ContinuationToken) {
        let lock = Arc::clone(&self.lock);
        let guard = lock.lock();
        let resumed = {
            let mut state = guard.borrow_mut();
            if state.being_deleted {
                return;
            }
            state.continuations.begin_resumption(token)
        };
        let Some((parts, exchange, data)) = resumed else {
            debug!(%token, "ignoring resumption of a consumed or stopped token");
            return;
        };
        if let Err(error) = self.run(&guard, parts, exchange, Some((token, data))) {
            // No caller on this path can act on the failure: report it to
            // the sink and abandon the response.
            let diagnostics = Arc::clone(&guard.borrow().diagnostics);
            diagnostics.resumption_failed(&error);
            guard.borrow_mut().continuations.remove(token);
        }
    }

    /// One producer pass over a live exchange, fresh or resumed. The
    /// resource's lock is held by the caller for the whole pass; `RefCell`
    /// borrows are scoped so none is active while the producer runs.
    fn run(
        &self,
        state_cell: &RefCell<State>,
        parts: RequestParts,
        mut exchange: Box<dyn Exchange>,
        resumed: Option<(ContinuationToken, ContinuationData)>,
    ) -> Result<()> {
        let file_name = state_cell.borrow().suggested_file_name.clone();
        if let Some(name) = &file_name {
            exchange.append_header("Content-Disposition", &format!("attachment;filename={name}"));
        }

        let (token, data) = match resumed {
            Some((token, data)) => (Some(token), data),
            None => (None, None),
        };
        let mut request = Request::new(&parts.parameters, &parts.uploads, token.is_some(), data);
        let mut response = Response::with_exchange(exchange.as_mut());
        let produced = self.producer.produce(&mut request, &mut response);
        let (continued, fresh_data) = response.into_outcome();
        let carried = fresh_data.or_else(|| request.into_data());
        produced.map_err(DispatchError::Producer)?;

        let mut state = state_cell.borrow_mut();
        if state.being_deleted {
            // The producer tore the resource down from inside its own
            // callback; the arena is already drained. Abandon the exchange.
            debug!("resource torn down during producer callback; abandoning response");
            return Ok(());
        }
        if continued {
            if let Some(token) = token {
                if state.continuations.reattach(token) {
                    exchange.flush(FlushMode::Pending(token));
                    state.continuations.park(token, parts, exchange, carried);
                    return Ok(());
                }
                // Continuation requested but the record is gone: there is
                // nothing left to resume, so the dispatch completes.
            } else {
                let token = state.continuations.insert();
                exchange.flush(FlushMode::Pending(token));
                state.continuations.park(token, parts, exchange, carried);
                return Ok(());
            }
        }
        if let Some(token) = token {
            state.continuations.remove(token);
        }
        exchange.flush(FlushMode::Done);
        Ok(())
    }

    fn write_sync(
        &self,
        parameters: &ParamMap,
        files: &FileMap,
        out: &mut dyn io::Write,
    ) -> Result<()> {
        let lock = Arc::clone(&self.lock);
        let guard = lock.lock();
        let mut data: ContinuationData = None;
        let mut resuming = false;
        loop {
            if guard.borrow().being_deleted {
                return Ok(());
            }
            let mut request = Request::new(parameters, files, resuming, data.take());
            let mut response = Response::with_sink(&mut *out);
            let produced = self.producer.produce(&mut request, &mut response);
            let (continued, fresh_data) = response.into_outcome();
            let carried = fresh_data.or_else(|| request.into_data());
            produced.map_err(DispatchError::Producer)?;
            if !continued {
                break;
            }
            data = carried;
            resuming = true;
        }
        out.flush()?;
        Ok(())
    }

    fn teardown(&self) {
        let lock = Arc::clone(&self.lock);
        let guard = lock.lock();
        let mut state = guard.borrow_mut();
        if state.being_deleted {
            return;
        }
        state.being_deleted = true;
        let stopped = state.continuations.drain_stop();
        let exposure = state.exposure.take();
        drop(state);
        // Held exchanges die here, outside the state borrow; a transport
        // `Drop` impl may call back into this resource.
        drop(stopped);
        if let Some((registry, id)) = exposure {
            registry.remove(&id);
        }
    }
}

impl<P: Producer> Dispatchable for Shared<P> {
    fn dispatch(
        &self,
        parts: RequestParts,
        exchange: Box<dyn Exchange>,
        session: Option<SessionGuard>,
    ) -> Result<()> {
        Self::dispatch(self, parts, exchange, session)
    }

    fn resume(&self, token: ContinuationToken) { Self::resume(self, token); }

    fn write_sync(
        &self,
        parameters: &ParamMap,
        files: &FileMap,
        out: &mut dyn io::Write,
    ) -> Result<()> {
        Self::write_sync(self, parameters, files, out)
    }

    fn teardown(&self) { Self::teardown(self); }
}

/// The unit of dispatch: owns its continuations, its producer, and its
/// registration with an exposure registry.
///
/// Dropping the `Resource` runs [`teardown`](Resource::teardown), so a
/// resource owned by application state cleans up its outstanding
/// continuations and registry entry automatically.
///
/// ```
/// use std::io::Write;
///
/// use reprise::{BoxError, Request, Resource, Response};
///
/// let resource = Resource::new(
///     |_request: &mut Request<'_>, response: &mut Response<'_>| -> Result<(), BoxError> {
///         response.write_all(b"report")?;
///         Ok(())
///     },
/// );
/// let mut out = Vec::new();
/// resource
///     .write_sync(&Default::default(), &Default::default(), &mut out)
///     .expect("synchronous write failed");
/// assert_eq!(out, b"report");
/// ```
pub struct Resource<P: Producer> {
    shared: Arc<Shared<P>>,
}

impl<P: Producer> Resource<P> {
    /// Create a resource around the given producer.
    #[must_use]
    pub fn new(producer: P) -> Self {
        Self {
            shared: Arc::new(Shared {
                producer,
                lock: Arc::new(ReentrantMutex::new(RefCell::new(State::new()))),
            }),
        }
    }

    /// A cloneable, type-erased handle to this resource.
    #[must_use]
    pub fn handle(&self) -> ResourceHandle {
        let arc: Arc<dyn Dispatchable> = self.shared.clone();
        ResourceHandle::from_arc(arc)
    }

    /// Register this resource with `registry` under a generated identifier.
    ///
    /// The resource remembers the registration and deregisters itself at
    /// teardown. Exposing an already exposed resource replaces the previous
    /// registration.
    pub fn expose(&self, registry: &Arc<ExposureRegistry>) -> ResourceId {
        let id = registry.register(&self.handle());
        let previous = {
            let guard = self.shared.lock.lock();
            let mut state = guard.borrow_mut();
            state.exposure.replace((Arc::clone(registry), id))
        };
        if let Some((old_registry, old_id)) = previous {
            old_registry.remove(&old_id);
        }
        id
    }

    /// Advertise `name` for attachment download: every dispatch, including
    /// resumptions, attaches a content-disposition header naming it.
    pub fn suggest_file_name(&self, name: impl Into<String>) {
        let guard = self.shared.lock.lock();
        guard.borrow_mut().suggested_file_name = Some(name.into());
    }

    /// The currently suggested file name, if any.
    #[must_use]
    pub fn suggested_file_name(&self) -> Option<String> {
        let guard = self.shared.lock.lock();
        let state = guard.borrow();
        state.suggested_file_name.clone()
    }

    /// Replace the sink receiving producer failures swallowed on the
    /// resumption path. Defaults to [`LogSink`].
    pub fn set_diagnostics(&self, sink: impl DiagnosticSink + 'static) {
        let guard = self.shared.lock.lock();
        guard.borrow_mut().diagnostics = Arc::new(sink);
    }

    /// Register a hook run by [`set_changed`](Resource::set_changed).
    pub fn on_data_changed(&self, hook: impl Fn() + Send + Sync + 'static) {
        let guard = self.shared.lock.lock();
        guard.borrow_mut().changed_hooks.push(Arc::new(hook));
    }

    /// Announce that the resource's content changed, so interested parties
    /// (typically transport glue) can refresh clients. No-op after
    /// teardown.
    pub fn set_changed(&self) {
        let guard = self.shared.lock.lock();
        let hooks = {
            let state = guard.borrow();
            if state.being_deleted {
                return;
            }
            state.changed_hooks.clone()
        };
        for hook in hooks {
            hook();
        }
    }

    /// Number of continuations currently outstanding. Primarily for
    /// instrumentation and tests.
    #[must_use]
    pub fn outstanding_continuations(&self) -> usize {
        let guard = self.shared.lock.lock();
        let state = guard.borrow();
        state.continuations.outstanding()
    }

    /// Dispatch a fresh, un-suspended request.
    ///
    /// Silently drops the request if the resource is being torn down. If
    /// the caller was holding a session-wide guard, it is released before
    /// the producer runs.
    ///
    /// # Errors
    ///
    /// Propagates a producer failure. The exchange is dropped un-flushed;
    /// the transport observes the abandonment through its own `Drop` or
    /// timeout handling.
    pub fn dispatch(
        &self,
        parts: RequestParts,
        exchange: Box<dyn Exchange>,
        session: Option<SessionGuard>,
    ) -> Result<()> {
        self.shared.dispatch(parts, exchange, session)
    }

    /// Resume a suspended dispatch.
    ///
    /// Each token is good for exactly one resumption; duplicate, stale, or
    /// post-teardown calls are no-ops. A producer failure here is reported
    /// to the diagnostic sink and suppressed: this is an asynchronous
    /// callback with no caller able to act on it.
    pub fn resume(&self, token: ContinuationToken) { self.shared.resume(token); }

    /// Materialize the full response into `out`, resolving continuations by
    /// re-invoking the producer immediately in the same call stack. No
    /// token escapes this call.
    ///
    /// # Errors
    ///
    /// Propagates producer failures and sink flush failures; unlike a
    /// resumption, this path has a direct caller to report to.
    pub fn write_sync(
        &self,
        parameters: &ParamMap,
        files: &FileMap,
        out: &mut dyn io::Write,
    ) -> Result<()> {
        self.shared.write_sync(parameters, files, out)
    }

    /// Stop serving: marks the resource as being deleted, stops and drops
    /// every outstanding continuation, and deregisters from the exposure
    /// registry. Idempotent, safe to race with an in-flight resumption,
    /// and callable from inside a producer callback on the same thread.
    pub fn teardown(&self) { self.shared.teardown(); }
}

impl<P: Producer> Drop for Resource<P> {
    fn drop(&mut self) { self.shared.teardown(); }
}

impl<P: Producer> fmt::Debug for Resource<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field(
                "outstanding_continuations",
                &self.outstanding_continuations(),
            )
            .finish_non_exhaustive()
    }
}
