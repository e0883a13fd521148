//! Reentrancy: producers calling back into their own resource on the same
//! thread, including the synchronous loop and mid-dispatch teardown.

mod common;

use std::{
    io::Write,
    sync::{Arc, OnceLock},
};

use common::params;
use reprise::{
    BoxError,
    BufferedExchange,
    ExposureRegistry,
    FileMap,
    ParamMap,
    Request,
    RequestParts,
    Resource,
    ResourceHandle,
    Response,
};

/// Producer answering directly for "inner" requests and re-entering its own
/// resource through the synchronous loop otherwise.
fn nesting_producer(handle_cell: &Arc<OnceLock<ResourceHandle>>) -> impl reprise::Producer {
    let handle_cell = Arc::clone(handle_cell);
    move |request: &mut Request<'_>, response: &mut Response<'_>| -> Result<(), BoxError> {
        if request.parameter("inner").is_some() {
            write!(response, "inner;")?;
            return Ok(());
        }
        let handle = handle_cell.get().expect("handle not installed");
        let mut nested = Vec::new();
        handle.write_sync(&params(&[("inner", "1")]), &FileMap::new(), &mut nested)?;
        response.write_all(&nested)?;
        write!(response, "outer")?;
        Ok(())
    }
}

#[test]
fn producer_can_reenter_its_resource_through_the_sync_loop() {
    let handle_cell = Arc::new(OnceLock::new());
    let resource = Resource::new(nesting_producer(&handle_cell));
    assert!(handle_cell.set(resource.handle()).is_ok());

    let mut out = Vec::new();
    resource
        .write_sync(&ParamMap::new(), &FileMap::new(), &mut out)
        .expect("reentrant write_sync failed");

    assert_eq!(out, b"inner;outer");
}

#[test]
fn producer_can_reenter_its_resource_during_a_transport_dispatch() {
    let handle_cell = Arc::new(OnceLock::new());
    let resource = Resource::new(nesting_producer(&handle_cell));
    assert!(handle_cell.set(resource.handle()).is_ok());

    let (exchange, probe) = BufferedExchange::with_probe();
    resource
        .dispatch(RequestParts::default(), Box::new(exchange), None)
        .expect("reentrant dispatch failed");

    assert_eq!(&probe.body()[..], b"inner;outer");
}

#[test]
fn producer_can_dispatch_a_second_exchange_on_its_own_resource() {
    let handle_cell: Arc<OnceLock<ResourceHandle>> = Arc::new(OnceLock::new());
    let producer_cell = Arc::clone(&handle_cell);
    let resource = Resource::new(
        move |request: &mut Request<'_>, response: &mut Response<'_>| -> Result<(), BoxError> {
            if request.parameter("inner").is_some() {
                write!(response, "inner")?;
                return Ok(());
            }
            let handle = producer_cell.get().expect("handle not installed");
            let (inner_exchange, inner_probe) = BufferedExchange::with_probe();
            let inner_parts = RequestParts {
                parameters: params(&[("inner", "1")]),
                uploads: FileMap::new(),
            };
            handle.dispatch(inner_parts, Box::new(inner_exchange), None)?;
            assert_eq!(&inner_probe.body()[..], b"inner");
            write!(response, "outer")?;
            Ok(())
        },
    );
    assert!(handle_cell.set(resource.handle()).is_ok());

    let (exchange, probe) = BufferedExchange::with_probe();
    resource
        .dispatch(RequestParts::default(), Box::new(exchange), None)
        .expect("reentrant dispatch failed");

    assert_eq!(&probe.body()[..], b"outer");
}

#[test]
fn producer_tearing_down_its_own_resource_abandons_the_dispatch() {
    let registry = Arc::new(ExposureRegistry::new());
    let handle_cell: Arc<OnceLock<ResourceHandle>> = Arc::new(OnceLock::new());
    let producer_cell = Arc::clone(&handle_cell);
    let resource = Resource::new(
        move |_request: &mut Request<'_>, response: &mut Response<'_>| -> Result<(), BoxError> {
            let handle = producer_cell.get().expect("handle not installed");
            handle.teardown();
            // A continuation request after self-teardown has no reachable
            // target; the dispatch must wind down instead of suspending.
            response.request_continuation();
            Ok(())
        },
    );
    assert!(handle_cell.set(resource.handle()).is_ok());
    let id = resource.expose(&registry);

    let (exchange, probe) = BufferedExchange::with_probe();
    resource
        .dispatch(RequestParts::default(), Box::new(exchange), None)
        .expect("dispatch failed");

    assert!(probe.flushes().is_empty(), "no terminal flush after self-teardown");
    assert!(probe.is_dropped());
    assert_eq!(resource.outstanding_continuations(), 0);
    assert!(registry.get(&id).is_none());
}
