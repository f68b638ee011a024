//! Awaiting promises from async code.

mod common;

use std::future::IntoFuture;
use std::time::Duration;

use common::Fixture;
use core_promise::{helpers, Promise, PromiseError};

#[tokio::test]
async fn test_await_fulfilled_promise() {
    let fixture = Fixture::new();
    let promise = Promise::resolved(fixture.context(), 21).then(|v| Ok(v * 2));

    assert_eq!(promise.await.unwrap(), 42);
}

#[tokio::test]
async fn test_await_rejected_promise() {
    let fixture = Fixture::new();
    let promise = helpers::delayed_reject::<i32>(fixture.context(), "late", Duration::from_millis(10));

    assert_eq!(promise.await.unwrap_err().to_string(), "late");
}

#[tokio::test]
async fn test_await_with_closed_loop_is_abandoned() {
    let fixture = Fixture::new();
    let doomed = fixture.spawn_loop("doomed-loop");
    let (promise, resolver) = Promise::<i32>::pending(doomed.context());
    let future = promise.into_future();

    doomed.shutdown().unwrap();
    resolver.resolve(1);

    assert!(matches!(future.await, Err(PromiseError::Abandoned)));
}
