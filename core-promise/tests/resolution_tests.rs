//! Settlement, chaining, adoption and thread-affinity behaviour.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::{current_thread_name, settle, Fixture, LOOP_NAME};
use core_promise::{helpers, Promise, PromiseError, PromiseStatus, Resolver, Thenable};

#[test]
fn test_only_first_settlement_counts() {
    let fixture = Fixture::new();
    let (promise, resolver) = Promise::<i32>::pending(fixture.context());

    resolver.resolve(1);
    resolver.resolve(2);
    resolver.reject("too late");

    assert_eq!(settle(&promise).unwrap(), 1);
    assert!(promise.is_fulfilled());
}

#[test]
fn test_first_rejection_counts() {
    let fixture = Fixture::new();
    let (promise, resolver) = Promise::<i32>::pending(fixture.context());
    let other = resolver.clone();

    resolver.reject("first");
    other.resolve(3);
    other.reject("second");

    assert_eq!(settle(&promise).unwrap_err().to_string(), "first");
    assert_eq!(promise.status(), PromiseStatus::Rejected);
}

#[test]
fn test_settlement_from_many_threads_keeps_one_value() {
    let fixture = Fixture::new();
    let (promise, resolver) = Promise::<usize>::pending(fixture.context());

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let resolver = resolver.clone();
            thread::spawn(move || resolver.resolve(n))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let value = settle(&promise).unwrap();
    assert!(value < 8);
    for _ in 0..3 {
        assert_eq!(settle(&promise).unwrap(), value);
    }
}

#[test]
fn test_continuations_run_in_attach_order() {
    let fixture = Fixture::new();
    let (promise, resolver) = Promise::<i32>::pending(fixture.context());
    let log = Arc::new(Mutex::new(Vec::new()));

    let record = |tag: &'static str| {
        let log = Arc::clone(&log);
        move |value: i32| {
            log.lock().unwrap().push(format!("{tag}{value}"));
            Ok(value)
        }
    };

    let a = promise.then(record("a"));
    let b = promise.then(record("b"));
    thread::spawn(move || resolver.resolve(1)).join().unwrap();
    let c = promise.then(record("c"));
    let d = promise.then(record("d"));

    settle(&helpers::all(fixture.context(), vec![a, b, c, d])).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["a1", "b1", "c1", "d1"]);
}

#[test]
fn test_settled_promise_never_runs_callback_inline() {
    let fixture = Fixture::new();
    let context = fixture.context();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (done, done_resolver) = Promise::<()>::pending(context.clone());

    let inner_log = Arc::clone(&log);
    let inner_context = context.clone();
    context
        .post(Box::new(move || {
            let callback_log = Arc::clone(&inner_log);
            Promise::resolved(inner_context, 1).then(move |_| {
                callback_log.lock().unwrap().push("callback");
                done_resolver.resolve(());
                Ok(())
            });
            inner_log.lock().unwrap().push("after then");
        }))
        .unwrap();

    settle(&done).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["after then", "callback"]);
}

#[test]
fn test_continuations_run_on_bound_thread() {
    let fixture = Fixture::new();
    let (promise, resolver) = Promise::<i32>::pending(fixture.context());

    let names = promise
        .then(|value| Ok((value, current_thread_name())))
        .then(|(value, first)| Ok((value + 1, first, current_thread_name())));

    thread::Builder::new()
        .name("settler".into())
        .spawn(move || resolver.resolve(41))
        .unwrap()
        .join()
        .unwrap();

    let (value, first, second) = settle(&names).unwrap();
    assert_eq!(value, 42);
    assert_eq!(first, LOOP_NAME);
    assert_eq!(second, LOOP_NAME);
}

#[test]
fn test_on_and_then_on_move_delivery_to_another_loop() {
    let fixture = Fixture::new();
    let other = fixture.spawn_loop("other-loop");
    let promise = Promise::resolved(fixture.context(), 5);

    let rebound = promise.on(other.context());
    assert!(rebound.context().same_target(&other.context()));
    let via_on = rebound.then(|_| Ok(current_thread_name()));
    let via_then_on = promise.then_on(other.context(), |_| Ok(current_thread_name()));
    let default = promise.then(|_| Ok(current_thread_name()));

    assert_eq!(settle(&via_on).unwrap(), "other-loop");
    assert_eq!(settle(&via_then_on).unwrap(), "other-loop");
    assert_eq!(settle(&default).unwrap(), LOOP_NAME);
}

#[test]
fn test_rejection_passes_through_then() {
    let fixture = Fixture::new();
    let touched = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&touched);

    let chained = Promise::<i32>::rejected(fixture.context(), "broken")
        .then(move |value| {
            flag.store(true, Ordering::SeqCst);
            Ok(value + 1)
        })
        .then(|value| Ok(value * 2));

    assert_eq!(settle(&chained).unwrap_err().to_string(), "broken");
    assert!(!touched.load(Ordering::SeqCst));
}

#[test]
fn test_fail_recovers_and_fulfillment_skips_it() {
    let fixture = Fixture::new();
    let recovered = Promise::<i32>::rejected(fixture.context(), "broken")
        .fail(|err| Ok(err.to_string().len() as i32));
    assert_eq!(settle(&recovered).unwrap(), 6);

    let untouched = Promise::resolved(fixture.context(), 9).fail(|_| Ok(0));
    assert_eq!(settle(&untouched).unwrap(), 9);
}

#[test]
fn test_then_or_runs_exactly_one_side() {
    let fixture = Fixture::new();
    let fulfilled = Promise::resolved(fixture.context(), 2)
        .then_or(|value| Ok(format!("ok {value}")), |err| Ok(format!("err {err}")));
    let rejected = Promise::<i32>::rejected(fixture.context(), "bad")
        .then_or(|value| Ok(format!("ok {value}")), |err| Ok(format!("err {err}")));

    assert_eq!(settle(&fulfilled).unwrap(), "ok 2");
    assert_eq!(settle(&rejected).unwrap(), "err bad");
}

#[derive(Debug, thiserror::Error)]
#[error("quota exceeded by {0}")]
struct QuotaExceeded(u32);

#[test]
fn test_fail_on_only_handles_matching_errors() {
    let fixture = Fixture::new();

    let handled = Promise::<u32>::rejected(fixture.context(), PromiseError::new(QuotaExceeded(3)))
        .fail_on::<QuotaExceeded, _, _>(|quota| Ok(quota.0 * 10));
    assert_eq!(settle(&handled).unwrap(), 30);

    let passed = Promise::<u32>::rejected(fixture.context(), "unrelated")
        .fail_on::<QuotaExceeded, _, _>(|quota| Ok(quota.0));
    assert_eq!(settle(&passed).unwrap_err().to_string(), "unrelated");
}

#[test]
fn test_callback_error_rejects_chain() {
    let fixture = Fixture::new();
    let chained = Promise::resolved(fixture.context(), 1)
        .then(|_| Err::<i32, _>(PromiseError::msg("callback failed")))
        .then(|value| Ok(value + 1));

    assert_eq!(settle(&chained).unwrap_err().to_string(), "callback failed");
}

#[test]
fn test_callback_panic_becomes_rejection() {
    let fixture = Fixture::new();
    let chained = Promise::resolved(fixture.context(), 1).then(|_| -> Result<i32, PromiseError> {
        panic!("exploded");
    });

    match settle(&chained) {
        Err(PromiseError::Panicked(message)) => assert_eq!(message, "exploded"),
        other => panic!("unexpected outcome: {other:?}"),
    }

    // The loop survives and keeps delivering.
    let after = Promise::resolved(fixture.context(), 2).then(|v| Ok(v * 2));
    assert_eq!(settle(&after).unwrap(), 4);
}

#[test]
fn test_executor_runs_synchronously_and_panics_reject() {
    let fixture = Fixture::new();
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);

    let promise = Promise::new(fixture.context(), move |resolver| {
        flag.store(true, Ordering::SeqCst);
        resolver.resolve("ready".to_string());
    });
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(settle(&promise).unwrap(), "ready");

    let panicked = Promise::<i32>::new(fixture.context(), |_resolver| panic!("no executor"));
    assert!(matches!(settle(&panicked), Err(PromiseError::Panicked(_))));
}

#[test]
fn test_executor_can_settle_later_from_another_thread() {
    let fixture = Fixture::new();
    let promise = Promise::new(fixture.context(), |resolver: Resolver<u64>| {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resolver.resolve(64);
        });
    });

    assert!(promise.is_pending());
    assert_eq!(settle(&promise).unwrap(), 64);
}

#[test]
fn test_dropping_every_resolver_abandons_promise() {
    let fixture = Fixture::new();
    let (promise, resolver) = Promise::<i32>::pending(fixture.context());
    let chained = promise.then(|v| Ok(v + 1));
    let clone = resolver.clone();

    drop(resolver);
    assert!(promise.is_pending());
    drop(clone);

    assert!(settle(&promise).unwrap_err().is_abandoned());
    assert!(settle(&chained).unwrap_err().is_abandoned());
}

#[test]
fn test_closed_loop_abandons_dependent_chain() {
    let fixture = Fixture::new();
    let doomed = fixture.spawn_loop("doomed-loop");
    let (promise, resolver) = Promise::<i32>::pending(doomed.context());
    let chained = promise.then(|v| Ok(v + 1));

    doomed.shutdown().unwrap();
    resolver.resolve(1);

    assert!(settle(&chained).unwrap_err().is_abandoned());
}

#[test]
fn test_closed_loop_abandons_long_chain() {
    let fixture = Fixture::new();
    let doomed = fixture.spawn_loop("doomed-loop");
    let (head, resolver) = Promise::<u64>::pending(doomed.context());
    let mut tail = head.then(|v| Ok(v + 1));
    for _ in 0..20_000 {
        tail = tail.then(|v| Ok(v + 1));
    }

    doomed.shutdown().unwrap();
    resolver.resolve(1);

    assert!(settle(&tail).unwrap_err().is_abandoned());
}

#[test]
fn test_adopts_pending_promise() {
    let fixture = Fixture::new();
    let (outer, outer_resolver) = Promise::<String>::pending(fixture.context());
    let (inner, inner_resolver) = Promise::<String>::pending(fixture.context());

    outer_resolver.settle(inner);
    assert!(outer.is_pending());

    thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        inner_resolver.resolve("x".to_string());
    });

    assert_eq!(settle(&outer).unwrap(), "x");
}

#[test]
fn test_then_returning_promise_is_flattened() {
    let fixture = Fixture::new();
    let context = fixture.context();
    let chained = Promise::resolved(context.clone(), 3)
        .then(move |value| helpers::delayed_resolve(context, value * 3, Duration::from_millis(10)))
        .then(|value| Ok(value + 1));

    assert_eq!(settle(&chained).unwrap(), 10);
}

#[test]
fn test_adopted_promise_ignores_later_owner_calls() {
    let fixture = Fixture::new();
    let (outer, outer_resolver) = Promise::<i32>::pending(fixture.context());
    let (inner, inner_resolver) = Promise::<i32>::pending(fixture.context());

    outer_resolver.adopt(inner);
    outer_resolver.resolve(5);
    outer_resolver.reject("ignored");
    assert!(outer.is_pending());

    inner_resolver.resolve(9);
    assert_eq!(settle(&outer).unwrap(), 9);
}

#[test]
fn test_adoption_forwards_rejection() {
    let fixture = Fixture::new();
    let (outer, outer_resolver) = Promise::<i32>::pending(fixture.context());
    outer_resolver.adopt(Promise::<i32>::rejected(fixture.context(), "inner failed"));

    assert_eq!(settle(&outer).unwrap_err().to_string(), "inner failed");
}

#[test]
fn test_self_resolution_is_circular() {
    let fixture = Fixture::new();
    let (promise, resolver) = Promise::<i32>::pending(fixture.context());

    resolver.adopt(promise.clone());

    assert!(matches!(
        settle(&promise),
        Err(PromiseError::CircularResolution)
    ));
}

#[test]
fn test_indirect_cycle_is_circular() {
    let fixture = Fixture::new();
    let (a, a_resolver) = Promise::<i32>::pending(fixture.context());
    let (b, b_resolver) = Promise::<i32>::pending(fixture.context());

    a_resolver.adopt(b.clone());
    b_resolver.adopt(a.clone());

    assert!(matches!(settle(&b), Err(PromiseError::CircularResolution)));
    assert!(matches!(settle(&a), Err(PromiseError::CircularResolution)));
}

/// A thenable that is not an engine promise and misbehaves by settling
/// several times.
struct NoisyThenable(i32);

impl Thenable<i32> for NoisyThenable {
    fn subscribe(self, resolver: Resolver<i32>) {
        thread::spawn(move || {
            resolver.resolve(self.0);
            resolver.resolve(self.0 + 1);
            resolver.reject("late rejection");
        });
    }
}

#[test]
fn test_foreign_thenable_first_call_wins() {
    let fixture = Fixture::new();
    let promise = Promise::from_thenable(fixture.context(), NoisyThenable(7));

    assert_eq!(settle(&promise).unwrap(), 7);
}

/// A thenable that hands back the promise it is resolving.
struct EchoThenable(Promise<i32>);

impl Thenable<i32> for EchoThenable {
    fn subscribe(self, resolver: Resolver<i32>) {
        resolver.adopt(self.0);
    }
}

#[test]
fn test_foreign_thenable_resolving_with_self_is_circular() {
    let fixture = Fixture::new();
    let (promise, resolver) = Promise::<i32>::pending(fixture.context());

    resolver.adopt(EchoThenable(promise.clone()));

    assert!(matches!(
        settle(&promise),
        Err(PromiseError::CircularResolution)
    ));
}

#[test]
fn test_wait_timeout_on_pending_promise() {
    let fixture = Fixture::new();
    let (promise, _resolver) = Promise::<i32>::pending(fixture.context());

    assert!(promise.wait_timeout(Duration::from_millis(20)).is_none());
    assert!(promise.is_pending());
}
