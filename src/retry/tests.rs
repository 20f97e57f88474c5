//! Integration tests for the retry loop.

use super::*;
use crate::testing::{ChangeCounter, RecordingLogger, RecordingRegistry, RegistryEvent};
use futures::FutureExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

fn quiet_factory(registry: Arc<RecordingRegistry>) -> RetryFactory {
    RetryFactory::new(registry, || {}).with_logger(RecordingLogger::new())
}

type Attempt = futures::future::Ready<Result<(), &'static str>>;

/// An operation that fails until its `success_on`-th attempt.
fn succeed_on(attempts: Arc<AtomicU32>, success_on: u32) -> impl Fn(()) -> Attempt {
    move |()| {
        let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        futures::future::ready(if n == success_on {
            Ok(())
        } else {
            Err("transient failure")
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_retries_until_success() {
    let attempts = Arc::new(AtomicU32::new(0));
    let factory = quiet_factory(Arc::new(RecordingRegistry::new()));

    let retrying = factory.retrying(RetryOptions::new(succeed_on(attempts.clone(), 3)));
    retrying.call(()).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_exponential_backoff_timing() {
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let factory = quiet_factory(Arc::new(RecordingRegistry::new()));

    let retrying = factory.retrying(RetryOptions::new({
        let stamps = stamps.clone();
        move |()| {
            let mut stamps = stamps.lock().unwrap();
            stamps.push(Instant::now());
            let n = stamps.len();
            async move {
                if n == 6 {
                    Ok(())
                } else {
                    Err("retry")
                }
            }
        }
    }));
    retrying.call(()).await;

    let stamps = stamps.lock().unwrap();
    assert_eq!(stamps.len(), 6);
    let expected = [
        Duration::from_millis(200),
        Duration::from_millis(300),
        Duration::from_millis(450),
        Duration::from_millis(675),
        Duration::from_micros(1_012_500),
    ];
    for (i, want) in expected.iter().enumerate() {
        let gap = stamps[i + 1] - stamps[i];
        assert!(gap >= *want, "gap {} was {:?}, expected >= {:?}", i, gap, want);
        assert!(
            gap < *want + Duration::from_millis(10),
            "gap {} was {:?}, expected < {:?}",
            i,
            gap,
            *want + Duration::from_millis(10)
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_args_are_retained_across_retries() {
    type Args = (&'static str, &'static str, &'static str, i32, i32, i32);
    let received: Arc<Mutex<Vec<Args>>> = Arc::new(Mutex::new(Vec::new()));
    let factory = quiet_factory(Arc::new(RecordingRegistry::new()));

    let retrying = factory.retrying(RetryOptions::new({
        let received = received.clone();
        move |args: Args| {
            let mut received = received.lock().unwrap();
            received.push(args);
            let n = received.len();
            async move {
                if n == 3 {
                    Ok("pass along arg")
                } else {
                    Err("pass along arg")
                }
            }
        }
    }));

    let value = retrying.call(("a", "b", "c", 1, 2, 3)).await;

    assert_eq!(value, "pass along arg");
    assert_eq!(*received.lock().unwrap(), vec![("a", "b", "c", 1, 2, 3); 3]);
}

#[tokio::test(start_paused = true)]
async fn test_error_message_ids_and_creation() {
    let registry = Arc::new(RecordingRegistry::new());
    let factory = quiet_factory(registry.clone());

    let outer = factory.retrying(
        RetryOptions::new(succeed_on(Arc::new(AtomicU32::new(0)), 3))
            .create_error(|_| Some("Outer error".to_string())),
    );
    outer.call(()).await;

    let inner = factory.retrying(
        RetryOptions::new(succeed_on(Arc::new(AtomicU32::new(0)), 3))
            .create_error(|_| Some("Inner error".to_string())),
    );
    inner.call(()).await;

    let events = registry.events();
    assert_eq!(events.len(), 6);

    assert_eq!(events[0], events[1]);
    assert!(matches!(&events[0], RegistryEvent::Add { message, .. } if message == "Outer error"));
    assert!(matches!(events[2], RegistryEvent::Remove { .. }));
    assert_eq!(events[3], events[4]);
    assert!(matches!(&events[3], RegistryEvent::Add { message, .. } if message == "Inner error"));
    assert!(matches!(events[5], RegistryEvent::Remove { .. }));

    assert_eq!(events[0].id(), events[2].id());
    assert_eq!(events[3].id(), events[5].id());
    assert_ne!(events[0].id(), events[3].id());
}

#[tokio::test(start_paused = true)]
async fn test_change_notifications_follow_registry() {
    let changes = ChangeCounter::new();
    let factory = RetryFactory::new(Arc::new(RecordingRegistry::new()), changes.notifier())
        .with_logger(RecordingLogger::new());

    let retrying = factory.retrying(
        RetryOptions::new(succeed_on(Arc::new(AtomicU32::new(0)), 3))
            .create_error(|_| Some("shown".to_string())),
    );
    retrying.call(()).await;

    // Two adds and one remove.
    assert_eq!(changes.count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_empty_message_registers_nothing() {
    let registry = Arc::new(RecordingRegistry::new());
    let changes = ChangeCounter::new();
    let factory =
        RetryFactory::new(registry.clone(), changes.notifier()).with_logger(RecordingLogger::new());

    let calls = Arc::new(AtomicU32::new(0));
    let retrying = factory.retrying(
        RetryOptions::new(succeed_on(Arc::new(AtomicU32::new(0)), 4)).create_error({
            let calls = calls.clone();
            move |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    None
                } else {
                    Some(String::new())
                }
            }
        }),
    );
    retrying.call(()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let events = registry.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], RegistryEvent::Remove { .. }));
    assert_eq!(changes.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_then_runs_once_with_success_value() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let factory = quiet_factory(Arc::new(RecordingRegistry::new()));

    let attempts = Arc::new(AtomicU32::new(0));
    let retrying = factory.retrying(
        RetryOptions::new({
            let attempts = attempts.clone();
            move |x: u32| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("nope")
                    } else {
                        Ok(x * 2)
                    }
                }
            }
        })
        .then({
            let seen = seen.clone();
            move |v: &u32| seen.lock().unwrap().push(*v)
        }),
    );

    assert_eq!(retrying.call(21).await, 42);
    assert_eq!(*seen.lock().unwrap(), vec![42]);
}

#[tokio::test(start_paused = true)]
async fn test_loop_continues_after_caller_drops_pending() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let attempts = Arc::new(AtomicU32::new(0));
    let factory = quiet_factory(Arc::new(RecordingRegistry::new()));

    let retrying = factory.retrying(
        RetryOptions::new(succeed_on(attempts.clone(), 2)).then(move |_| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        }),
    );
    drop(retrying.call(()));

    rx.await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_call_returns_before_first_attempt_completes() {
    let attempts = Arc::new(AtomicU32::new(0));
    let factory = quiet_factory(Arc::new(RecordingRegistry::new()));
    let retrying = factory.retrying(RetryOptions::new(succeed_on(attempts.clone(), 1)));

    let mut pending = retrying.call(());
    // Single-threaded runtime: the spawned loop has not been scheduled yet.
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
    assert!((&mut pending).now_or_never().is_none());
    pending.await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sessions_are_isolated() {
    let registry = Arc::new(RecordingRegistry::new());
    let factory = quiet_factory(registry.clone());

    let retrying = factory.retrying(
        RetryOptions::new(|n: u32| async move {
            // Each call fails on its first attempt only.
            static SEEN: Mutex<Vec<u32>> = Mutex::new(Vec::new());
            let mut seen = SEEN.lock().unwrap();
            if seen.contains(&n) {
                Ok(n)
            } else {
                seen.push(n);
                Err("first try")
            }
        })
        .create_error(|n| Some(format!("call {} failed", n))),
    );

    let first = retrying.call(1);
    let second = retrying.call(2);
    let (first_id, second_id) = (first.session_id(), second.session_id());
    assert_ne!(first_id, second_id);

    let (a, b) = tokio::join!(first, second);
    assert_eq!((a, b), (1, 2));

    assert_eq!(
        registry.events_for(&first_id),
        vec![
            RegistryEvent::Add {
                id: first_id,
                message: "call 1 failed".to_string()
            },
            RegistryEvent::Remove { id: first_id },
        ]
    );
    assert_eq!(
        registry.events_for(&second_id),
        vec![
            RegistryEvent::Add {
                id: second_id,
                message: "call 2 failed".to_string()
            },
            RegistryEvent::Remove { id: second_id },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_logger_sees_every_failure() {
    let logger = RecordingLogger::new();
    let factory =
        RetryFactory::new(Arc::new(RecordingRegistry::new()), || {}).with_logger(logger.clone());

    let retrying = factory.retrying(
        RetryOptions::new(succeed_on(Arc::new(AtomicU32::new(0)), 4)).label("fetch amud"),
    );
    let pending = retrying.call(());
    let id = pending.session_id();
    pending.await;

    let failures = logger.failures();
    assert_eq!(failures.len(), 3);
    assert!(failures.iter().all(|f| f.session == id));
    assert!(failures.iter().all(|f| f.label.as_deref() == Some("fetch amud")));
    assert!(failures.iter().all(|f| f.error.contains("transient failure")));
    assert_eq!(
        failures.iter().map(|f| f.attempt).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(
        failures.iter().map(|f| f.next_delay).collect::<Vec<_>>(),
        vec![
            Duration::from_millis(200),
            Duration::from_millis(300),
            Duration::from_millis(450),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_custom_config_changes_schedule() {
    let logger = RecordingLogger::new();
    let factory = RetryFactory::new(Arc::new(RecordingRegistry::new()), || {})
        .with_logger(logger.clone())
        .with_config(
            RetryConfig::default()
                .with_initial_delay(Duration::from_millis(10))
                .with_factor(2.0),
        )
        .unwrap();

    let retrying =
        factory.retrying(RetryOptions::new(succeed_on(Arc::new(AtomicU32::new(0)), 4)));
    retrying.call(()).await;

    assert_eq!(
        logger
            .failures()
            .iter()
            .map(|f| f.next_delay)
            .collect::<Vec<_>>(),
        vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(40),
        ]
    );
}

#[test]
fn test_with_config_rejects_invalid() {
    let factory = RetryFactory::new(Arc::new(InMemoryRegistry::new()), || {});
    let err = factory
        .with_config(RetryConfig::default().with_factor(0.9))
        .unwrap_err();
    assert_eq!(err, ConfigError::NonGrowingFactor(0.9));
}

#[tokio::test(start_paused = true)]
async fn test_in_memory_registry_clears_on_success() {
    let registry = Arc::new(InMemoryRegistry::new());
    let factory = RetryFactory::new(registry.clone(), || {}).with_logger(RecordingLogger::new());

    let gate = Arc::new(AtomicU32::new(0));
    let retrying = factory.retrying(
        RetryOptions::new({
            let gate = gate.clone();
            move |()| {
                let open = gate.load(Ordering::SeqCst) == 1;
                async move {
                    if open {
                        Ok(())
                    } else {
                        Err("closed")
                    }
                }
            }
        })
        .create_error(|_| Some("Gate closed".to_string())),
    );

    let pending = retrying.call(());
    let id = pending.session_id();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(registry.get(&id), Some("Gate closed".to_string()));

    gate.store(1, Ordering::SeqCst);
    pending.await;
    assert!(registry.is_empty());
}
