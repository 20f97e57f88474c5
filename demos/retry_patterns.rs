//! Retry Patterns Example
//!
//! Demonstrates wrapping flaky async calls so they always eventually succeed.
//! Shows practical patterns including:
//! - Basic retrying with the default 200ms / 1.5x schedule
//! - Surfacing user-visible errors through a registry while a call is failing
//! - Plugging in a custom diagnostic logger
//! - Inspecting the backoff schedule without running anything

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relentless::prelude::*;
use relentless::FailureReport;

// ==================== Basic Retry ====================

/// Example 1: Basic retry
///
/// The operation fails twice, then succeeds. The caller only sees the value.
async fn example_basic_retry(factory: &RetryFactory) {
    println!("\n=== Example 1: Basic Retry ===");

    let attempts = Arc::new(AtomicU32::new(0));
    let retrying = factory.retrying(RetryOptions::new({
        let attempts = attempts.clone();
        move |()| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            println!("  Attempt {}", n + 1);
            async move {
                if n < 2 {
                    Err("transient failure")
                } else {
                    Ok("success!")
                }
            }
        }
    }));

    let value = retrying.call(()).await;
    println!(
        "Success after {} attempts: {}",
        attempts.load(Ordering::SeqCst),
        value
    );
}

// ==================== Visible Errors ====================

/// Example 2: User-visible errors
///
/// While the call keeps failing, the registry shows a message derived from
/// the call's arguments. It disappears once the call goes through.
async fn example_visible_errors(factory: &RetryFactory, registry: &InMemoryRegistry) {
    println!("\n=== Example 2: Visible Errors ===");

    let attempts = Arc::new(AtomicU32::new(0));
    let load_page = factory.retrying(
        RetryOptions::new({
            let attempts = attempts.clone();
            move |(book, page): (String, u32)| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(format!("503 for {} {}", book, page))
                    } else {
                        Ok(format!("<contents of {} {}>", book, page))
                    }
                }
            }
        })
        .create_error(|(book, page)| Some(format!("Error retrieving {} {}", book, page)))
        .label("load page"),
    );

    let pending = load_page.call(("Berakhot".to_string(), 2));
    tokio::time::sleep(Duration::from_millis(60)).await;
    println!("While failing, registry shows: {:?}", registry.messages());

    let text = pending.await;
    println!("Loaded {}; registry now shows: {:?}", text, registry.messages());
}

// ==================== Custom Logger ====================

fn print_failure(report: &FailureReport<'_>) {
    println!(
        "  [{}] attempt {} failed with {:?}; next try in {:?}",
        report.label.unwrap_or("?"),
        report.attempt,
        report.error,
        report.next_delay
    );
}

/// Example 3: Custom diagnostics
///
/// Any function taking a `FailureReport` can replace the default tracing logger.
async fn example_custom_logger(registry: Arc<InMemoryRegistry>) {
    println!("\n=== Example 3: Custom Logger ===");

    let factory = RetryFactory::new(registry, || {})
        .with_logger(print_failure)
        .with_config(RetryConfig::default().with_initial_delay(Duration::from_millis(10)))
        .expect("valid config");

    let attempts = Arc::new(AtomicU32::new(0));
    let retrying = factory.retrying(
        RetryOptions::new({
            let attempts = attempts.clone();
            move |()| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move { if n < 3 { Err(n) } else { Ok(()) } }
            }
        })
        .label("ping"),
    );
    retrying.call(()).await;
}

// ==================== Schedule ====================

/// Example 4: The backoff schedule is plain data.
fn example_schedule() {
    println!("\n=== Example 4: Backoff Schedule ===");

    let config = RetryConfig::default();
    for attempt in 0..6 {
        println!(
            "  wait after failure {}: {:?}",
            attempt + 1,
            config.delay_for_attempt(attempt)
        );
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("Retry Patterns Examples");
    println!("=======================");

    let registry = Arc::new(InMemoryRegistry::new());
    let factory = RetryFactory::new(registry.clone(), || println!("  (errors changed)"))
        .with_config(RetryConfig::default().with_initial_delay(Duration::from_millis(20)))
        .expect("valid config");

    example_basic_retry(&factory).await;
    example_visible_errors(&factory, &registry).await;
    example_custom_logger(registry.clone()).await;
    example_schedule();

    println!("\n=== All examples completed successfully! ===");
}
