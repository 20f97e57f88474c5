//! # Relentless
//!
//! > *Keep calling until it works.*
//!
//! A Rust library that wraps a fallible async operation into one that always
//! eventually succeeds: failures are retried with geometric backoff, logged,
//! and surfaced to users through an error registry until the call goes through.
//!
//! ## Quick Example
//!
//! ```rust
//! use relentless::prelude::*;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let registry = Arc::new(InMemoryRegistry::new());
//! let factory = RetryFactory::new(registry.clone(), || {})
//!     .with_config(RetryConfig::default().with_initial_delay(Duration::from_millis(1)))
//!     .unwrap();
//!
//! let attempts = Arc::new(AtomicU32::new(0));
//! let load_page = factory.retrying(
//!     RetryOptions::new({
//!         let attempts = attempts.clone();
//!         move |(book, page): (String, u32)| {
//!             let n = attempts.fetch_add(1, Ordering::SeqCst);
//!             async move {
//!                 if n < 2 {
//!                     Err(format!("{} {} unavailable", book, page))
//!                 } else {
//!                     Ok(format!("text of {} {}", book, page))
//!                 }
//!             }
//!         }
//!     })
//!     .create_error(|(book, page)| Some(format!("Error loading {} {}", book, page))),
//! );
//!
//! let text = load_page.call(("Berakhot".to_string(), 2)).await;
//! assert_eq!(text, "text of Berakhot 2");
//! assert_eq!(attempts.load(Ordering::SeqCst), 3);
//! assert!(registry.is_empty());
//! # });
//! ```
//!
//! See the [`retry`] module for the full picture.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod retry;
pub mod testing;

// Re-exports
pub use retry::{
    ConfigError, DiagnosticLogger, ErrorRegistry, FailureReport, InMemoryRegistry,
    JitterStrategy, Pending, RetryConfig, RetryFactory, RetryOptions, RetrySession, RetryingFn,
    SessionId, SessionState, TracingLogger,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::retry::{
        ErrorRegistry, InMemoryRegistry, Pending, RetryConfig, RetryFactory, RetryOptions,
        RetryingFn, SessionId,
    };
}
