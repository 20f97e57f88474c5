//! Retrying async calls that never fail.
//!
//! A [`RetryFactory`] wraps a fallible async operation into a [`RetryingFn`].
//! Each call of the wrapped function starts a [`RetrySession`] that re-invokes
//! the operation with geometric backoff until it succeeds:
//!
//! - **Always succeeds**: the returned [`Pending`] resolves with the success
//!   value and is never an error
//! - **Visible while failing**: an optional message derived from the call's
//!   arguments is kept in an [`ErrorRegistry`] under the session's id, and
//!   cleared when the session finally succeeds
//! - **Observable**: every failure goes to a [`DiagnosticLogger`]
//!   ([`TracingLogger`] by default)
//!
//! # Quick Start
//!
//! ```rust
//! use relentless::{InMemoryRegistry, RetryConfig, RetryFactory, RetryOptions};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let registry = Arc::new(InMemoryRegistry::new());
//! let factory = RetryFactory::new(registry.clone(), || println!("errors changed"))
//!     .with_config(RetryConfig::default().with_initial_delay(Duration::from_millis(5)))
//!     .unwrap();
//!
//! let greet = factory.retrying(
//!     RetryOptions::new(|name: String| async move { Ok::<_, String>(format!("hello {}", name)) })
//!         .create_error(|name| Some(format!("Could not greet {}", name)))
//!         .label("greet"),
//! );
//!
//! assert_eq!(greet.call("world".to_string()).await, "hello world");
//! # });
//! ```
//!
//! # Backoff
//!
//! The first retry waits 200ms and every later wait is 1.5 times the previous
//! one: 200ms, 300ms, 450ms, 675ms, 1012.5ms, ... There is no cap and no
//! retry limit. Jitter can be switched on through [`RetryConfig`] with the
//! `jitter` feature.

mod diagnostics;
mod error;
mod invoker;
mod policy;
mod registry;
mod session;

pub use diagnostics::{DiagnosticLogger, FailureReport, TracingLogger};
pub use error::ConfigError;
pub use invoker::{RetryFactory, RetryOptions, RetryingFn};
pub use policy::{next_delay, JitterStrategy, RetryConfig, BACKOFF_FACTOR, INITIAL_DELAY};
pub use registry::{ErrorRegistry, InMemoryRegistry};
pub use session::{Pending, RetrySession, SessionId, SessionState};

#[cfg(test)]
mod tests;
