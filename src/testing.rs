//! Testing utilities for code built on retrying functions.
//!
//! The retry loop talks to three collaborators: an error registry, a change
//! notifier and a diagnostic logger. This module provides recording versions
//! of each so tests can assert on exactly what the loop did.
//!
//! # Examples
//!
//! ```rust
//! use relentless::testing::{ChangeCounter, RecordingLogger, RecordingRegistry, RegistryEvent};
//! use relentless::{RetryConfig, RetryFactory, RetryOptions};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let registry = Arc::new(RecordingRegistry::new());
//! let changes = ChangeCounter::new();
//! let logger = RecordingLogger::new();
//! let factory = RetryFactory::new(registry.clone(), changes.notifier())
//!     .with_logger(logger.clone())
//!     .with_config(RetryConfig::default().with_initial_delay(Duration::from_millis(1)))
//!     .unwrap();
//!
//! let tries = Arc::new(AtomicU32::new(0));
//! let flaky = factory.retrying(
//!     RetryOptions::new({
//!         let tries = tries.clone();
//!         move |()| {
//!             let n = tries.fetch_add(1, Ordering::SeqCst);
//!             async move { if n == 0 { Err("down") } else { Ok(()) } }
//!         }
//!     })
//!     .create_error(|_| Some("Service unavailable".to_string())),
//! );
//!
//! flaky.call(()).await;
//!
//! let events = registry.events();
//! assert!(matches!(events[0], RegistryEvent::Add { .. }));
//! assert!(matches!(events[1], RegistryEvent::Remove { .. }));
//! assert_eq!(changes.count(), 2);
//! assert_eq!(logger.failures().len(), 1);
//! # });
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::retry::{DiagnosticLogger, ErrorRegistry, FailureReport, SessionId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One call made against a [`RecordingRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// `add(id, message)` was called.
    Add {
        /// Session id passed to `add`.
        id: SessionId,
        /// Message passed to `add`.
        message: String,
    },
    /// `remove(id)` was called.
    Remove {
        /// Session id passed to `remove`.
        id: SessionId,
    },
}

impl RegistryEvent {
    /// The session id this event was keyed by.
    pub fn id(&self) -> SessionId {
        match self {
            Self::Add { id, .. } | Self::Remove { id } => *id,
        }
    }
}

/// An [`ErrorRegistry`] that records every call in order.
#[derive(Debug, Default)]
pub struct RecordingRegistry {
    events: Mutex<Vec<RegistryEvent>>,
}

impl RecordingRegistry {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call seen so far.
    pub fn events(&self) -> Vec<RegistryEvent> {
        lock(&self.events).clone()
    }

    /// Calls keyed by one session.
    pub fn events_for(&self, id: &SessionId) -> Vec<RegistryEvent> {
        lock(&self.events)
            .iter()
            .filter(|e| e.id() == *id)
            .cloned()
            .collect()
    }
}

impl ErrorRegistry for RecordingRegistry {
    fn add(&self, id: &SessionId, message: &str) {
        lock(&self.events).push(RegistryEvent::Add {
            id: *id,
            message: message.to_string(),
        });
    }

    fn remove(&self, id: &SessionId) {
        lock(&self.events).push(RegistryEvent::Remove { id: *id });
    }
}

/// An owned copy of a [`FailureReport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFailure {
    /// Session the attempt belonged to.
    pub session: SessionId,
    /// Which attempt failed (1-indexed).
    pub attempt: u32,
    /// `Debug` rendering of the failure value.
    pub error: String,
    /// Operation label, if any.
    pub label: Option<String>,
    /// Wait before the next attempt.
    pub next_delay: Duration,
}

/// A [`DiagnosticLogger`] that keeps every report. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    failures: Arc<Mutex<Vec<RecordedFailure>>>,
}

impl RecordingLogger {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every failure reported so far.
    pub fn failures(&self) -> Vec<RecordedFailure> {
        lock(&self.failures).clone()
    }
}

impl DiagnosticLogger for RecordingLogger {
    fn log_failure(&self, report: &FailureReport<'_>) {
        lock(&self.failures).push(RecordedFailure {
            session: report.session,
            attempt: report.attempt,
            error: format!("{:?}", report.error),
            label: report.label.map(str::to_string),
            next_delay: report.next_delay,
        });
    }
}

/// Counts change notifications.
#[derive(Debug, Clone, Default)]
pub struct ChangeCounter {
    count: Arc<AtomicUsize>,
}

impl ChangeCounter {
    /// Create a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// A change-notification callback that increments this counter.
    pub fn notifier(&self) -> impl Fn() + Send + Sync + 'static {
        let count = Arc::clone(&self.count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Notifications received so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}
