//! Per-call retry state.
//!
//! A [`RetrySession`] is created for every fresh call of a
//! [`RetryingFn`](super::RetryingFn) and is owned by the task that drives its
//! retry loop. The caller only ever holds the matching [`Pending`] future.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use uuid::Uuid;

use super::policy::{next_delay, RetryConfig};

/// Observer invoked once with the success value of a session.
pub(crate) type Then<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Process-unique identity of one logical call chain.
///
/// This is the key a session uses in the
/// [`ErrorRegistry`](super::ErrorRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Allocate a fresh identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Allocated, no attempt dispatched yet.
    Created,
    /// An attempt is in flight.
    Attempting,
    /// The last attempt failed and the backoff timer is pending.
    BackingOff,
}

/// State carried across all attempts of one logical call.
///
/// Settling consumes the session, so a settled session can never be
/// revisited.
pub struct RetrySession<A, T> {
    id: SessionId,
    delay: Duration,
    args: A,
    attempts: u32,
    state: SessionState,
    then: Option<Then<T>>,
    resolve: oneshot::Sender<T>,
}

impl<A, T> RetrySession<A, T> {
    /// Create a session and the pending result its caller waits on.
    pub fn new(args: A, initial_delay: Duration) -> (Self, Pending<T>) {
        Self::with_then(args, initial_delay, None)
    }

    pub(crate) fn with_then(
        args: A,
        initial_delay: Duration,
        then: Option<Then<T>>,
    ) -> (Self, Pending<T>) {
        let id = SessionId::new();
        let (resolve, rx) = oneshot::channel();
        let session = Self {
            id,
            delay: initial_delay,
            args,
            attempts: 0,
            state: SessionState::Created,
            then,
            resolve,
        };
        (session, Pending { id, rx })
    }

    /// Identity used as the error registry key.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Delay to wait after the next failure.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arguments from the original call.
    pub fn args(&self) -> &A {
        &self.args
    }

    /// Number of attempts dispatched so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Mark an attempt as dispatched.
    pub fn begin_attempt(&mut self) {
        self.attempts += 1;
        self.state = SessionState::Attempting;
    }

    /// Record a failure: returns the wait before the next attempt and grows
    /// the delay for the failure after that.
    pub fn back_off(&mut self, config: &RetryConfig) -> Duration {
        let wait = self.delay;
        self.delay = next_delay(self.delay, config.factor());
        self.state = SessionState::BackingOff;
        wait
    }

    /// Resolve the pending result with the success value.
    ///
    /// Runs the `then` observer first. If the caller dropped its [`Pending`]
    /// the value is discarded.
    pub fn settle(self, value: T) {
        if let Some(then) = &self.then {
            then(&value);
        }
        let _ = self.resolve.send(value);
    }
}

impl<A: fmt::Debug, T> fmt::Debug for RetrySession<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrySession")
            .field("id", &self.id)
            .field("delay", &self.delay)
            .field("args", &self.args)
            .field("attempts", &self.attempts)
            .field("state", &self.state)
            .field("then", &self.then.is_some())
            .finish()
    }
}

/// The eventual success value of a retrying call.
///
/// `Pending` only ever resolves with a value. If the retry loop is torn down
/// before succeeding (for example the runtime shuts down), it stays pending
/// forever rather than producing an error.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Pending<T> {
    id: SessionId,
    rx: oneshot::Receiver<T>,
}

impl<T> Pending<T> {
    /// Identity of the session producing this result.
    ///
    /// Matches the id the session uses with the error registry.
    pub fn session_id(&self) -> SessionId {
        self.id
    }
}

impl<T> Future for Pending<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(value),
            Poll::Ready(Err(_)) | Poll::Pending => Poll::Pending,
        }
    }
}
