//! The retrying invoker: turns a fallible async operation into one that
//! always eventually succeeds.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::Instrument;

use super::diagnostics::{DiagnosticLogger, FailureReport, TracingLogger};
use super::error::ConfigError;
use super::policy::RetryConfig;
use super::registry::ErrorRegistry;
use super::session::{Pending, RetrySession, Then};

type Call<A, T, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;
type CreateError<A> = Arc<dyn Fn(&A) -> Option<String> + Send + Sync>;

/// Builds retrying functions that share one error registry, change
/// notifier, logger and backoff configuration.
///
/// # Examples
///
/// ```rust
/// use relentless::{InMemoryRegistry, RetryConfig, RetryFactory, RetryOptions};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let registry = Arc::new(InMemoryRegistry::new());
/// let factory = RetryFactory::new(registry.clone(), || {})
///     .with_config(RetryConfig::default().with_initial_delay(Duration::from_millis(1)))
///     .unwrap();
///
/// let calls = Arc::new(AtomicU32::new(0));
/// let fetch = factory.retrying(RetryOptions::new({
///     let calls = calls.clone();
///     move |page: u32| {
///         let n = calls.fetch_add(1, Ordering::SeqCst);
///         async move { if n < 2 { Err("flaky") } else { Ok(page * 10) } }
///     }
/// }));
///
/// assert_eq!(fetch.call(4).await, 40);
/// assert_eq!(calls.load(Ordering::SeqCst), 3);
/// assert!(registry.is_empty());
/// # });
/// ```
#[derive(Clone)]
pub struct RetryFactory {
    registry: Arc<dyn ErrorRegistry>,
    on_change: Arc<dyn Fn() + Send + Sync>,
    logger: Arc<dyn DiagnosticLogger>,
    config: RetryConfig,
}

impl RetryFactory {
    /// Create a factory reporting to `registry` and calling `on_change`
    /// whenever the registry's visible content changes.
    ///
    /// Failures are logged through [`TracingLogger`] until
    /// [`with_logger`](Self::with_logger) replaces it.
    pub fn new(
        registry: Arc<dyn ErrorRegistry>,
        on_change: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            registry,
            on_change: Arc::new(on_change),
            logger: Arc::new(TracingLogger),
            config: RetryConfig::default(),
        }
    }

    /// Replace the diagnostic logger.
    pub fn with_logger(mut self, logger: impl DiagnosticLogger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Replace the backoff configuration.
    pub fn with_config(mut self, config: RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// The backoff configuration used by new sessions.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Wrap `options.retrying_call` so that it is retried until it succeeds.
    pub fn retrying<A, T, E>(&self, options: RetryOptions<A, T, E>) -> RetryingFn<A, T, E> {
        RetryingFn {
            inner: Arc::new(Inner {
                factory: self.clone(),
                options,
            }),
        }
    }
}

impl fmt::Debug for RetryFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// What to retry, plus optional hooks.
pub struct RetryOptions<A, T, E> {
    call: Call<A, T, E>,
    then: Option<Then<T>>,
    create_error: Option<CreateError<A>>,
    label: Option<String>,
}

impl<A, T, E> RetryOptions<A, T, E> {
    /// Retry `retrying_call`. It receives the caller's arguments on every
    /// attempt and must be safe to repeat.
    pub fn new<F, Fut>(retrying_call: F) -> Self
    where
        A: 'static,
        T: 'static,
        E: 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            call: Arc::new(move |args| retrying_call(args).boxed()),
            then: None,
            create_error: None,
            label: None,
        }
    }

    /// Observe the success value once per call, just before it is delivered.
    pub fn then(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.then = Some(Arc::new(f));
        self
    }

    /// Derive a user-visible message from the call's arguments after a
    /// failed attempt. `None` or an empty string shows nothing.
    pub fn create_error(
        mut self,
        f: impl Fn(&A) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.create_error = Some(Arc::new(f));
        self
    }

    /// Name the operation in diagnostics.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl<A, T, E> fmt::Debug for RetryOptions<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("label", &self.label)
            .field("then", &self.then.is_some())
            .field("create_error", &self.create_error.is_some())
            .finish_non_exhaustive()
    }
}

struct Inner<A, T, E> {
    factory: RetryFactory,
    options: RetryOptions<A, T, E>,
}

/// A function that retries its operation until it succeeds.
///
/// Cloning is cheap; clones share the same options. Every [`call`](Self::call)
/// starts an independent session with its own identity and backoff.
pub struct RetryingFn<A, T, E> {
    inner: Arc<Inner<A, T, E>>,
}

impl<A, T, E> Clone for RetryingFn<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T, E> fmt::Debug for RetryingFn<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingFn")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl<A, T, E> RetryingFn<A, T, E>
where
    A: Clone + Send + Sync + 'static,
    T: Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    /// Start a fresh session for `args` and return its pending result.
    ///
    /// The retry loop is spawned onto the runtime and this returns
    /// immediately; the first attempt starts once the runtime schedules that
    /// task, not before `call` returns. The result only ever resolves with a
    /// success value:
    /// failures are logged, surfaced through the error registry and retried
    /// with growing delays, without limit.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, since the loop is started
    /// with `tokio::spawn`.
    pub fn call(&self, args: A) -> Pending<T> {
        let then = self.inner.options.then.clone();
        let (session, pending) =
            RetrySession::with_then(args, self.inner.factory.config.initial_delay(), then);
        let span = tracing::debug_span!(
            "retry_session",
            id = %session.id(),
            operation = self.inner.options.label.as_deref().unwrap_or("<unnamed>")
        );
        tokio::spawn(Arc::clone(&self.inner).drive(session).instrument(span));
        pending
    }
}

impl<A, T, E> Inner<A, T, E>
where
    A: Clone + Send + Sync + 'static,
    T: Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    async fn drive(self: Arc<Self>, mut session: RetrySession<A, T>) {
        loop {
            session.begin_attempt();
            let attempt = (self.options.call)(session.args().clone());
            match attempt.await {
                Ok(value) => {
                    self.succeeded(session, value);
                    return;
                }
                Err(error) => {
                    let wait = self.failed(&mut session, &error);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn succeeded(&self, session: RetrySession<A, T>, value: T) {
        let factory = &self.factory;
        factory.registry.remove(&session.id());
        (factory.on_change)();
        tracing::debug!(attempts = session.attempts(), "retrying call succeeded");
        session.settle(value);
    }

    /// Report a failed attempt and advance the backoff. Returns how long to
    /// wait before the next attempt.
    fn failed(&self, session: &mut RetrySession<A, T>, error: &E) -> Duration {
        let factory = &self.factory;
        let scheduled = session.back_off(&factory.config);
        let wait = factory.config.jitter().apply(scheduled);

        factory.logger.log_failure(&FailureReport {
            session: session.id(),
            attempt: session.attempts(),
            error,
            options: &self.options,
            label: self.options.label.as_deref(),
            next_delay: wait,
        });

        if let Some(create_error) = &self.options.create_error {
            if let Some(message) = create_error(session.args()).filter(|m| !m.is_empty()) {
                factory.registry.add(&session.id(), &message);
                (factory.on_change)();
            }
        }

        wait
    }
}
