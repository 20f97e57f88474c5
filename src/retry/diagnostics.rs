//! Diagnostic logging for failed attempts.
//!
//! Loggers are purely observational: the retry loop ignores whatever they do.

use std::fmt;
use std::time::Duration;

use super::session::SessionId;

/// Information about one failed attempt, passed to a [`DiagnosticLogger`].
#[derive(Debug, Clone, Copy)]
pub struct FailureReport<'a> {
    /// Session the attempt belonged to.
    pub session: SessionId,
    /// Which attempt just failed (1-indexed).
    pub attempt: u32,
    /// The failure value returned by the operation.
    pub error: &'a dyn fmt::Debug,
    /// The options the retrying function was built with.
    pub options: &'a dyn fmt::Debug,
    /// Operation label from the options, if one was set.
    pub label: Option<&'a str>,
    /// How long the loop will wait before the next attempt.
    pub next_delay: Duration,
}

/// Receives failure details from the retry loop.
///
/// Any `Fn(&FailureReport<'_>)` function or closure is a logger.
pub trait DiagnosticLogger: Send + Sync {
    /// Record a failed attempt.
    fn log_failure(&self, report: &FailureReport<'_>);
}

impl<F> DiagnosticLogger for F
where
    F: Fn(&FailureReport<'_>) + Send + Sync,
{
    fn log_failure(&self, report: &FailureReport<'_>) {
        self(report)
    }
}

/// Default logger: one `tracing` warning per failed attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl DiagnosticLogger for TracingLogger {
    fn log_failure(&self, report: &FailureReport<'_>) {
        tracing::warn!(
            session = %report.session,
            attempt = report.attempt,
            next_delay = ?report.next_delay,
            operation = report.label.unwrap_or("<unnamed>"),
            options = ?report.options,
            error = ?report.error,
            "retrying call failed"
        );
    }
}
