//! Injected logging capability.
//!
//! Passes never print directly; they go through the [`Logger`]
//! stored in the run's [`Context`](crate::Context). The default forwards to
//! `tracing` so hosts that install a subscriber get the output for free.

use std::sync::Arc;

/// Logging sink handed to every pass
pub trait Logger: Send + Sync {
    /// Detail message (per-pass progress, skipped rewrites)
    fn log(&self, message: &str);

    /// Summary message (one line per pass)
    fn info(&self, message: &str);
}

/// Forwards to `tracing` (`log` at debug, `info` at info)
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, message: &str) {
        tracing::debug!(target: "unshroud", "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "unshroud", "{message}");
    }
}

/// Prints `info` messages to stderr, `log` messages only when verbose.
/// Stdout is left to the program output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrLogger {
    /// Also print `log` messages
    pub verbose: bool,
}

impl Logger for StderrLogger {
    fn log(&self, message: &str) {
        if self.verbose {
            eprintln!("{message}");
        }
    }

    fn info(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _message: &str) {}

    fn info(&self, _message: &str) {}
}

/// Default logger used by [`Config`](crate::Config)
pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(TracingLogger)
}
