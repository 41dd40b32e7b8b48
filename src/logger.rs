//! Logger contract injected into the runtime's collaborators.

use std::sync::Arc;

use crate::provider::{Provider, ProviderBuilder};
use crate::token::InjectionToken;

/// Minimal logging surface resolved through `<dyn Logger>::token()`.
///
/// The bootstrapper registers [`TracingLogger`] when nothing else provides
/// the token.
pub trait Logger: Send + Sync {
    /// Debug-level message
    fn debug(&self, message: &str);
    /// Info-level message
    fn info(&self, message: &str);
    /// Warning
    fn warn(&self, message: &str);
    /// Error
    fn error(&self, message: &str);
}

impl dyn Logger {
    /// Token loggers are registered under.
    pub fn token() -> InjectionToken {
        InjectionToken::of::<dyn Logger>()
    }

    /// Value provider for `logger` under [`token`](Self::token).
    pub fn provider(logger: Arc<dyn Logger>) -> ProviderBuilder {
        Provider::value_dyn(Self::token(), logger)
    }
}

/// [`Logger`] forwarding to `tracing` under the `dandi` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "dandi", "{}", message);
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "dandi", "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "dandi", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "dandi", "{}", message);
    }
}
