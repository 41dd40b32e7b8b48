//! Error types for the injector runtime.

use std::error::Error as StdError;
use std::fmt::Write as _;

use thiserror::Error;

/// Boxed error returned by factories, constructors and invoked methods.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Dependency injection errors
///
/// Every failure raised by registration, resolution, invocation or bootstrap.
/// Errors that wrap a user failure keep it as their [`source`](StdError::source),
/// so the whole chain can be rendered with [`DiError::report`].
///
/// # Examples
///
/// ```rust
/// use dandi::DiError;
///
/// let circular = DiError::Circular(vec!["A".into(), "B".into(), "A".into()]);
/// assert_eq!(circular.to_string(), "Circular dependency: A -> B -> A");
///
/// let missing = DiError::MissingProvider {
///     token: "Symbol(Cache)".into(),
///     chain: String::new(),
/// };
/// assert_eq!(missing.to_string(), "No provider for Symbol(Cache)");
/// ```
#[derive(Debug, Error)]
pub enum DiError {
    /// A value presented as a token is not an injection token
    #[error("Invalid injection token: {0}")]
    InjectionTokenType(String),
    /// No applicable, scope-permitted provider for a required token
    #[error("No provider for {token}{chain}")]
    MissingProvider {
        /// Display form of the requested token
        token: String,
        /// Rendered resolution chain, one line per ancestor
        chain: String,
    },
    /// A required token was never supplied
    #[error("Missing required token: {0}")]
    MissingToken(String),
    /// Resolution attempted before `Injector::start`
    #[error("Container is not initialized: call Injector::start() before resolving")]
    ContainerNotInitialized,
    /// Circular dependency detected (includes path)
    #[error("Circular dependency: {}", .0.join(" -> "))]
    Circular(Vec<String>),
    /// A registration matches none of the provider shapes
    #[error("Invalid provider: {0}")]
    ProviderType(String),
    /// Resolved value could not be downcast to the requested type
    #[error("Type mismatch for: {0}")]
    TypeMismatch(String),
    /// Registrations for one token disagree on their `multi` flag
    #[error("Conflicting providers for {token}: {reason}")]
    ConflictingProviders {
        /// Display form of the token
        token: String,
        /// What disagrees
        reason: String,
    },
    /// Two different scope functions were assigned to the same target
    #[error("Conflicting scope functions for {0}")]
    ConflictingScope(String),
    /// A factory or constructor failed
    #[error("Factory for {token} failed")]
    Factory {
        /// Display form of the token being constructed
        token: String,
        /// The factory's own error
        #[source]
        source: BoxError,
    },
    /// An invoked method or entry point failed
    #[error("Invocation of {method} failed")]
    Invocation {
        /// `Type::method` label
        method: String,
        /// The method's own error
        #[source]
        source: BoxError,
    },
    /// The injector (or one of its ancestors) has been disposed
    #[error("Injector has been disposed: {0}")]
    Disposed(String),
    /// A configuration value was missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DiError {
    /// Renders this error followed by one `Inner` section per nested source.
    ///
    /// ```rust
    /// use dandi::DiError;
    ///
    /// let err = DiError::Factory {
    ///     token: "Engine".into(),
    ///     source: Box::new(DiError::Config("missing DB_URL".into())),
    /// };
    /// let report = err.report();
    /// assert!(report.starts_with("Factory for Engine failed"));
    /// assert!(report.contains("Inner error: Configuration error: missing DB_URL"));
    /// ```
    pub fn report(&self) -> String {
        report(self)
    }

    /// Returns `true` for a missing provider.
    pub fn is_missing_provider(&self) -> bool {
        matches!(self, DiError::MissingProvider { .. })
    }
}

/// Composes the message of `err` and of every error in its source chain.
pub fn report(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    let mut depth = 1;
    while let Some(inner) = current {
        let _ = write!(out, "\n{}Inner error: {}", "  ".repeat(depth), inner);
        current = inner.source();
        depth += 1;
    }
    out
}

/// Result type for DI operations
pub type DiResult<T> = Result<T, DiError>;
