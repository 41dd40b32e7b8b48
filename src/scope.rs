//! Injection scopes: labels and policy keys for injector subtrees.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::provider::AnyArc;
use crate::token::SymbolToken;

static ROOT_SCOPE_TYPE: Lazy<SymbolToken> = Lazy::new(|| SymbolToken::for_local("dandi", "RootScope"));
static INVOCATION_SCOPE_TYPE: Lazy<SymbolToken> =
    Lazy::new(|| SymbolToken::for_local("dandi", "InvocationScope"));

/// Tagged identity of an injector scope.
///
/// The `scope_type` symbol is what scope-restricted providers match against;
/// the description and optional instance data are diagnostic.
///
/// # Examples
///
/// ```rust
/// use dandi::{InjectionScope, SymbolToken};
///
/// let request_scope = SymbolToken::for_local("web", "HttpRequest");
/// let scope = InjectionScope::new(request_scope.clone(), "GET /users")
///     .with_data(42u64);
///
/// assert!(scope.is(&request_scope));
/// assert_eq!(*scope.data::<u64>().unwrap(), 42);
/// assert_eq!(scope.to_string(), "GET /users");
/// ```
#[derive(Clone)]
pub struct InjectionScope {
    scope_type: SymbolToken,
    description: String,
    data: Option<AnyArc>,
}

impl InjectionScope {
    /// Creates a scope of the given type.
    pub fn new(scope_type: SymbolToken, description: impl Into<String>) -> Self {
        Self {
            scope_type,
            description: description.into(),
            data: None,
        }
    }

    /// The scope of a root injector.
    pub fn root() -> Self {
        Self::new(Self::root_type(), "root")
    }

    /// Scope type of root injectors.
    pub fn root_type() -> SymbolToken {
        ROOT_SCOPE_TYPE.clone()
    }

    /// Default scope used for `Injector::invoke` when the target has no scope function.
    pub fn invocation(type_name: &str, method: &str) -> Self {
        Self::new(Self::invocation_type(), format!("{}::{}", type_name, method))
    }

    /// Scope type of default invocation scopes.
    pub fn invocation_type() -> SymbolToken {
        INVOCATION_SCOPE_TYPE.clone()
    }

    /// Attaches instance data (e.g. a request id).
    pub fn with_data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.data = Some(Arc::new(data));
        self
    }

    /// The type symbol restricted providers match against.
    pub fn scope_type(&self) -> &SymbolToken {
        &self.scope_type
    }

    /// Diagnostic description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Instance data, if any was attached and it is a `T`.
    pub fn data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.data.clone().and_then(|d| d.downcast::<T>().ok())
    }

    /// `true` if this scope is of type `scope_type`.
    pub fn is(&self, scope_type: &SymbolToken) -> bool {
        &self.scope_type == scope_type
    }
}

impl fmt::Display for InjectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl fmt::Debug for InjectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionScope")
            .field("scope_type", &self.scope_type)
            .field("description", &self.description)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

/// Target a scope function is asked to build a scope for.
#[derive(Debug, Clone, Copy)]
pub struct ScopeTarget<'a> {
    /// Type name of the invoked instance
    pub type_name: &'a str,
    /// Invoked method name
    pub method: &'a str,
}

/// Builds the scope for invocations of a type or method.
pub type ScopeFn = Arc<dyn for<'a> Fn(&ScopeTarget<'a>) -> InjectionScope + Send + Sync>;
