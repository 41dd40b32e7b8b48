//! Injection tokens: the identities dependencies are requested by.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::{DiError, DiResult};

// Interned symbol tokens, keyed by their full key string.
static SYMBOL_CACHE: Lazy<Mutex<AHashMap<String, SymbolToken>>> =
    Lazy::new(|| Mutex::new(AHashMap::new()));

/// Identity of a dependency.
///
/// Tokens compare by identity, never by content:
///
/// - **Type**: a concrete type or trait object, compared by `TypeId`
/// - **Symbol**: a [`SymbolToken`], compared by allocation
/// - **Mapped**: a (provide token, key) pair selecting one of several
///   registrations under a single semantic token
///
/// # Examples
///
/// ```rust
/// use dandi::{InjectionToken, SymbolToken, MappedToken};
///
/// struct Engine;
///
/// let by_type = InjectionToken::of::<Engine>();
/// assert_eq!(by_type, InjectionToken::of::<Engine>());
///
/// let a = InjectionToken::from(SymbolToken::new("Cache"));
/// let b = InjectionToken::from(SymbolToken::new("Cache"));
/// assert_ne!(a, b); // same description, different identity
///
/// let redis = InjectionToken::from(MappedToken::new(a.clone(), "redis"));
/// assert_eq!(redis, MappedToken::new(a, "redis").into());
/// ```
#[derive(Clone)]
pub enum InjectionToken {
    /// Concrete type (or `dyn Trait`) token
    Type(TypeToken),
    /// Symbol token
    Symbol(SymbolToken),
    /// (provide, key) pair
    Mapped(MappedToken),
}

impl InjectionToken {
    /// Token identifying `T` itself.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        InjectionToken::Type(TypeToken::of::<T>())
    }

    /// Converts a dynamically typed value into a token.
    ///
    /// Accepts [`InjectionToken`], [`TypeToken`], [`SymbolToken`] and
    /// [`MappedToken`] values; anything else is rejected with
    /// [`DiError::InjectionTokenType`].
    pub fn from_any(value: &dyn Any) -> DiResult<Self> {
        if let Some(token) = value.downcast_ref::<InjectionToken>() {
            return Ok(token.clone());
        }
        if let Some(token) = value.downcast_ref::<TypeToken>() {
            return Ok(InjectionToken::Type(*token));
        }
        if let Some(token) = value.downcast_ref::<SymbolToken>() {
            return Ok(InjectionToken::Symbol(token.clone()));
        }
        if let Some(token) = value.downcast_ref::<MappedToken>() {
            return Ok(InjectionToken::Mapped(token.clone()));
        }
        Err(DiError::InjectionTokenType(describe_non_token(value)))
    }

    /// Human readable name used in diagnostics.
    pub fn display_name(&self) -> String {
        self.to_string()
    }
}

/// Returns `true` if `value` is usable as an injection token.
///
/// ```rust
/// use dandi::{is_injection_token, InjectionToken, SymbolToken};
///
/// assert!(is_injection_token(&InjectionToken::of::<String>()));
/// assert!(is_injection_token(&SymbolToken::for_key("config")));
/// assert!(!is_injection_token(&42u32));
/// assert!(!is_injection_token(&"Engine"));
/// assert!(!is_injection_token(&Option::<InjectionToken>::None));
/// ```
pub fn is_injection_token(value: &dyn Any) -> bool {
    value.is::<InjectionToken>()
        || value.is::<TypeToken>()
        || value.is::<SymbolToken>()
        || value.is::<MappedToken>()
}

/// Shorthand for [`InjectionToken::of`].
#[inline]
pub fn token_of<T: ?Sized + 'static>() -> InjectionToken {
    InjectionToken::of::<T>()
}

fn describe_non_token(value: &dyn Any) -> String {
    if let Some(s) = value.downcast_ref::<&str>() {
        format!("string {:?} is not a token", s)
    } else if let Some(s) = value.downcast_ref::<String>() {
        format!("string {:?} is not a token", s)
    } else if value.is::<Option<InjectionToken>>() {
        "missing token (None)".to_string()
    } else {
        "value is not a token".to_string()
    }
}

impl PartialEq for InjectionToken {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (InjectionToken::Type(a), InjectionToken::Type(b)) => a == b,
            (InjectionToken::Symbol(a), InjectionToken::Symbol(b)) => a == b,
            (InjectionToken::Mapped(a), InjectionToken::Mapped(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for InjectionToken {}

impl Hash for InjectionToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            InjectionToken::Type(t) => {
                0u8.hash(state);
                t.hash(state);
            }
            InjectionToken::Symbol(s) => {
                1u8.hash(state);
                s.hash(state);
            }
            InjectionToken::Mapped(m) => {
                2u8.hash(state);
                m.hash(state);
            }
        }
    }
}

impl fmt::Display for InjectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionToken::Type(t) => fmt::Display::fmt(t, f),
            InjectionToken::Symbol(s) => fmt::Display::fmt(s, f),
            InjectionToken::Mapped(m) => fmt::Display::fmt(m, f),
        }
    }
}

impl fmt::Debug for InjectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InjectionToken({})", self)
    }
}

impl From<TypeToken> for InjectionToken {
    fn from(token: TypeToken) -> Self {
        InjectionToken::Type(token)
    }
}

impl From<SymbolToken> for InjectionToken {
    fn from(token: SymbolToken) -> Self {
        InjectionToken::Symbol(token)
    }
}

impl From<&SymbolToken> for InjectionToken {
    fn from(token: &SymbolToken) -> Self {
        InjectionToken::Symbol(token.clone())
    }
}

impl From<MappedToken> for InjectionToken {
    fn from(token: MappedToken) -> Self {
        InjectionToken::Mapped(token)
    }
}

impl From<&InjectionToken> for InjectionToken {
    fn from(token: &InjectionToken) -> Self {
        token.clone()
    }
}

/// Type identity token with the type name kept for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeToken {
    id: TypeId,
    name: &'static str,
}

impl TypeToken {
    /// Token for `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The `TypeId` this token stands for.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Full type name as reported by `std::any::type_name`.
    pub fn type_name(&self) -> &'static str {
        self.name
    }
}

// TypeId only; the name is diagnostic.
impl PartialEq for TypeToken {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeToken {}

impl Hash for TypeToken {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Debug for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeToken({})", self.name)
    }
}

/// Opaque symbol identity with a description for diagnostics.
///
/// Cloning shares the identity; [`SymbolToken::new`] and
/// [`SymbolToken::local`] always allocate a fresh one, while
/// [`SymbolToken::for_key`] and [`SymbolToken::for_local`] return the
/// process-wide instance cached for their key.
///
/// ```rust
/// use dandi::SymbolToken;
///
/// assert_eq!(SymbolToken::for_key("db"), SymbolToken::for_key("db"));
/// assert_ne!(SymbolToken::local("app", "db"), SymbolToken::local("app", "db"));
/// assert_eq!(SymbolToken::for_local("app", "db"), SymbolToken::for_local("app", "db"));
/// assert_eq!(SymbolToken::for_local("app", "db").description(), "app#db");
/// ```
#[derive(Clone)]
pub struct SymbolToken {
    inner: Arc<SymbolInner>,
}

struct SymbolInner {
    description: String,
    interned: bool,
}

impl SymbolToken {
    /// Creates a new unique symbol.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SymbolInner {
                description: description.into(),
                interned: false,
            }),
        }
    }

    /// Returns the process-wide symbol cached for `key`, creating it on first use.
    pub fn for_key(key: impl Into<String>) -> Self {
        let key = key.into();
        let mut cache = SYMBOL_CACHE.lock();
        cache
            .entry(key)
            .or_insert_with_key(|key| SymbolToken {
                inner: Arc::new(SymbolInner {
                    description: key.clone(),
                    interned: true,
                }),
            })
            .clone()
    }

    /// Creates a new unique symbol namespaced as `"<package>#<key>"`.
    pub fn local(package: &str, key: &str) -> Self {
        Self::new(local_key(package, key))
    }

    /// Returns the cached symbol for the namespaced key `"<package>#<key>"`.
    pub fn for_local(package: &str, key: &str) -> Self {
        Self::for_key(local_key(package, key))
    }

    /// The description given at construction.
    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// `true` for symbols obtained through [`for_key`](Self::for_key) or
    /// [`for_local`](Self::for_local).
    pub fn is_interned(&self) -> bool {
        self.inner.interned
    }
}

fn local_key(package: &str, key: &str) -> String {
    format!("{}#{}", package, key)
}

impl PartialEq for SymbolToken {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for SymbolToken {}

impl Hash for SymbolToken {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.inner) as usize).hash(state);
    }
}

impl fmt::Display for SymbolToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.inner.description)
    }
}

impl fmt::Debug for SymbolToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A (provide, key) pair selecting one registration among several for one
/// semantic token, e.g. a cache implementation chosen by name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MappedToken {
    provide: Box<InjectionToken>,
    key: String,
}

impl MappedToken {
    /// Creates a mapped token.
    pub fn new(provide: impl Into<InjectionToken>, key: impl Into<String>) -> Self {
        Self {
            provide: Box::new(provide.into()),
            key: key.into(),
        }
    }

    /// The semantic token being mapped.
    pub fn provide(&self) -> &InjectionToken {
        &self.provide
    }

    /// The selecting key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for MappedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.provide, self.key)
    }
}

impl fmt::Debug for MappedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MappedToken({})", self)
    }
}
