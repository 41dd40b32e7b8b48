//! Declarative metadata consumed by the resolver.
//!
//! Parameter tokens, optional flags and scope functions are recorded per
//! (type, method) in a process-wide store. Each concern lives under its own
//! symbol key and is created on first access.
//!
//! # Examples
//!
//! ```rust
//! use dandi::metadata::{self, MethodDecorator};
//! use dandi::{SymbolToken, Dependency};
//!
//! struct Handler;
//!
//! let db = SymbolToken::for_key("metadata-doc-db");
//! let cache = SymbolToken::for_key("metadata-doc-cache");
//!
//! MethodDecorator::<Handler>::new("handle")
//!     .inject(0, db.clone())?
//!     .inject(1, cache.clone())?
//!     .optional(1)?;
//!
//! let deps = metadata::method_metadata::<Handler>("handle")?.dependencies("Handler::handle")?;
//! assert_eq!(deps, vec![Dependency::required(db), Dependency::optional(cache)]);
//! # Ok::<(), dandi::DiError>(())
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::{DiError, DiResult};
use crate::provider::Dependency;
use crate::scope::ScopeFn;
use crate::token::{InjectionToken, SymbolToken};

type Slot = Arc<dyn Any + Send + Sync>;

static STORE: Lazy<Mutex<AHashMap<(SymbolToken, TypeId), Slot>>> =
    Lazy::new(|| Mutex::new(AHashMap::new()));

static PARAMS: Lazy<SymbolToken> = Lazy::new(|| SymbolToken::for_local("dandi", "ParamMetadata"));
static SCOPES: Lazy<SymbolToken> = Lazy::new(|| SymbolToken::for_local("dandi", "ScopeMetadata"));

/// Returns the metadata of `concern` for `target`, creating it with `init`
/// on first access.
///
/// Fails with [`DiError::TypeMismatch`] if the concern was created with a
/// different metadata type.
pub fn get_or_create<M, F>(concern: &SymbolToken, target: TypeId, init: F) -> DiResult<Arc<Mutex<M>>>
where
    M: Send + 'static,
    F: FnOnce() -> M,
{
    let slot = STORE
        .lock()
        .entry((concern.clone(), target))
        .or_insert_with(|| Arc::new(Mutex::new(init())) as Slot)
        .clone();
    slot.downcast::<Mutex<M>>().map_err(|_| {
        DiError::TypeMismatch(format!("{} metadata is not a {}", concern, type_name::<M>()))
    })
}

/// Metadata recorded for one method parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamMetadata {
    /// Token injected into the parameter
    pub token: Option<InjectionToken>,
    /// Resolve to absent instead of failing when unprovided
    pub optional: bool,
}

/// Metadata recorded for one method.
#[derive(Clone, Default)]
pub struct MethodMetadata {
    /// Parameter slots by index
    pub params: BTreeMap<usize, ParamMetadata>,
    /// Scope function for invocations of this method
    pub scope_fn: Option<ScopeFn>,
}

impl MethodMetadata {
    /// Dependencies in parameter order.
    ///
    /// Parameters are dense from index 0; a gap or a slot without a token
    /// fails with [`DiError::MissingToken`] naming the parameter.
    pub fn dependencies(&self, owner: &str) -> DiResult<Vec<Dependency>> {
        let count = self.params.keys().next_back().map_or(0, |last| last + 1);
        (0..count)
            .map(|index| {
                let slot = self.params.get(&index);
                match slot.and_then(|p| p.token.clone()) {
                    Some(token) => Ok(Dependency {
                        token,
                        optional: slot.map_or(false, |p| p.optional),
                    }),
                    None => Err(DiError::MissingToken(format!("parameter {} of {}", index, owner))),
                }
            })
            .collect()
    }
}

impl fmt::Debug for MethodMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodMetadata")
            .field("params", &self.params)
            .field("has_scope_fn", &self.scope_fn.is_some())
            .finish()
    }
}

#[derive(Default)]
struct ParamTable {
    methods: AHashMap<String, BTreeMap<usize, ParamMetadata>>,
}

#[derive(Default)]
struct ScopeTable {
    class: Option<ScopeFn>,
    methods: AHashMap<String, ScopeFn>,
}

fn params<T: 'static>() -> DiResult<Arc<Mutex<ParamTable>>> {
    get_or_create(&PARAMS, TypeId::of::<T>(), ParamTable::default)
}

fn scopes<T: 'static>() -> DiResult<Arc<Mutex<ScopeTable>>> {
    get_or_create(&SCOPES, TypeId::of::<T>(), ScopeTable::default)
}

fn with_param<T, F>(method: &str, index: usize, apply: F) -> DiResult<()>
where
    T: 'static,
    F: FnOnce(&mut ParamMetadata),
{
    let table = params::<T>()?;
    let mut table = table.lock();
    let slot = table
        .methods
        .entry(method.to_string())
        .or_default()
        .entry(index)
        .or_default();
    apply(slot);
    Ok(())
}

/// Records `token` as the value injected into parameter `index` of `T::method`.
pub fn inject_param<T: 'static>(method: &str, index: usize, token: impl Into<InjectionToken>) -> DiResult<()> {
    let token = token.into();
    with_param::<T, _>(method, index, |slot| slot.token = Some(token))
}

/// Like [`inject_param`] with a dynamically typed token; non-tokens fail with
/// [`DiError::InjectionTokenType`].
pub fn try_inject_param<T: 'static>(method: &str, index: usize, token: &dyn Any) -> DiResult<()> {
    let token = InjectionToken::from_any(token)?;
    inject_param::<T>(method, index, token)
}

/// Flags parameter `index` of `T::method` optional.
pub fn optional_param<T: 'static>(method: &str, index: usize) -> DiResult<()> {
    with_param::<T, _>(method, index, |slot| slot.optional = true)
}

fn same_scope(a: &ScopeFn, b: &ScopeFn) -> bool {
    Arc::ptr_eq(a, b)
}

/// Attaches a scope function to every invocation on `T`.
///
/// Re-assigning the same function is a no-op; a different one fails with
/// [`DiError::ConflictingScope`].
pub fn scope<T: 'static>(scope_fn: ScopeFn) -> DiResult<()> {
    let table = scopes::<T>()?;
    let mut table = table.lock();
    match &table.class {
        Some(existing) if !same_scope(existing, &scope_fn) => {
            Err(DiError::ConflictingScope(type_name::<T>().to_string()))
        }
        _ => {
            table.class = Some(scope_fn);
            Ok(())
        }
    }
}

/// Attaches a scope function to invocations of `T::method`.
pub fn method_scope<T: 'static>(method: &str, scope_fn: ScopeFn) -> DiResult<()> {
    let table = scopes::<T>()?;
    let mut table = table.lock();
    if let Some(existing) = table.methods.get(method) {
        if !same_scope(existing, &scope_fn) {
            return Err(DiError::ConflictingScope(format!("{}::{}", type_name::<T>(), method)));
        }
    }
    table.methods.insert(method.to_string(), scope_fn);
    Ok(())
}

/// Everything recorded for `T::method`.
///
/// The scope function is the method's own, falling back to the type's.
pub fn method_metadata<T: 'static>(method: &str) -> DiResult<MethodMetadata> {
    let params = params::<T>()?
        .lock()
        .methods
        .get(method)
        .cloned()
        .unwrap_or_default();
    let scope_fn = {
        let table = scopes::<T>()?;
        let table = table.lock();
        table.methods.get(method).or(table.class.as_ref()).cloned()
    };
    Ok(MethodMetadata { params, scope_fn })
}

/// Builder recording parameter and scope metadata for one method.
pub struct MethodDecorator<T> {
    method: &'static str,
    _target: PhantomData<fn() -> T>,
}

impl<T: 'static> MethodDecorator<T> {
    /// Starts decorating `T::method`.
    pub fn new(method: &'static str) -> Self {
        Self {
            method,
            _target: PhantomData,
        }
    }

    /// See [`inject_param`].
    pub fn inject(self, index: usize, token: impl Into<InjectionToken>) -> DiResult<Self> {
        inject_param::<T>(self.method, index, token)?;
        Ok(self)
    }

    /// See [`try_inject_param`].
    pub fn try_inject(self, index: usize, token: &dyn Any) -> DiResult<Self> {
        try_inject_param::<T>(self.method, index, token)?;
        Ok(self)
    }

    /// See [`optional_param`].
    pub fn optional(self, index: usize) -> DiResult<Self> {
        optional_param::<T>(self.method, index)?;
        Ok(self)
    }

    /// See [`method_scope`].
    pub fn scope(self, scope_fn: ScopeFn) -> DiResult<Self> {
        method_scope::<T>(self.method, scope_fn)?;
        Ok(self)
    }
}
