//! Providers: immutable recipes for producing the value of a token.

use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};

use crate::error::{BoxError, DiError, DiResult};
use crate::injectable::Injectable;
use crate::token::{InjectionToken, SymbolToken};
use crate::traits::{AsyncDispose, Dispose};

/// Type-erased shared value, the unit the resolver works with.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

pub(crate) type ConstructFn =
    Arc<dyn Fn(Args) -> BoxFuture<'static, Result<AnyArc, BoxError>> + Send + Sync>;
pub(crate) type DisposeFn = Arc<dyn Fn(AnyArc) -> BoxFuture<'static, ()> + Send + Sync>;

/// Registration flags, fixed once the provider is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderOptions {
    /// Cache one instance in the repository that declares the provider
    pub singleton: bool,
    /// Compose with other providers of the token into an ordered array
    pub multi: bool,
    /// Only apply inside a scope of this type
    pub restrict_scope: Option<SymbolToken>,
}

/// One declared dependency of a factory, class or invoked method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Token to resolve
    pub token: InjectionToken,
    /// Resolve to [`Injected::Absent`] instead of failing when unprovided
    pub optional: bool,
}

impl Dependency {
    /// A dependency that must be provided.
    pub fn required(token: impl Into<InjectionToken>) -> Self {
        Self {
            token: token.into(),
            optional: false,
        }
    }

    /// A dependency that resolves to absent when unprovided.
    pub fn optional(token: impl Into<InjectionToken>) -> Self {
        Self {
            token: token.into(),
            optional: true,
        }
    }
}

impl From<InjectionToken> for Dependency {
    fn from(token: InjectionToken) -> Self {
        Dependency::required(token)
    }
}

impl From<&InjectionToken> for Dependency {
    fn from(token: &InjectionToken) -> Self {
        Dependency::required(token.clone())
    }
}

impl From<SymbolToken> for Dependency {
    fn from(token: SymbolToken) -> Self {
        Dependency::required(token)
    }
}

/// Untyped view of a resolved token.
#[derive(Clone)]
pub enum Injected {
    /// Optional token with no applicable provider
    Absent,
    /// Value of a non-multi token
    Single(AnyArc),
    /// Values of a multi token, root scope first
    Multi(Vec<AnyArc>),
}

impl Injected {
    /// `true` for [`Injected::Absent`].
    pub fn is_absent(&self) -> bool {
        matches!(self, Injected::Absent)
    }

    /// Downcasts a single value.
    pub fn single<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        match self {
            Injected::Absent => Ok(None),
            Injected::Single(value) => downcast::<T>(value.clone()).map(Some),
            Injected::Multi(_) => Err(DiError::TypeMismatch(format!(
                "{} (multi token resolved where a single value was expected)",
                type_name::<T>()
            ))),
        }
    }

    /// Downcasts a single trait object stored through `value_dyn`/`factory_dyn`.
    pub fn single_dyn<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        match self {
            Injected::Absent => Ok(None),
            Injected::Single(value) => downcast_dyn::<T>(value.clone()).map(Some),
            Injected::Multi(_) => Err(DiError::TypeMismatch(format!(
                "{} (multi token resolved where a single value was expected)",
                type_name::<T>()
            ))),
        }
    }

    /// Downcasts every value; a single value yields a one-element vector.
    pub fn all<T: Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        match self {
            Injected::Absent => Ok(Vec::new()),
            Injected::Single(value) => Ok(vec![downcast::<T>(value.clone())?]),
            Injected::Multi(values) => values.iter().cloned().map(downcast::<T>).collect(),
        }
    }
}

impl fmt::Debug for Injected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Injected::Absent => f.write_str("Absent"),
            Injected::Single(_) => f.write_str("Single(..)"),
            Injected::Multi(values) => write!(f, "Multi({} values)", values.len()),
        }
    }
}

pub(crate) fn downcast<T: Send + Sync + 'static>(value: AnyArc) -> DiResult<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| DiError::TypeMismatch(type_name::<T>().to_string()))
}

// Trait objects are stored as Arc<Arc<dyn Trait>>.
pub(crate) fn downcast_dyn<T: ?Sized + Send + Sync + 'static>(value: AnyArc) -> DiResult<Arc<T>> {
    value
        .downcast::<Arc<T>>()
        .map(|boxed| (*boxed).clone())
        .map_err(|_| DiError::TypeMismatch(type_name::<T>().to_string()))
}

/// Resolved arguments handed to a factory, constructor or invoked method,
/// in declaration order.
///
/// # Examples
///
/// ```rust
/// use dandi::{Injector, Provider, InjectionToken, SymbolToken};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> dandi::DiResult<()> {
/// let greeting = SymbolToken::for_key("args-doc-greeting");
/// let name = SymbolToken::for_key("args-doc-name");
/// let injector = Injector::new();
/// injector.register("doc", [
///     Provider::value(name.clone(), "Dandi".to_string()),
///     Provider::factory_sync(greeting.clone(), [name], |args| {
///         let name = args.get::<String>(0)?;
///         Ok::<_, dandi::DiError>(format!("hello {}", name))
///     }),
/// ])?;
/// injector.start()?;
///
/// let value = injector.inject::<String>(greeting).await?;
/// assert_eq!(value.as_str(), "hello Dandi");
/// # Ok(())
/// # }
/// ```
pub struct Args {
    owner: String,
    entries: Vec<(InjectionToken, Injected)>,
}

impl Args {
    pub(crate) fn new(owner: String, entries: Vec<(InjectionToken, Injected)>) -> Self {
        Self { owner, entries }
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the target declares no dependencies.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Untyped argument at `index`.
    pub fn injected(&self, index: usize) -> DiResult<&Injected> {
        self.entries
            .get(index)
            .map(|(_, injected)| injected)
            .ok_or_else(|| DiError::MissingToken(format!("argument {} of {}", index, self.owner)))
    }

    /// Required argument at `index`.
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> DiResult<Arc<T>> {
        self.injected(index)?
            .single::<T>()?
            .ok_or_else(|| self.absent(index))
    }

    /// Optional argument at `index`.
    pub fn optional<T: Send + Sync + 'static>(&self, index: usize) -> DiResult<Option<Arc<T>>> {
        self.injected(index)?.single::<T>()
    }

    /// Required trait-object argument at `index`.
    pub fn get_dyn<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> DiResult<Arc<T>> {
        self.injected(index)?
            .single_dyn::<T>()?
            .ok_or_else(|| self.absent(index))
    }

    /// Every value of a multi-token argument at `index`.
    pub fn all<T: Send + Sync + 'static>(&self, index: usize) -> DiResult<Vec<Arc<T>>> {
        self.injected(index)?.all::<T>()
    }

    fn absent(&self, index: usize) -> DiError {
        let token = self
            .entries
            .get(index)
            .map(|(token, _)| token.to_string())
            .unwrap_or_default();
        DiError::MissingProvider {
            token,
            chain: format!("\n  as argument {} of {}", index, self.owner),
        }
    }

    fn raw(&self, index: usize) -> DiResult<AnyArc> {
        match self.injected(index)? {
            Injected::Single(value) => Ok(value.clone()),
            Injected::Multi(values) => Ok(Arc::new(values.clone())),
            Injected::Absent => Err(self.absent(index)),
        }
    }
}

#[derive(Clone)]
pub(crate) enum ProviderKind {
    Value(AnyArc),
    Factory {
        deps: Vec<Dependency>,
        factory: ConstructFn,
    },
    Class {
        type_name: &'static str,
        deps: Vec<Dependency>,
        ctor: ConstructFn,
    },
}

/// The active shape of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderShape {
    /// Precomputed value
    Value,
    /// Function plus dependency list
    Factory,
    /// Constructible type plus dependency list
    Class,
}

/// Describes how to produce a value for a token.
///
/// Providers are immutable once built: flags are decided through
/// [`ProviderBuilder`] before registration and never change afterwards.
///
/// # Examples
///
/// ```rust
/// use dandi::{Provider, ProviderShape, SymbolToken};
///
/// let port = SymbolToken::for_key("provider-doc-port");
/// let provider = Provider::value(port, 8080u16).singleton().build();
/// assert_eq!(provider.shape(), ProviderShape::Value);
/// assert!(provider.options().singleton);
/// ```
#[derive(Clone)]
pub struct Provider {
    provide: InjectionToken,
    kind: ProviderKind,
    options: ProviderOptions,
    disposer: Option<DisposeFn>,
}

impl Provider {
    /// Value provider.
    pub fn value<T: Send + Sync + 'static>(token: impl Into<InjectionToken>, value: T) -> ProviderBuilder {
        ProviderBuilder::new(token.into(), ProviderKind::Value(Arc::new(value)))
    }

    /// Value provider for a trait object, e.g. `Arc<dyn Logger>`.
    pub fn value_dyn<T: ?Sized + Send + Sync + 'static>(
        token: impl Into<InjectionToken>,
        value: Arc<T>,
    ) -> ProviderBuilder {
        ProviderBuilder::new(token.into(), ProviderKind::Value(Arc::new(value)))
    }

    /// Asynchronous factory provider.
    ///
    /// `deps` are resolved (concurrently) before `factory` runs and handed to
    /// it as [`Args`] in declaration order.
    pub fn factory<T, D, F, Fut, E>(token: impl Into<InjectionToken>, deps: D, factory: F) -> ProviderBuilder
    where
        T: Send + Sync + 'static,
        D: IntoIterator,
        D::Item: Into<Dependency>,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let construct: ConstructFn = Arc::new(move |args: Args| -> BoxFuture<'static, Result<AnyArc, BoxError>> {
            factory(args)
                .map(|result| result.map(|v| Arc::new(v) as AnyArc).map_err(Into::into))
                .boxed()
        });
        ProviderBuilder::new(
            token.into(),
            ProviderKind::Factory {
                deps: deps.into_iter().map(Into::into).collect(),
                factory: construct,
            },
        )
    }

    /// Synchronous factory provider.
    pub fn factory_sync<T, D, F, E>(token: impl Into<InjectionToken>, deps: D, factory: F) -> ProviderBuilder
    where
        T: Send + Sync + 'static,
        D: IntoIterator,
        D::Item: Into<Dependency>,
        F: Fn(Args) -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        Self::factory(token, deps, move |args| future::ready(factory(args)))
    }

    /// Asynchronous factory producing a trait object.
    pub fn factory_dyn<T, D, F, Fut, E>(token: impl Into<InjectionToken>, deps: D, factory: F) -> ProviderBuilder
    where
        T: ?Sized + Send + Sync + 'static,
        D: IntoIterator,
        D::Item: Into<Dependency>,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::factory(token, deps, factory)
    }

    /// Class provider bound to the type's own token.
    pub fn class<T: Injectable>() -> ProviderBuilder {
        Self::class_for::<T>(InjectionToken::of::<T>())
    }

    /// Class provider for `T` under another token.
    pub fn class_for<T: Injectable>(token: impl Into<InjectionToken>) -> ProviderBuilder {
        let ctor: ConstructFn = Arc::new(|args: Args| -> BoxFuture<'static, Result<AnyArc, BoxError>> {
            T::construct(args)
                .map(|result| result.map(|v| Arc::new(v) as AnyArc))
                .boxed()
        });
        ProviderBuilder::new(
            token.into(),
            ProviderKind::Class {
                type_name: type_name::<T>(),
                deps: T::dependencies(),
                ctor,
            },
        )
    }

    /// Provider resolving `token` to whatever `existing` resolves to.
    pub fn existing(token: impl Into<InjectionToken>, existing: impl Into<InjectionToken>) -> ProviderBuilder {
        let target: InjectionToken = existing.into();
        let factory: ConstructFn = Arc::new(|args: Args| -> BoxFuture<'static, Result<AnyArc, BoxError>> {
            future::ready(args.raw(0).map_err(|e| Box::new(e) as BoxError)).boxed()
        });
        ProviderBuilder::new(
            token.into(),
            ProviderKind::Factory {
                deps: vec![Dependency::required(target)],
                factory,
            },
        )
    }

    /// The token this provider satisfies.
    pub fn provide(&self) -> &InjectionToken {
        &self.provide
    }

    /// Registration flags.
    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    /// Which of the three shapes is active.
    pub fn shape(&self) -> ProviderShape {
        match self.kind {
            ProviderKind::Value(_) => ProviderShape::Value,
            ProviderKind::Factory { .. } => ProviderShape::Factory,
            ProviderKind::Class { .. } => ProviderShape::Class,
        }
    }

    /// Declared dependencies (empty for value providers).
    pub fn dependencies(&self) -> &[Dependency] {
        match &self.kind {
            ProviderKind::Value(_) => &[],
            ProviderKind::Factory { deps, .. } | ProviderKind::Class { deps, .. } => deps,
        }
    }

    /// `true` if the provider carries a disposal hook.
    pub fn has_disposer(&self) -> bool {
        self.disposer.is_some()
    }

    pub(crate) fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    pub(crate) fn disposer(&self) -> Option<&DisposeFn> {
        self.disposer.as_ref()
    }

    pub(crate) fn with_options(mut self, options: ProviderOptions) -> Self {
        self.options = options;
        self
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Provider");
        s.field("provide", &self.provide).field("shape", &self.shape());
        if let ProviderKind::Class { type_name, .. } = &self.kind {
            s.field("class", type_name);
        }
        s.field("dependencies", &self.dependencies())
            .field("options", &self.options)
            .field("has_disposer", &self.disposer.is_some())
            .finish()
    }
}

/// Builder deciding a provider's flags before registration.
pub struct ProviderBuilder {
    provider: Provider,
}

impl ProviderBuilder {
    fn new(provide: InjectionToken, kind: ProviderKind) -> Self {
        Self {
            provider: Provider {
                provide,
                kind,
                options: ProviderOptions::default(),
                disposer: None,
            },
        }
    }

    /// Cache the instance in the declaring repository.
    pub fn singleton(mut self) -> Self {
        self.provider.options.singleton = true;
        self
    }

    /// Compose with the token's other providers.
    pub fn multi(mut self) -> Self {
        self.provider.options.multi = true;
        self
    }

    /// Only apply inside scopes of `scope_type`.
    pub fn restrict_scope(mut self, scope_type: SymbolToken) -> Self {
        self.provider.options.restrict_scope = Some(scope_type);
        self
    }

    /// Replaces all flags at once.
    pub fn options(mut self, options: ProviderOptions) -> Self {
        self.provider.options = options;
        self
    }

    /// Runs `hook` when the produced value's context is disposed.
    ///
    /// The hook receives the value downcast to `T`; values of another type
    /// are skipped.
    pub fn on_dispose<T, F, Fut>(mut self, hook: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let disposer: DisposeFn = Arc::new(move |value: AnyArc| -> BoxFuture<'static, ()> {
            match value.downcast::<T>() {
                Ok(value) => hook(value).boxed(),
                Err(_) => future::ready(()).boxed(),
            }
        });
        self.provider.disposer = Some(disposer);
        self
    }

    /// Disposes values through their [`AsyncDispose`] implementation.
    pub fn dispose_with<T: AsyncDispose>(self) -> Self {
        self.on_dispose(|value: Arc<T>| async move { value.dispose().await })
    }

    /// Disposes values through their [`Dispose`] implementation.
    pub fn dispose_sync<T: Dispose>(self) -> Self {
        self.on_dispose(|value: Arc<T>| {
            value.dispose();
            future::ready(())
        })
    }

    /// Finishes the provider.
    pub fn build(self) -> Provider {
        self.provider
    }
}

impl From<ProviderBuilder> for Provider {
    fn from(builder: ProviderBuilder) -> Self {
        builder.build()
    }
}
