//! The public resolution API.

use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{join_all, BoxFuture, FutureExt};

use crate::error::{BoxError, DiError, DiResult};
use crate::metadata;
use crate::provider::{downcast_dyn, Args, Injected};
use crate::repository::{Registerable, RegistrationSource, Repository};
use crate::resolver::{self, ResolveResult, ResolverContext};
use crate::scope::{InjectionScope, ScopeTarget};
use crate::token::{InjectionToken, SymbolToken};

/// Runtime object resolving tokens against a repository tree.
///
/// Cloning is cheap and shares the injector. A root injector must be
/// [`start`](Self::start)ed before anything can be resolved; children
/// created from it share that state.
///
/// # Examples
///
/// ```rust
/// use dandi::{Injector, InjectionScope, Provider, SymbolToken};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> dandi::DiResult<()> {
/// let request_id = SymbolToken::for_key("injector-doc-request-id");
/// let request = SymbolToken::for_key("injector-doc-request");
///
/// let root = Injector::new();
/// root.start()?;
///
/// let scoped = root.create_child(
///     InjectionScope::new(request, "GET /"),
///     [Provider::value(request_id.clone(), 17u64)],
/// )?;
/// assert_eq!(*scoped.inject::<u64>(request_id.clone()).await?, 17);
/// assert!(root.inject_optional::<u64>(request_id).await?.is_none());
///
/// scoped.dispose("request finished").await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Injector {
    inner: Arc<InjectorInner>,
}

struct InjectorInner {
    repository: Arc<Repository>,
    parent: Option<Injector>,
    started: Arc<AtomicBool>,
}

impl Injector {
    /// Creates a root injector with an empty repository.
    pub fn new() -> Self {
        Self::with_repository(Repository::root())
    }

    /// Creates a root injector over an existing repository.
    pub fn with_repository(repository: Arc<Repository>) -> Self {
        Self {
            inner: Arc::new(InjectorInner {
                repository,
                parent: None,
                started: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Enables resolution.
    pub fn start(&self) -> DiResult<()> {
        if let Some(reason) = self.inner.repository.disposed_reason() {
            return Err(DiError::Disposed(reason));
        }
        self.inner.started.store(true, Ordering::Release);
        tracing::debug!(scope = %self.scope(), "injector started");
        Ok(())
    }

    /// `true` once [`start`](Self::start) was called on this injector's root.
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Scope of this injector.
    pub fn scope(&self) -> &InjectionScope {
        self.inner.repository.scope()
    }

    /// Parent injector, `None` for a root.
    pub fn parent(&self) -> Option<&Injector> {
        self.inner.parent.as_ref()
    }

    /// Repository backing this injector.
    pub fn repository(&self) -> &Arc<Repository> {
        &self.inner.repository
    }

    /// Registers providers in this injector's repository. Allowed before and
    /// after [`start`](Self::start).
    pub fn register<S, I, R>(&self, source: S, items: I) -> DiResult<()>
    where
        S: Into<RegistrationSource>,
        I: IntoIterator<Item = R>,
        R: Into<Registerable>,
    {
        self.inner.repository.register(source, items)
    }

    fn ensure_ready(&self) -> DiResult<()> {
        if let Some(reason) = self.inner.repository.disposed_reason() {
            return Err(DiError::Disposed(reason));
        }
        if !self.is_started() {
            return Err(DiError::ContainerNotInitialized);
        }
        Ok(())
    }

    async fn resolve_with(&self, token: InjectionToken, optional: bool) -> DiResult<ResolveResult> {
        self.ensure_ready()?;
        resolver::resolve(self.inner.repository.clone(), token, optional, None).await
    }

    /// Resolves `token` to a [`ResolveResult`] the caller owns and disposes.
    pub async fn resolve(&self, token: impl Into<InjectionToken>) -> DiResult<ResolveResult> {
        self.resolve_with(token.into(), false).await
    }

    /// Like [`resolve`](Self::resolve), yielding an absent result instead of
    /// a missing-provider error.
    pub async fn resolve_optional(&self, token: impl Into<InjectionToken>) -> DiResult<ResolveResult> {
        self.resolve_with(token.into(), true).await
    }

    // Resolution whose disposal is left to this injector. Only scoped
    // injectors keep results; at the root, callers own disposal via `resolve`.
    async fn inject_owned(&self, token: InjectionToken, optional: bool) -> DiResult<Injected> {
        let result = self.resolve_with(token, optional).await?;
        if result.context().needs_dispose() {
            if self.inner.parent.is_some() {
                self.inner.repository.adopt(result.context().clone());
            } else {
                tracing::trace!(token = %result.token(), "injected result left to the caller");
            }
        }
        Ok(result.injected())
    }

    /// Untyped entry point for dynamically supplied tokens.
    ///
    /// `None` fails with [`DiError::MissingToken`]; a value that is not a
    /// token fails with [`DiError::InjectionTokenType`].
    pub async fn inject_any(&self, token: Option<&(dyn Any + Send + Sync)>, optional: bool) -> DiResult<Injected> {
        let token = match token {
            None => return Err(DiError::MissingToken("token argument of Injector::inject_any".to_string())),
            Some(token) => InjectionToken::from_any(token)?,
        };
        self.inject_owned(token, optional).await
    }

    /// Resolves a single value of type `T`.
    ///
    /// A transient with disposal hooks injected from a child injector is
    /// disposed together with that injector. The root injector does not keep
    /// such values; use [`resolve`](Self::resolve) to dispose them.
    pub async fn inject<T: Send + Sync + 'static>(&self, token: impl Into<InjectionToken>) -> DiResult<Arc<T>> {
        let token = token.into();
        let missing = token.to_string();
        self.inject_owned(token, false)
            .await?
            .single::<T>()?
            .ok_or_else(|| DiError::MissingProvider {
                token: missing,
                chain: String::new(),
            })
    }

    /// Resolves `T` by its own type token.
    pub async fn get<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.inject::<T>(InjectionToken::of::<T>()).await
    }

    /// Resolves `T`, or `None` when nothing provides the token.
    pub async fn inject_optional<T: Send + Sync + 'static>(
        &self,
        token: impl Into<InjectionToken>,
    ) -> DiResult<Option<Arc<T>>> {
        self.inject_owned(token.into(), true).await?.single::<T>()
    }

    /// Resolves every value of a multi token (a single value yields one element).
    pub async fn inject_all<T: Send + Sync + 'static>(&self, token: impl Into<InjectionToken>) -> DiResult<Vec<Arc<T>>> {
        self.inject_owned(token.into(), false).await?.all::<T>()
    }

    /// Resolves a trait object registered through `value_dyn`/`factory_dyn`.
    pub async fn inject_dyn<T: ?Sized + Send + Sync + 'static>(
        &self,
        token: impl Into<InjectionToken>,
    ) -> DiResult<Arc<T>> {
        let token = token.into();
        match self.inject_owned(token.clone(), false).await? {
            Injected::Single(value) => downcast_dyn::<T>(value),
            _ => Err(DiError::TypeMismatch(format!("{} for {}", type_name::<T>(), token))),
        }
    }

    /// `true` if an applicable, scope-permitted provider exists for `token`.
    pub fn can_resolve(&self, token: impl Into<InjectionToken>) -> bool {
        self.inner
            .repository
            .get(&token.into())
            .map_or(false, |matches| !matches.is_empty())
    }

    /// Creates a child injector tagged with `scope`, extending this one with
    /// `providers`.
    pub fn create_child<I, R>(&self, scope: InjectionScope, providers: I) -> DiResult<Injector>
    where
        I: IntoIterator<Item = R>,
        R: Into<Registerable>,
    {
        if let Some(reason) = self.inner.repository.disposed_reason() {
            return Err(DiError::Disposed(reason));
        }
        let repository = self.inner.repository.child(scope);
        repository.register(RegistrationSource::new(format!("scope {}", repository.scope())), providers)?;
        Ok(Injector {
            inner: Arc::new(InjectorInner {
                repository,
                parent: Some(self.clone()),
                started: self.inner.started.clone(),
            }),
        })
    }

    /// Calls `method` on `instance` with its injected parameters.
    ///
    /// Parameters come from the metadata recorded for `T::method` (see
    /// [`metadata`]). They resolve in a child scope seeded with `providers`,
    /// built by the method's or type's scope function, or an invocation scope
    /// by default. The child is disposed once the method returns.
    pub async fn invoke<T, R, I, P>(&self, instance: Arc<T>, method: &Method<T, R>, providers: I) -> DiResult<R>
    where
        T: Send + Sync + 'static,
        R: Send + 'static,
        I: IntoIterator<Item = P>,
        P: Into<Registerable>,
    {
        self.ensure_ready()?;
        let owner = format!("{}::{}", type_name::<T>(), method.name);
        let meta = metadata::method_metadata::<T>(method.name)?;
        let deps = meta.dependencies(&owner)?;

        let target = ScopeTarget {
            type_name: type_name::<T>(),
            method: method.name,
        };
        let scope = match &meta.scope_fn {
            Some(scope_fn) => scope_fn(&target),
            None => InjectionScope::invocation(target.type_name, target.method),
        };
        let child = self.create_child(scope, providers)?;
        let repository = child.repository().clone();

        let context = ResolverContext::new(SymbolToken::new(owner.clone()).into(), repository.scope().clone(), None);
        let outcome = async {
            let outcomes = join_all(deps.iter().map(|dep| {
                resolver::resolve(repository.clone(), dep.token.clone(), dep.optional, Some(context.clone()))
            }))
            .await;
            let resolved = resolver::adopt_all(&context, outcomes)?;
            let entries = deps
                .iter()
                .zip(&resolved)
                .map(|(dep, result)| (dep.token.clone(), result.injected()))
                .collect();
            tracing::trace!(method = %owner, "invoking");
            (method.call)(instance, Args::new(owner.clone(), entries))
                .await
                .map_err(|source| DiError::Invocation {
                    method: owner.clone(),
                    source,
                })
        }
        .await;

        repository.adopt(context);
        child.dispose("invocation complete").await;
        outcome
    }

    /// Disposes every singleton and adopted result this injector owns.
    /// Further resolution from it (or its children) fails with
    /// [`DiError::Disposed`].
    pub async fn dispose(&self, reason: &str) {
        self.inner.repository.dispose(reason).await;
    }

    /// `true` once this injector or an ancestor was disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.repository.is_disposed()
    }
}

impl Default for Injector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("scope", self.scope())
            .field("started", &self.is_started())
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

type MethodFn<T, R> = Arc<dyn Fn(Arc<T>, Args) -> BoxFuture<'static, Result<R, BoxError>> + Send + Sync>;

/// A named method [`Injector::invoke`] can call with injected arguments.
///
/// ```rust
/// use dandi::{Method, metadata::MethodDecorator, SymbolToken};
/// use std::sync::Arc;
///
/// struct Greeter;
///
/// let name = SymbolToken::for_key("method-doc-name");
/// MethodDecorator::<Greeter>::new("greet").inject(0, name)?;
///
/// let greet = Method::new("greet", |_greeter: Arc<Greeter>, args| async move {
///     let name = args.get::<String>(0)?;
///     Ok::<_, dandi::DiError>(format!("hello {}", name))
/// });
/// assert_eq!(greet.name(), "greet");
/// # Ok::<(), dandi::DiError>(())
/// ```
pub struct Method<T, R> {
    name: &'static str,
    call: MethodFn<T, R>,
}

impl<T, R> Method<T, R>
where
    T: Send + Sync + 'static,
    R: Send + 'static,
{
    /// Wraps an async method body.
    pub fn new<F, Fut, E>(name: &'static str, body: F) -> Self
    where
        F: Fn(Arc<T>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let call: MethodFn<T, R> =
            Arc::new(move |instance: Arc<T>, args: Args| -> BoxFuture<'static, Result<R, BoxError>> {
                body(instance, args).map(|result| result.map_err(Into::into)).boxed()
            });
        Self { name, call }
    }

    /// Method name metadata is recorded under.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T, R> Clone for Method<T, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            call: self.call.clone(),
        }
    }
}

impl<T, R> fmt::Debug for Method<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method").field("name", &self.name).finish()
    }
}
