//! Resolution algorithm and per-request resolution contexts.
//!
//! Every token request creates a [`ResolverContext`] chained to the context
//! that asked for it. The chain drives cycle detection and the diagnostic
//! trail rendered into missing-provider errors; the context tree owns the
//! disposal hooks of what it produced.

use std::fmt::{self, Write as _};
use std::sync::{Arc, Weak};

use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;

use crate::error::{DiError, DiResult};
use crate::internal::{run_hooks, DisposeBag};
use crate::provider::{AnyArc, Args, Injected, Provider, ProviderKind};
use crate::repository::{ProviderMatch, Repository};
use crate::scope::InjectionScope;
use crate::token::InjectionToken;

/// Lifecycle of a single resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// Created, provider not chosen yet
    Requested,
    /// Waiting on dependencies
    ResolvingDependencies,
    /// Running the factory or constructor
    Instantiating,
    /// Value produced
    Resolved,
    /// Missing provider, cycle or factory failure
    Failed,
    /// Disposed after resolution
    Disposed,
}

/// One frame of a resolution: the token requested, the scope it resolved
/// against, the chosen provider and what it owns.
pub struct ResolverContext {
    token: InjectionToken,
    scope: InjectionScope,
    parent: Option<Weak<ResolverContext>>,
    provider: Mutex<Option<Provider>>,
    state: Mutex<ResolutionState>,
    disposed_reason: Mutex<Option<String>>,
    children: Mutex<Vec<Arc<ResolverContext>>>,
    hooks: Mutex<DisposeBag>,
}

impl ResolverContext {
    pub(crate) fn new(
        token: InjectionToken,
        scope: InjectionScope,
        parent: Option<&Arc<ResolverContext>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            token,
            scope,
            parent: parent.map(Arc::downgrade),
            provider: Mutex::new(None),
            state: Mutex::new(ResolutionState::Requested),
            disposed_reason: Mutex::new(None),
            children: Mutex::new(Vec::new()),
            hooks: Mutex::new(DisposeBag::default()),
        })
    }

    /// Token being resolved.
    pub fn token(&self) -> &InjectionToken {
        &self.token
    }

    /// Scope of the repository the token was resolved against.
    pub fn scope(&self) -> &InjectionScope {
        &self.scope
    }

    /// The requesting context, while it is still alive.
    pub fn parent(&self) -> Option<Arc<ResolverContext>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Provider chosen for the token, once one was.
    pub fn provider(&self) -> Option<Provider> {
        self.provider.lock().clone()
    }

    /// Current state.
    pub fn state(&self) -> ResolutionState {
        *self.state.lock()
    }

    /// `true` once disposed.
    pub fn is_disposed(&self) -> bool {
        self.state() == ResolutionState::Disposed
    }

    /// Reason given to [`dispose`](Self::dispose).
    pub fn disposed_reason(&self) -> Option<String> {
        self.disposed_reason.lock().clone()
    }

    /// Contexts owned by this one (dependencies, multi elements).
    pub fn children(&self) -> Vec<Arc<ResolverContext>> {
        self.children.lock().clone()
    }

    fn set_state(&self, state: ResolutionState) {
        *self.state.lock() = state;
    }

    pub(crate) fn adopt(&self, child: Arc<ResolverContext>) {
        self.children.lock().push(child);
    }

    // Anything to run on disposal in this subtree.
    pub(crate) fn needs_dispose(&self) -> bool {
        !self.hooks.lock().is_empty() || self.children.lock().iter().any(|c| c.needs_dispose())
    }

    fn ancestors(&self) -> impl Iterator<Item = Arc<ResolverContext>> {
        std::iter::successors(self.parent(), |ctx| ctx.parent())
    }

    fn check_circular(&self) -> DiResult<()> {
        let ancestors: Vec<_> = self.ancestors().collect();
        if !ancestors.iter().any(|ctx| ctx.token == self.token) {
            return Ok(());
        }
        let mut path: Vec<String> = Vec::new();
        for ctx in ancestors.iter().rev() {
            let name = ctx.token.to_string();
            // multi aggregates and their elements share a token
            if path.last() != Some(&name) {
                path.push(name);
            }
        }
        path.push(self.token.to_string());
        Err(DiError::Circular(path))
    }

    fn missing_provider(&self) -> DiError {
        let mut chain = String::new();
        let mut previous: Option<InjectionToken> = None;
        for ctx in self.ancestors() {
            if previous.as_ref() == Some(&ctx.token) {
                continue;
            }
            let _ = write!(chain, "\n  while resolving {} (scope: {})", ctx.token, ctx.scope);
            previous = Some(ctx.token.clone());
        }
        DiError::MissingProvider {
            token: self.token.to_string(),
            chain,
        }
    }

    /// Marks the context disposed, runs its hooks (newest first) and then
    /// disposes the contexts it owns.
    ///
    /// Disposing twice is a no-op.
    pub fn dispose<'a>(&'a self, reason: &'a str) -> BoxFuture<'a, ()> {
        async move {
            {
                let mut state = self.state.lock();
                if *state == ResolutionState::Disposed {
                    return;
                }
                *state = ResolutionState::Disposed;
            }
            *self.disposed_reason.lock() = Some(reason.to_string());
            tracing::trace!(token = %self.token, reason, "disposing context");
            self.release(reason).await;
        }
        .boxed()
    }

    // Runs the hooks and disposes the children without changing the state.
    pub(crate) async fn release(&self, reason: &str) {
        let hooks = self.hooks.lock().drain_reverse();
        run_hooks(hooks).await;
        let children: Vec<_> = self.children.lock().drain(..).rev().collect();
        for child in children {
            child.dispose(reason).await;
        }
    }
}

impl fmt::Debug for ResolverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverContext")
            .field("token", &self.token)
            .field("scope", &self.scope)
            .field("state", &self.state())
            .field("children", &self.children.lock().len())
            .finish()
    }
}

enum Resolved {
    Absent,
    Single(AnyArc),
    Multi(Vec<ResolveResult>),
}

/// A resolved token: the value (or values) plus the context owning it.
///
/// # Examples
///
/// ```rust
/// use dandi::{Injector, Provider, SymbolToken};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> dandi::DiResult<()> {
/// let handlers = SymbolToken::for_key("resolve-doc-handlers");
/// let injector = Injector::new();
/// injector.register("doc", [
///     Provider::value(handlers.clone(), "auth").multi(),
///     Provider::value(handlers.clone(), "logging").multi(),
/// ])?;
/// injector.start()?;
///
/// let result = injector.resolve(handlers).await?;
/// assert!(result.is_multi());
/// assert_eq!(result.values().len(), 2);
///
/// result.dispose("done").await;
/// assert!(result.elements().iter().all(|e| e.is_disposed()));
/// # Ok(())
/// # }
/// ```
pub struct ResolveResult {
    context: Arc<ResolverContext>,
    value: Resolved,
}

impl ResolveResult {
    /// Context that produced the value.
    pub fn context(&self) -> &Arc<ResolverContext> {
        &self.context
    }

    /// Token that was resolved.
    pub fn token(&self) -> &InjectionToken {
        &self.context.token
    }

    /// `true` for a multi token.
    pub fn is_multi(&self) -> bool {
        matches!(self.value, Resolved::Multi(_))
    }

    /// `true` for an optional token without a provider.
    pub fn is_absent(&self) -> bool {
        matches!(self.value, Resolved::Absent)
    }

    /// Single-value view; `None` when absent or multi.
    pub fn value(&self) -> Option<AnyArc> {
        match &self.value {
            Resolved::Single(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Array view: every element of a multi token, or the single value.
    pub fn values(&self) -> Vec<AnyArc> {
        match &self.value {
            Resolved::Absent => Vec::new(),
            Resolved::Single(value) => vec![value.clone()],
            Resolved::Multi(elements) => elements.iter().filter_map(ResolveResult::value).collect(),
        }
    }

    /// Per-element results of a multi token.
    pub fn elements(&self) -> &[ResolveResult] {
        match &self.value {
            Resolved::Multi(elements) => elements,
            _ => &[],
        }
    }

    /// Untyped view of the value.
    pub fn injected(&self) -> Injected {
        match &self.value {
            Resolved::Absent => Injected::Absent,
            Resolved::Single(value) => Injected::Single(value.clone()),
            Resolved::Multi(_) => Injected::Multi(self.values()),
        }
    }

    /// `true` once the context has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.context.is_disposed()
    }

    /// Disposes the context and everything it owns; for a multi token that
    /// includes every element's context.
    pub async fn dispose(&self, reason: &str) {
        self.context.dispose(reason).await;
    }
}

impl fmt::Debug for ResolveResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match &self.value {
            Resolved::Absent => "absent".to_string(),
            Resolved::Single(_) => "single".to_string(),
            Resolved::Multi(elements) => format!("multi({})", elements.len()),
        };
        f.debug_struct("ResolveResult")
            .field("token", &self.context.token)
            .field("value", &value)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Resolves `token` from `repo`, chaining the new context to `parent`.
pub(crate) fn resolve(
    repo: Arc<Repository>,
    token: InjectionToken,
    optional: bool,
    parent: Option<Arc<ResolverContext>>,
) -> BoxFuture<'static, DiResult<ResolveResult>> {
    async move {
        let context = ResolverContext::new(token, repo.scope().clone(), parent.as_ref());
        let outcome = resolve_in(&repo, &context, optional).await;
        match outcome {
            Ok(value) => {
                context.set_state(ResolutionState::Resolved);
                Ok(ResolveResult { context, value })
            }
            Err(err) => {
                context.set_state(ResolutionState::Failed);
                tracing::debug!(token = %context.token, error = %err, "resolution failed");
                context.release("resolution failed").await;
                Err(err)
            }
        }
    }
    .boxed()
}

async fn resolve_in(
    repo: &Arc<Repository>,
    context: &Arc<ResolverContext>,
    optional: bool,
) -> DiResult<Resolved> {
    if let Some(reason) = repo.disposed_reason() {
        return Err(DiError::Disposed(reason));
    }
    context.check_circular()?;
    tracing::trace!(token = %context.token, scope = %context.scope, "resolving");

    let matches = repo.get(&context.token)?;
    let multi = match matches.first() {
        None if optional => return Ok(Resolved::Absent),
        None => return Err(context.missing_provider()),
        Some(first) => first.entry.provider.options().multi,
    };

    if !multi {
        let value = instantiate(repo, context, &matches[0]).await?;
        return Ok(Resolved::Single(value));
    }

    let outcomes = join_all(matches.iter().map(|matched| {
        let element = ResolverContext::new(context.token.clone(), matched.owner.scope().clone(), Some(context));
        async move {
            let value = instantiate(repo, &element, matched).await;
            match value {
                Ok(value) => {
                    element.set_state(ResolutionState::Resolved);
                    Ok(ResolveResult {
                        context: element,
                        value: Resolved::Single(value),
                    })
                }
                Err(err) => {
                    element.set_state(ResolutionState::Failed);
                    Err(err)
                }
            }
        }
    }))
    .await;
    // built elements stay owned by the aggregate so a failure still disposes them
    let elements = adopt_all(context, outcomes)?;
    Ok(Resolved::Multi(elements))
}

// Produces the value of one provider. Singletons are built once in the
// repository that declares them, against that repository.
async fn instantiate(
    repo: &Arc<Repository>,
    context: &Arc<ResolverContext>,
    matched: &ProviderMatch,
) -> DiResult<AnyArc> {
    let provider = &matched.entry.provider;
    *context.provider.lock() = Some(provider.clone());

    if let ProviderKind::Value(value) = provider.kind() {
        return Ok(value.clone());
    }
    match &matched.entry.singleton {
        Some(cell) => {
            let value = cell
                .get_or_try_init(|| async {
                    let owner = &matched.owner;
                    let singleton = ResolverContext::new(context.token.clone(), owner.scope().clone(), Some(context));
                    *singleton.provider.lock() = Some(provider.clone());
                    let value = construct(owner, &singleton, provider).await?;
                    singleton.set_state(ResolutionState::Resolved);
                    owner.adopt(singleton);
                    tracing::debug!(token = %context.token, scope = %owner.scope(), "singleton created");
                    Ok::<_, DiError>(value)
                })
                .await?;
            Ok(value.clone())
        }
        None => construct(repo, context, provider).await,
    }
}

async fn construct(
    repo: &Arc<Repository>,
    context: &Arc<ResolverContext>,
    provider: &Provider,
) -> DiResult<AnyArc> {
    let (deps, ctor, owner) = match provider.kind() {
        ProviderKind::Value(value) => return Ok(value.clone()),
        ProviderKind::Factory { deps, factory } => (deps, factory, context.token.to_string()),
        ProviderKind::Class { type_name, deps, ctor } => (deps, ctor, type_name.to_string()),
    };

    context.set_state(ResolutionState::ResolvingDependencies);
    let outcomes = join_all(
        deps.iter()
            .map(|dep| resolve(repo.clone(), dep.token.clone(), dep.optional, Some(context.clone()))),
    )
    .await;
    let resolved = match adopt_all(context, outcomes) {
        Ok(resolved) => resolved,
        Err(err) => {
            context.release("dependency failed").await;
            return Err(err);
        }
    };
    let entries = deps
        .iter()
        .zip(&resolved)
        .map(|(dep, result)| (dep.token.clone(), result.injected()))
        .collect();

    context.set_state(ResolutionState::Instantiating);
    let value = match ctor(Args::new(owner, entries)).await {
        Ok(value) => value,
        Err(source) => {
            context.release("factory failed").await;
            return Err(DiError::Factory {
                token: context.token.to_string(),
                source,
            });
        }
    };

    if let Some(disposer) = provider.disposer() {
        let (disposer, instance) = (disposer.clone(), value.clone());
        context.hooks.lock().push(move || disposer(instance));
    }
    Ok(value)
}

/// Adopts every successful result into `context`, then reports the first
/// failure, if any.
pub(crate) fn adopt_all(
    context: &ResolverContext,
    outcomes: Vec<DiResult<ResolveResult>>,
) -> DiResult<Vec<ResolveResult>> {
    let mut resolved = Vec::with_capacity(outcomes.len());
    let mut failure = None;
    for outcome in outcomes {
        match outcome {
            Ok(result) => {
                context.adopt(result.context.clone());
                resolved.push(result);
            }
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(resolved),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::SymbolToken;

    async fn resolve_root(repo: &Arc<Repository>, token: &InjectionToken) -> DiResult<ResolveResult> {
        resolve(repo.clone(), token.clone(), false, None).await
    }

    #[tokio::test]
    async fn chain_is_rendered_innermost_first() {
        let outer: InjectionToken = SymbolToken::new("Outer").into();
        let middle: InjectionToken = SymbolToken::new("Middle").into();
        let leaf: InjectionToken = SymbolToken::new("Leaf").into();

        let repo = Repository::root();
        repo.register("test", [
            Provider::factory_sync(outer.clone(), [middle.clone()], |_| Ok::<_, DiError>(1u8)),
            Provider::factory_sync(middle.clone(), [leaf.clone()], |_| Ok::<_, DiError>(2u8)),
        ])
        .unwrap();

        let err = resolve_root(&repo, &outer).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "No provider for Symbol(Leaf)\n  while resolving Symbol(Middle) (scope: root)\n  while resolving Symbol(Outer) (scope: root)"
        );
    }

    #[tokio::test]
    async fn self_dependency_is_circular() {
        let me: InjectionToken = SymbolToken::new("Me").into();
        let repo = Repository::root();
        repo.register("test", [Provider::factory_sync(me.clone(), [me.clone()], |_| Ok::<_, DiError>(()))])
            .unwrap();

        let err = resolve_root(&repo, &me).await.unwrap_err();
        assert_eq!(err.to_string(), "Circular dependency: Symbol(Me) -> Symbol(Me)");
    }

    #[tokio::test]
    async fn states_track_success_and_children() {
        let dep: InjectionToken = SymbolToken::new("dep").into();
        let top: InjectionToken = SymbolToken::new("top").into();
        let repo = Repository::root();
        repo.register("test", [
            Provider::value(dep.clone(), 1u8).build(),
            Provider::factory_sync(top.clone(), [dep.clone()], |args| {
                args.get::<u8>(0).map(|v| *v + 1)
            })
            .build(),
        ])
        .unwrap();

        let result = resolve_root(&repo, &top).await.unwrap();
        assert_eq!(result.context().state(), ResolutionState::Resolved);
        assert_eq!(result.context().children().len(), 1);
        assert_eq!(result.context().children()[0].token(), &dep);
        assert!(result.context().provider().is_some());
        assert!(!result.context().needs_dispose());
    }

    #[tokio::test]
    async fn factory_errors_are_wrapped() {
        let broken: InjectionToken = SymbolToken::new("broken").into();
        let repo = Repository::root();
        repo.register("test", [Provider::factory_sync(broken.clone(), Vec::<InjectionToken>::new(), |_| {
            Err::<u8, _>(DiError::Config("no url".into()))
        })])
        .unwrap();

        let err = resolve_root(&repo, &broken).await.unwrap_err();
        assert!(matches!(err, DiError::Factory { .. }));
        assert!(err.report().contains("Inner error: Configuration error: no url"));
    }
}
