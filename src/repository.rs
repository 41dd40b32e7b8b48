//! Per-scope provider registrations.
//!
//! A repository maps tokens to the ordered providers registered for them and
//! chains to its parent. Lookups are innermost-first: non-multi tokens use the
//! innermost applicable registration, multi tokens collect every level from
//! the root down.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;

use crate::error::{DiError, DiResult};
use crate::injectable::InjectableDef;
use crate::internal::{run_hooks, DisposeBag};
use crate::provider::{AnyArc, Provider, ProviderBuilder, ProviderKind};
use crate::resolver::ResolverContext;
use crate::scope::InjectionScope;
use crate::token::{InjectionToken, SymbolToken};

/// Who registered a set of providers, kept for diagnostics and removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistrationSource(Cow<'static, str>);

impl RegistrationSource {
    /// Creates a source label.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// The label.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for RegistrationSource {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for RegistrationSource {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl fmt::Display for RegistrationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anything a repository accepts: a provider or an `Injectable` registration.
#[derive(Debug, Clone)]
pub enum Registerable {
    /// Explicit provider
    Provider(Provider),
    /// Constructible type, expanded into class providers
    Injectable(InjectableDef),
}

impl Registerable {
    /// Converts a dynamically typed registration.
    ///
    /// Accepts [`Registerable`], [`Provider`], [`ProviderBuilder`] and
    /// [`InjectableDef`]; anything else fails with [`DiError::ProviderType`].
    pub fn from_any(value: Box<dyn Any>) -> DiResult<Self> {
        let value = match value.downcast::<Registerable>() {
            Ok(registerable) => return Ok(*registerable),
            Err(value) => value,
        };
        let value = match value.downcast::<Provider>() {
            Ok(provider) => return Ok(Registerable::Provider(*provider)),
            Err(value) => value,
        };
        let value = match value.downcast::<ProviderBuilder>() {
            Ok(builder) => return Ok(Registerable::Provider(builder.build())),
            Err(value) => value,
        };
        match value.downcast::<InjectableDef>() {
            Ok(def) => Ok(Registerable::Injectable(*def)),
            Err(_) => Err(DiError::ProviderType(
                "expected a value, factory or class provider".to_string(),
            )),
        }
    }

    /// Providers this registration contributes.
    pub fn into_providers(self) -> Vec<Provider> {
        match self {
            Registerable::Provider(provider) => vec![provider],
            Registerable::Injectable(def) => def.providers(),
        }
    }
}

impl From<Provider> for Registerable {
    fn from(provider: Provider) -> Self {
        Registerable::Provider(provider)
    }
}

impl From<ProviderBuilder> for Registerable {
    fn from(builder: ProviderBuilder) -> Self {
        Registerable::Provider(builder.build())
    }
}

impl From<InjectableDef> for Registerable {
    fn from(def: InjectableDef) -> Self {
        Registerable::Injectable(def)
    }
}

/// One registered provider plus its singleton cell.
pub(crate) struct ProviderEntry {
    pub(crate) provider: Provider,
    pub(crate) source: RegistrationSource,
    pub(crate) singleton: Option<OnceCell<AnyArc>>,
}

impl ProviderEntry {
    fn new(provider: Provider, source: RegistrationSource) -> Self {
        let singleton = match provider.kind() {
            ProviderKind::Value(_) => None,
            _ if provider.options().singleton => Some(OnceCell::new()),
            _ => None,
        };
        Self {
            provider,
            source,
            singleton,
        }
    }
}

/// A provider selected for a lookup together with the repository declaring it.
#[derive(Clone)]
pub(crate) struct ProviderMatch {
    pub(crate) entry: Arc<ProviderEntry>,
    pub(crate) owner: Arc<Repository>,
}

/// Token → providers store for one injector scope.
///
/// # Examples
///
/// ```rust
/// use dandi::{Provider, Repository, SymbolToken, InjectionToken};
///
/// let port = SymbolToken::for_key("repository-doc-port");
/// let root = Repository::root();
/// root.register("defaults", [Provider::value(port.clone(), 80u16)])?;
///
/// let child = root.child(dandi::InjectionScope::root());
/// child.register("override", [Provider::value(port.clone(), 8080u16)])?;
///
/// assert!(child.has(&port.clone().into()));
/// assert_eq!(root.remove_source(&"defaults".into()), 1);
/// assert!(!root.has(&port.into()));
/// # Ok::<(), dandi::DiError>(())
/// ```
pub struct Repository {
    parent: Option<Arc<Repository>>,
    scope: InjectionScope,
    entries: RwLock<AHashMap<InjectionToken, Vec<Arc<ProviderEntry>>>>,
    owned: Mutex<Vec<Arc<ResolverContext>>>,
    // value-provider disposers, one bag per registration batch
    value_hooks: Mutex<Vec<(RegistrationSource, DisposeBag)>>,
    disposed: RwLock<Option<String>>,
}

impl Repository {
    /// Creates a root repository.
    pub fn root() -> Arc<Self> {
        Arc::new(Self::new(None, InjectionScope::root()))
    }

    /// Creates a child repository extending this one.
    pub fn child(self: &Arc<Self>, scope: InjectionScope) -> Arc<Self> {
        Arc::new(Self::new(Some(self.clone()), scope))
    }

    fn new(parent: Option<Arc<Repository>>, scope: InjectionScope) -> Self {
        Self {
            parent,
            scope,
            entries: RwLock::new(AHashMap::new()),
            owned: Mutex::new(Vec::new()),
            value_hooks: Mutex::new(Vec::new()),
            disposed: RwLock::new(None),
        }
    }

    /// Scope this repository belongs to.
    pub fn scope(&self) -> &InjectionScope {
        &self.scope
    }

    /// Parent repository, `None` for the root.
    pub fn parent(&self) -> Option<&Arc<Repository>> {
        self.parent.as_ref()
    }

    /// Registers providers and `Injectable` definitions under `source`.
    ///
    /// The batch is rejected as a whole with
    /// [`DiError::ConflictingProviders`] if it would leave a token with both
    /// multi and non-multi providers in this repository.
    pub fn register<S, I, R>(&self, source: S, items: I) -> DiResult<()>
    where
        S: Into<RegistrationSource>,
        I: IntoIterator<Item = R>,
        R: Into<Registerable>,
    {
        if let Some(reason) = self.disposed_reason() {
            return Err(DiError::Disposed(reason));
        }
        let source = source.into();
        let providers: Vec<Provider> = items
            .into_iter()
            .flat_map(|item| item.into().into_providers())
            .collect();

        let mut entries = self.entries.write();
        let mut multi_flags: AHashMap<&InjectionToken, bool> = AHashMap::new();
        for provider in &providers {
            let token = provider.provide();
            let existing = multi_flags
                .get(token)
                .copied()
                .or_else(|| entries.get(token).and_then(|e| e.first()).map(|e| e.provider.options().multi));
            match existing {
                Some(multi) if multi != provider.options().multi => {
                    return Err(DiError::ConflictingProviders {
                        token: token.to_string(),
                        reason: "multi and non-multi providers registered in the same scope".to_string(),
                    });
                }
                _ => {
                    multi_flags.insert(token, provider.options().multi);
                }
            }
        }

        let mut hooks = DisposeBag::default();
        for provider in providers {
            if let (ProviderKind::Value(value), Some(disposer)) = (provider.kind(), provider.disposer()) {
                let (value, disposer) = (value.clone(), disposer.clone());
                hooks.push(move || disposer(value));
            }
            let list = entries.entry(provider.provide().clone()).or_default();
            if !provider.options().multi && !list.is_empty() {
                tracing::debug!(token = %provider.provide(), source = %source, "overriding provider");
            }
            list.push(Arc::new(ProviderEntry::new(provider, source.clone())));
        }
        if !hooks.is_empty() {
            self.value_hooks.lock().push((source, hooks));
        }
        Ok(())
    }

    /// Removes every provider registered under `source`, returning how many
    /// were removed. Disposers of the removed value providers are dropped
    /// without running.
    pub fn remove_source(&self, source: &RegistrationSource) -> usize {
        self.value_hooks.lock().retain(|(tagged, _)| tagged != source);
        let mut entries = self.entries.write();
        let mut removed = 0;
        entries.retain(|_, list| {
            let before = list.len();
            list.retain(|entry| &entry.source != source);
            removed += before - list.len();
            !list.is_empty()
        });
        removed
    }

    /// Distinct registration sources, in first-seen order.
    pub fn sources(&self) -> Vec<RegistrationSource> {
        let entries = self.entries.read();
        let mut sources: Vec<RegistrationSource> = Vec::new();
        for entry in entries.values().flatten() {
            if !sources.contains(&entry.source) {
                sources.push(entry.source.clone());
            }
        }
        sources
    }

    /// `true` if this repository or an ancestor has any provider for `token`,
    /// ignoring scope restrictions.
    pub fn has(&self, token: &InjectionToken) -> bool {
        self.entries.read().get(token).map_or(false, |e| !e.is_empty())
            || self.parent.as_ref().map_or(false, |p| p.has(token))
    }

    /// Providers that apply to `token` from this repository.
    ///
    /// Empty when nothing applies. A chain mixing multi and non-multi
    /// providers across levels fails with [`DiError::ConflictingProviders`].
    pub(crate) fn get(self: &Arc<Self>, token: &InjectionToken) -> DiResult<Vec<ProviderMatch>> {
        // innermost first
        let mut levels: Vec<(Arc<Repository>, Vec<Arc<ProviderEntry>>)> = Vec::new();
        let mut current = Some(self.clone());
        while let Some(repo) = current {
            let applicable: Vec<_> = repo
                .entries
                .read()
                .get(token)
                .map(|list| {
                    list.iter()
                        .filter(|entry| self.permits(entry.provider.options().restrict_scope.as_ref()))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            current = repo.parent.clone();
            if !applicable.is_empty() {
                levels.push((repo, applicable));
            }
        }

        let multi = match levels.first() {
            None => return Ok(Vec::new()),
            Some((_, entries)) => entries[0].provider.options().multi,
        };
        if levels
            .iter()
            .flat_map(|(_, entries)| entries)
            .any(|entry| entry.provider.options().multi != multi)
        {
            return Err(DiError::ConflictingProviders {
                token: token.to_string(),
                reason: "multi and non-multi providers across scopes".to_string(),
            });
        }

        if !multi {
            let (owner, entries) = levels.swap_remove(0);
            let entry = entries.last().cloned();
            return Ok(entry.map(|entry| ProviderMatch { entry, owner }).into_iter().collect());
        }
        Ok(levels
            .into_iter()
            .rev()
            .flat_map(|(owner, entries)| {
                entries.into_iter().map(move |entry| ProviderMatch {
                    entry,
                    owner: owner.clone(),
                })
            })
            .collect())
    }

    // A restricted provider applies when any scope from here to the root matches.
    fn permits(&self, restrict: Option<&SymbolToken>) -> bool {
        match restrict {
            None => true,
            Some(scope_type) => self.in_scope(scope_type),
        }
    }

    fn in_scope(&self, scope_type: &SymbolToken) -> bool {
        self.scope.is(scope_type) || self.parent.as_ref().map_or(false, |p| p.in_scope(scope_type))
    }

    pub(crate) fn adopt(&self, context: Arc<ResolverContext>) {
        self.owned.lock().push(context);
    }

    /// Number of resolution contexts (singletons and adopted results) this
    /// repository will dispose.
    pub fn owned_contexts(&self) -> usize {
        self.owned.lock().len()
    }

    /// Reason this repository (or an ancestor) was disposed, if it was.
    pub fn disposed_reason(&self) -> Option<String> {
        if let Some(reason) = self.disposed.read().clone() {
            return Some(reason);
        }
        self.parent.as_ref().and_then(|p| p.disposed_reason())
    }

    /// `true` once this repository or an ancestor has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed_reason().is_some()
    }

    /// Disposes every context this repository owns (singletons and adopted
    /// results, newest first), then value-provider disposers.
    ///
    /// Disposing twice is a no-op.
    pub async fn dispose(&self, reason: &str) {
        {
            let mut disposed = self.disposed.write();
            if disposed.is_some() {
                return;
            }
            *disposed = Some(reason.to_string());
        }
        tracing::debug!(scope = %self.scope, reason, "disposing repository");

        let owned: Vec<_> = self.owned.lock().drain(..).rev().collect();
        for context in owned {
            context.dispose(reason).await;
        }
        let hooks: Vec<_> = self
            .value_hooks
            .lock()
            .drain(..)
            .rev()
            .flat_map(|(_, mut bag)| bag.drain_reverse())
            .collect();
        run_hooks(hooks).await;
    }

    /// Human-readable dump of this repository's registrations.
    #[cfg(feature = "diagnostics")]
    pub fn describe(&self) -> String {
        use std::fmt::Write as _;

        let entries = self.entries.read();
        let mut tokens: Vec<_> = entries.iter().collect();
        tokens.sort_by_key(|(token, _)| token.to_string());

        let mut out = format!("Repository ({})\n", self.scope);
        for (token, list) in tokens {
            for entry in list {
                let options = entry.provider.options();
                let _ = writeln!(
                    out,
                    "  {} <- {:?} from {}{}{}",
                    token,
                    entry.provider.shape(),
                    entry.source,
                    if options.singleton { " [singleton]" } else { "" },
                    if options.multi { " [multi]" } else { "" },
                );
            }
        }
        out
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("scope", &self.scope)
            .field("tokens", &self.entries.read().len())
            .field("has_parent", &self.parent.is_some())
            .field("disposed", &self.disposed.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(name: &str) -> InjectionToken {
        SymbolToken::new(name).into()
    }

    fn values(matches: &[ProviderMatch]) -> Vec<u32> {
        matches
            .iter()
            .map(|m| match m.entry.provider.kind() {
                ProviderKind::Value(v) => *v.clone().downcast::<u32>().unwrap(),
                _ => panic!("expected value provider"),
            })
            .collect()
    }

    #[test]
    fn last_non_multi_wins_within_level() {
        let t = token("port");
        let root = Repository::root();
        root.register("a", [Provider::value(t.clone(), 1u32)]).unwrap();
        root.register("b", [Provider::value(t.clone(), 2u32)]).unwrap();
        assert_eq!(values(&root.get(&t).unwrap()), vec![2]);
    }

    #[test]
    fn multi_collects_root_first() {
        let t = token("plugins");
        let root = Repository::root();
        root.register("root", [
            Provider::value(t.clone(), 1u32).multi(),
            Provider::value(t.clone(), 2u32).multi(),
        ])
        .unwrap();
        let child = root.child(InjectionScope::root());
        child.register("child", [Provider::value(t.clone(), 3u32).multi()]).unwrap();

        assert_eq!(values(&child.get(&t).unwrap()), vec![1, 2, 3]);
        assert_eq!(values(&root.get(&t).unwrap()), vec![1, 2]);
    }

    #[test]
    fn mixing_multi_in_one_level_is_rejected() {
        let t = token("mixed");
        let root = Repository::root();
        root.register("a", [Provider::value(t.clone(), 1u32).multi()]).unwrap();
        let err = root.register("b", [Provider::value(t.clone(), 2u32)]).unwrap_err();
        assert!(matches!(err, DiError::ConflictingProviders { .. }));

        let fresh = token("batch");
        let err = root
            .register("c", [
                Provider::value(fresh.clone(), 1u32),
                Provider::value(fresh.clone(), 2u32).multi(),
            ])
            .unwrap_err();
        assert!(matches!(err, DiError::ConflictingProviders { .. }));
        assert!(!root.has(&fresh));
    }

    #[test]
    fn mixing_multi_across_levels_fails_lookup() {
        let t = token("layered");
        let root = Repository::root();
        root.register("root", [Provider::value(t.clone(), 1u32).multi()]).unwrap();
        let child = root.child(InjectionScope::root());
        child.register("child", [Provider::value(t.clone(), 2u32)]).unwrap();
        assert!(matches!(child.get(&t), Err(DiError::ConflictingProviders { .. })));
    }

    #[test]
    fn restricted_provider_needs_matching_scope() {
        let request = SymbolToken::new("Request");
        let t = token("user");
        let root = Repository::root();
        root.register("root", [Provider::value(t.clone(), 7u32).restrict_scope(request.clone())])
            .unwrap();

        assert!(root.get(&t).unwrap().is_empty());
        let inside = root.child(InjectionScope::new(request, "GET /"));
        assert_eq!(values(&inside.get(&t).unwrap()), vec![7]);
        let nested = inside.child(InjectionScope::root());
        assert_eq!(values(&nested.get(&t).unwrap()), vec![7]);
    }

    #[test]
    fn from_any_rejects_unknown_shapes() {
        let ok = Registerable::from_any(Box::new(Provider::value(token("v"), 1u32)));
        assert!(matches!(ok, Ok(Registerable::Provider(_))));
        let err = Registerable::from_any(Box::new(42u32)).unwrap_err();
        assert!(matches!(err, DiError::ProviderType(_)));
    }

    #[test]
    fn sources_are_tracked() {
        let root = Repository::root();
        root.register("first", [Provider::value(token("a"), 1u32)]).unwrap();
        root.register(String::from("second"), [Provider::value(token("b"), 2u32)]).unwrap();
        let mut names: Vec<_> = root.sources().iter().map(|s| s.name().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn removed_source_drops_its_value_hooks() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counting = |calls: &Arc<AtomicUsize>| {
            let calls = calls.clone();
            move |_: Arc<u32>| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {}
            }
        };
        let root = Repository::root();
        root.register("fixture", [Provider::value(token("temp"), 1u32).on_dispose(counting(&calls))])
            .unwrap();
        root.register("app", [Provider::value(token("kept"), 2u32).on_dispose(counting(&calls))])
            .unwrap();

        assert_eq!(root.remove_source(&"fixture".into()), 1);
        root.dispose("shutdown").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispose_rejects_registration_and_runs_value_hooks() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let root = Repository::root();
        root.register("values", [Provider::value(token("conn"), 5u32).on_dispose(move |_: Arc<u32>| {
            seen.fetch_add(1, Ordering::SeqCst);
            async {}
        })])
        .unwrap();

        root.dispose("shutdown").await;
        root.dispose("again").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(root.disposed_reason().as_deref(), Some("shutdown"));
        assert!(matches!(
            root.register("late", [Provider::value(token("x"), 1u32)]),
            Err(DiError::Disposed(_))
        ));
        assert!(root.child(InjectionScope::root()).is_disposed());
    }
}
