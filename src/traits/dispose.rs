//! Disposal traits for resource cleanup.

/// Trait for synchronous resource disposal.
///
/// Implement this trait for services that need structured teardown (e.g., flushing caches,
/// closing handles) and register the provider with
/// [`ProviderBuilder::dispose_sync`](crate::ProviderBuilder::dispose_sync). The hook runs when
/// the value's resolver context is disposed.
///
/// # Examples
///
/// ```
/// use dandi::{Dispose, Provider};
///
/// struct Cache {
///     name: String,
/// }
///
/// impl Dispose for Cache {
///     fn dispose(&self) {
///         println!("Flushing cache: {}", self.name);
///     }
/// }
///
/// let provider = Provider::factory_sync(
///     dandi::token_of::<Cache>(),
///     Vec::<dandi::Dependency>::new(),
///     |_| Ok::<_, dandi::DiError>(Cache { name: "user_cache".to_string() }),
/// )
/// .dispose_sync::<Cache>()
/// .build();
/// assert!(provider.has_disposer());
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Perform synchronous cleanup of resources.
    fn dispose(&self);
}

/// Trait for asynchronous resource disposal.
///
/// Implement this trait for services that require async teardown (e.g., graceful connection
/// shutdown) and register the provider with
/// [`ProviderBuilder::dispose_with`](crate::ProviderBuilder::dispose_with).
///
/// # Examples
///
/// ```
/// use dandi::{AsyncDispose, Provider};
/// use async_trait::async_trait;
///
/// struct DatabaseClient {
///     connection_id: String,
/// }
///
/// #[async_trait]
/// impl AsyncDispose for DatabaseClient {
///     async fn dispose(&self) {
///         println!("Closing database connection: {}", self.connection_id);
///     }
/// }
///
/// let provider = Provider::value(
///     dandi::token_of::<DatabaseClient>(),
///     DatabaseClient { connection_id: "conn_123".to_string() },
/// )
/// .dispose_with::<DatabaseClient>()
/// .build();
/// assert!(provider.has_disposer());
/// ```
#[async_trait::async_trait]
pub trait AsyncDispose: Send + Sync + 'static {
    /// Perform asynchronous cleanup of resources.
    async fn dispose(&self);
}
