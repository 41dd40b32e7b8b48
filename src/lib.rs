//! # dandi
//!
//! Async dependency injection runtime: tokens, providers, scoped injectors and a
//! disposal lifecycle.
//!
//! ## Features
//!
//! - **Identity tokens**: type, symbol and mapped tokens compared by identity
//! - **Three provider shapes**: values, async or sync factories, and [`Injectable`] classes
//! - **Scoped injectors**: child injectors per request, with scope-restricted providers
//! - **Singletons and multi tokens**: cached per declaring scope, or composed root-first
//! - **Cycle detection**: circular chains fail with the full path
//! - **Disposal**: per-result and per-injector teardown hooks
//!
//! ## Quick Start
//!
//! ```rust
//! use dandi::{Injectable, InjectableDef, InjectableOption, Injector, Args, BoxError, Dependency, token_of};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Engine;
//!
//! #[async_trait]
//! impl Injectable for Engine {
//!     async fn construct(_args: Args) -> Result<Self, BoxError> {
//!         Ok(Engine)
//!     }
//! }
//!
//! struct Car {
//!     engine: Arc<Engine>,
//! }
//!
//! #[async_trait]
//! impl Injectable for Car {
//!     fn dependencies() -> Vec<Dependency> {
//!         vec![Dependency::required(token_of::<Engine>())]
//!     }
//!
//!     async fn construct(args: Args) -> Result<Self, BoxError> {
//!         Ok(Car { engine: args.get::<Engine>(0)? })
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> dandi::DiResult<()> {
//! let injector = Injector::new();
//! injector.register("app", [
//!     InjectableDef::new::<Engine, _>(None, [InjectableOption::Singleton]),
//!     InjectableDef::of::<Car>(),
//! ])?;
//! injector.start()?;
//!
//! let a = injector.get::<Car>().await?;
//! let b = injector.get::<Car>().await?;
//! assert!(!Arc::ptr_eq(&a, &b));
//! assert!(Arc::ptr_eq(&a.engine, &b.engine));
//! # Ok(())
//! # }
//! ```
//!
//! ## Scopes
//!
//! Child injectors carry an [`InjectionScope`]. Providers registered with
//! `restrict_scope` only apply beneath a scope of that type; elsewhere they
//! behave as if they were not registered.
//!
//! ```rust
//! use dandi::{Injector, InjectionScope, Provider, SymbolToken};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> dandi::DiResult<()> {
//! let request = SymbolToken::for_key("lib-doc-request");
//! let user = SymbolToken::for_key("lib-doc-user");
//!
//! let root = Injector::new();
//! root.register("app", [Provider::value(user.clone(), "alice").restrict_scope(request.clone())])?;
//! root.start()?;
//!
//! assert!(!root.can_resolve(user.clone()));
//! let scoped = root.create_child(InjectionScope::new(request, "GET /me"), Vec::<dandi::Provider>::new())?;
//! assert_eq!(*scoped.inject::<&str>(user).await?, "alice");
//! # Ok(())
//! # }
//! ```
//!
//! ## Method invocation
//!
//! Parameter tokens for [`Injector::invoke`] are recorded with
//! [`metadata::MethodDecorator`]; see [`Method`].

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod injectable;
pub mod injector;
pub mod logger;
pub mod metadata;
pub mod provider;
pub mod registry;
pub mod repository;
pub mod resolver;
pub mod scope;
pub mod token;
pub mod traits;

// Internal modules
mod internal;

pub use bootstrap::{Bootstrapper, EntryPoint, Scanner, StaticScanner};
pub use config::{BootstrapConfig, ConfigClient, EnvConfigClient, MemoryConfigClient};
pub use error::{report, BoxError, DiError, DiResult};
pub use injectable::{Injectable, InjectableDef, InjectableOption, InjectableOptions};
pub use injector::{Injector, Method};
pub use logger::{Logger, TracingLogger};
pub use provider::{AnyArc, Args, Dependency, Injected, Provider, ProviderBuilder, ProviderOptions, ProviderShape};
pub use registry::{
    clear_registered_injectables, register_injectable, register_injectables, registered_injectables,
    try_register_injectable, AmbientScanner,
};
pub use repository::{Registerable, RegistrationSource, Repository};
pub use resolver::{ResolutionState, ResolveResult, ResolverContext};
pub use scope::{InjectionScope, ScopeFn, ScopeTarget};
pub use token::{is_injection_token, token_of, InjectionToken, MappedToken, SymbolToken, TypeToken};
pub use traits::{AsyncDispose, Dispose};
