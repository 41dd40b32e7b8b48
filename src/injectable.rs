//! Class-provider contract and `Injectable` registration descriptors.

use std::any::{type_name, Any};
use std::fmt;

use async_trait::async_trait;

use crate::error::{BoxError, DiResult};
use crate::provider::{Args, Dependency, Provider, ProviderBuilder, ProviderOptions};
use crate::token::{InjectionToken, SymbolToken};

/// A type the injector can construct.
///
/// `dependencies` lists the tokens resolved before `construct` runs; they
/// arrive in the same order in [`Args`].
///
/// # Examples
///
/// ```rust
/// use dandi::{Injectable, Args, Dependency, BoxError, token_of};
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct Engine;
///
/// #[async_trait]
/// impl Injectable for Engine {
///     async fn construct(_args: Args) -> Result<Self, BoxError> {
///         Ok(Engine)
///     }
/// }
///
/// struct Car {
///     engine: Arc<Engine>,
/// }
///
/// #[async_trait]
/// impl Injectable for Car {
///     fn dependencies() -> Vec<Dependency> {
///         vec![Dependency::required(token_of::<Engine>())]
///     }
///
///     async fn construct(args: Args) -> Result<Self, BoxError> {
///         Ok(Car { engine: args.get::<Engine>(0)? })
///     }
/// }
/// ```
#[async_trait]
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Tokens to resolve and pass to [`construct`](Self::construct).
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    /// Builds the instance from its resolved dependencies.
    async fn construct(args: Args) -> Result<Self, BoxError>;
}

/// Option mutator applied to an `Injectable` registration.
///
/// Options are applied in order to one [`InjectableOptions`] value, so a later
/// option wins over an earlier one for the same flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectableOption {
    /// Cache one instance in the declaring repository
    Singleton,
    /// Create a new instance per resolution (clears `Singleton`)
    Transient,
    /// Compose with other providers of the token
    Multi,
    /// Do not also register the type under its own token
    NoSelf,
    /// Only apply inside scopes of this type
    RestrictScope(SymbolToken),
}

impl InjectableOption {
    fn apply(&self, options: &mut InjectableOptions) {
        match self {
            InjectableOption::Singleton => options.provider.singleton = true,
            InjectableOption::Transient => options.provider.singleton = false,
            InjectableOption::Multi => options.provider.multi = true,
            InjectableOption::NoSelf => options.no_self = true,
            InjectableOption::RestrictScope(scope) => {
                options.provider.restrict_scope = Some(scope.clone())
            }
        }
    }
}

/// Accumulated `Injectable` options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectableOptions {
    /// Flags for the generated provider(s)
    pub provider: ProviderOptions,
    /// Skip the implicit self registration
    pub no_self: bool,
}

impl InjectableOptions {
    /// Folds `options` in order.
    pub fn from_options<I>(options: I) -> Self
    where
        I: IntoIterator<Item = InjectableOption>,
    {
        let mut out = Self::default();
        for option in options {
            option.apply(&mut out);
        }
        out
    }
}

/// An `Injectable` registration: a constructible type, the token it
/// provides and its options.
///
/// Turned into providers when registered with a repository:
///
/// - without a token, one class provider under the type's own token;
/// - with a token, a provider under that token, plus (unless
///   [`InjectableOption::NoSelf`]) the type under its own token, the token
///   resolving through it so both share singletons.
///
/// ```rust
/// use dandi::{InjectableDef, InjectableOption, Injectable, Args, BoxError, SymbolToken};
/// use async_trait::async_trait;
///
/// struct Clock;
///
/// #[async_trait]
/// impl Injectable for Clock {
///     async fn construct(_args: Args) -> Result<Self, BoxError> {
///         Ok(Clock)
///     }
/// }
///
/// let time_source = SymbolToken::for_key("injectable-doc-time");
/// let def = InjectableDef::new::<Clock, _>(
///     Some(time_source.into()),
///     [InjectableOption::Singleton, InjectableOption::Multi],
/// );
/// assert!(def.options().provider.singleton);
/// assert!(def.options().provider.multi);
/// ```
#[derive(Clone)]
pub struct InjectableDef {
    type_name: &'static str,
    type_token: InjectionToken,
    token: Option<InjectionToken>,
    options: InjectableOptions,
    class: fn(InjectionToken) -> ProviderBuilder,
}

fn class_provider<T: Injectable>(token: InjectionToken) -> ProviderBuilder {
    Provider::class_for::<T>(token)
}

impl InjectableDef {
    /// `T` under its own token with default options.
    pub fn of<T: Injectable>() -> Self {
        Self::new::<T, _>(None, std::iter::empty())
    }

    /// `T` with an optional explicit token and options.
    pub fn new<T, I>(token: Option<InjectionToken>, options: I) -> Self
    where
        T: Injectable,
        I: IntoIterator<Item = InjectableOption>,
    {
        Self {
            type_name: type_name::<T>(),
            type_token: InjectionToken::of::<T>(),
            token,
            options: InjectableOptions::from_options(options),
            class: class_provider::<T>,
        }
    }

    /// Like [`new`](Self::new) with a dynamically typed token.
    ///
    /// Fails with [`DiError::InjectionTokenType`](crate::DiError::InjectionTokenType)
    /// when `token` is not a token.
    pub fn try_new<T, I>(token: &dyn Any, options: I) -> DiResult<Self>
    where
        T: Injectable,
        I: IntoIterator<Item = InjectableOption>,
    {
        let token = InjectionToken::from_any(token)?;
        Ok(Self::new::<T, _>(Some(token), options))
    }

    /// The type's own token.
    pub fn type_token(&self) -> &InjectionToken {
        &self.type_token
    }

    /// Explicit token, if any.
    pub fn token(&self) -> Option<&InjectionToken> {
        self.token.as_ref()
    }

    /// Folded options.
    pub fn options(&self) -> &InjectableOptions {
        &self.options
    }

    /// Implementing type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Providers this registration expands to, in registration order.
    pub fn providers(&self) -> Vec<Provider> {
        let flags = &self.options.provider;
        let token = match &self.token {
            None => return vec![(self.class)(self.type_token.clone()).options(flags.clone()).build()],
            Some(token) => token.clone(),
        };
        if self.options.no_self {
            return vec![(self.class)(token).options(flags.clone()).build()];
        }

        let own = ProviderOptions {
            singleton: flags.singleton,
            multi: false,
            restrict_scope: flags.restrict_scope.clone(),
        };
        let alias = ProviderOptions {
            singleton: false,
            multi: flags.multi,
            restrict_scope: flags.restrict_scope.clone(),
        };
        vec![
            (self.class)(self.type_token.clone()).options(own).build(),
            Provider::existing(token, self.type_token.clone())
                .options(alias)
                .build(),
        ]
    }
}

impl fmt::Debug for InjectableDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectableDef")
            .field("type_name", &self.type_name)
            .field("token", &self.token)
            .field("options", &self.options)
            .finish()
    }
}
