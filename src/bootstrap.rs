//! Application startup: scan, register, start, run the entry point.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::config::BootstrapConfig;
use crate::error::{BoxError, DiError, DiResult};
use crate::injector::Injector;
use crate::logger::{Logger, TracingLogger};
use crate::repository::{Registerable, RegistrationSource};
use crate::token::InjectionToken;

/// Source of registrations pulled in once, before the injector starts.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Everything to register.
    async fn scan(&self) -> DiResult<Vec<Registerable>>;
}

/// Scanner over a fixed list of registrations.
#[derive(Debug, Clone, Default)]
pub struct StaticScanner {
    items: Vec<Registerable>,
}

impl StaticScanner {
    /// Creates a scanner yielding `items`.
    pub fn new<I, R>(items: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Registerable>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Scanner for StaticScanner {
    async fn scan(&self) -> DiResult<Vec<Registerable>> {
        Ok(self.items.clone())
    }
}

/// The application itself, resolved and run after startup.
#[async_trait]
pub trait EntryPoint: Send + Sync {
    /// Runs the application.
    async fn run(&self) -> Result<(), BoxError>;
}

impl dyn EntryPoint {
    /// Token the entry point is registered under.
    pub fn token() -> InjectionToken {
        InjectionToken::of::<dyn EntryPoint>()
    }
}

/// Drives startup.
///
/// [`init`](Self::init) runs every scanner, registers the explicit providers,
/// falls back to [`TracingLogger`] when no logger is registered and starts the
/// injector. [`run`](Self::run) then resolves the optional [`EntryPoint`] and
/// runs it. Any error aborts startup.
///
/// # Examples
///
/// ```rust
/// use dandi::{Bootstrapper, EntryPoint, BoxError, Provider};
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct App;
///
/// #[async_trait]
/// impl EntryPoint for App {
///     async fn run(&self) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> dandi::DiResult<()> {
/// let app: Arc<dyn EntryPoint> = Arc::new(App);
/// Bootstrapper::new()
///     .provider(Provider::value_dyn(<dyn EntryPoint>::token(), app))
///     .run()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Bootstrapper {
    injector: Injector,
    config: BootstrapConfig,
    scanners: Vec<Box<dyn Scanner>>,
    providers: Vec<Registerable>,
}

impl Bootstrapper {
    /// Bootstrapper over a fresh root injector with default settings.
    pub fn new() -> Self {
        Self::with_injector(Injector::new())
    }

    /// Bootstrapper over an existing, not yet started, root injector.
    pub fn with_injector(injector: Injector) -> Self {
        Self {
            injector,
            config: BootstrapConfig::default(),
            scanners: Vec::new(),
            providers: Vec::new(),
        }
    }

    /// Bootstrapper configured from `DANDI_*` environment variables.
    pub fn from_env() -> DiResult<Self> {
        Ok(Self::new().with_config(BootstrapConfig::from_env()?))
    }

    /// Replaces the settings.
    pub fn with_config(mut self, config: BootstrapConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a scanner; scanners run in the order added.
    pub fn scanner(mut self, scanner: impl Scanner + 'static) -> Self {
        self.scanners.push(Box::new(scanner));
        self
    }

    /// Adds an explicit registration, applied after every scanner.
    pub fn provider(mut self, item: impl Into<Registerable>) -> Self {
        self.providers.push(item.into());
        self
    }

    /// Adds several explicit registrations.
    pub fn providers<I, R>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Registerable>,
    {
        self.providers.extend(items.into_iter().map(Into::into));
        self
    }

    /// Uses `logger` instead of the tracing default.
    pub fn logger(self, logger: Arc<dyn Logger>) -> Self {
        self.provider(<dyn Logger>::provider(logger))
    }

    /// The injector being bootstrapped.
    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    /// Scans, registers and starts, returning the started injector.
    pub async fn init(self) -> DiResult<Injector> {
        let started = Instant::now();
        let injector = self.injector;

        for (index, scanner) in self.scanners.iter().enumerate() {
            let items = scanner.scan().await?;
            tracing::debug!(scanner = index, registrations = items.len(), "scanned");
            injector.register(RegistrationSource::new(format!("scanner #{}", index)), items)?;
        }
        injector.register("bootstrap", self.providers)?;
        if !injector.repository().has(&<dyn Logger>::token()) {
            injector.register("bootstrap", [<dyn Logger>::provider(Arc::new(TracingLogger))])?;
        }
        injector.start()?;

        if self.config.log_startup_timing {
            let logger = injector.inject_dyn::<dyn Logger>(<dyn Logger>::token()).await?;
            logger.debug(&format!("Startup completed in {:?}", started.elapsed()));
        }
        Ok(injector)
    }

    /// [`init`](Self::init), then runs the entry point if one is registered.
    ///
    /// Without an entry point this logs and returns, or fails with
    /// [`DiError::MissingProvider`] when the settings require one. A failing
    /// entry point surfaces as [`DiError::Invocation`].
    pub async fn run(self) -> DiResult<()> {
        let require_entry_point = self.config.require_entry_point;
        let injector = self.init().await?;
        let logger = injector.inject_dyn::<dyn Logger>(<dyn Logger>::token()).await?;

        let entry = injector
            .resolve_optional(<dyn EntryPoint>::token())
            .await?
            .injected()
            .single_dyn::<dyn EntryPoint>()?;
        let entry = match entry {
            Some(entry) => entry,
            None if require_entry_point => {
                return Err(DiError::MissingProvider {
                    token: <dyn EntryPoint>::token().to_string(),
                    chain: String::new(),
                })
            }
            None => {
                logger.debug("No EntryPoint registered, nothing to run");
                return Ok(());
            }
        };

        let started = Instant::now();
        let outcome = entry.run().await.map_err(|source| DiError::Invocation {
            method: "EntryPoint::run".to_string(),
            source,
        });
        match &outcome {
            Ok(()) => logger.debug(&format!("EntryPoint finished in {:?}", started.elapsed())),
            Err(err) => logger.error(&err.report()),
        }
        outcome
    }
}

impl Default for Bootstrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("config", &self.config)
            .field("scanners", &self.scanners.len())
            .field("providers", &self.providers.len())
            .finish()
    }
}
