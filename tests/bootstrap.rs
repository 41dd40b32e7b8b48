use async_trait::async_trait;
use dandi::{
    clear_registered_injectables, register_injectable, registered_injectables, token_of, try_register_injectable,
    AmbientScanner, Args, BootstrapConfig, BoxError, Bootstrapper, DiError, DiResult, EntryPoint, Injectable,
    InjectableOption, Logger, Provider, Registerable, Scanner, StaticScanner, SymbolToken,
};
use parking_lot::Mutex;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct CaptureLogger {
    lines: Mutex<Vec<(&'static str, String)>>,
}

impl CaptureLogger {
    fn contains(&self, level: &str, needle: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}

impl Logger for CaptureLogger {
    fn debug(&self, message: &str) {
        self.lines.lock().push(("debug", message.to_string()));
    }
    fn info(&self, message: &str) {
        self.lines.lock().push(("info", message.to_string()));
    }
    fn warn(&self, message: &str) {
        self.lines.lock().push(("warn", message.to_string()));
    }
    fn error(&self, message: &str) {
        self.lines.lock().push(("error", message.to_string()));
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("dandi=debug"))
        .with_test_writer()
        .try_init();
}

struct App {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl EntryPoint for App {
    async fn run(&self) -> Result<(), BoxError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_init_registers_default_logger_and_starts() {
    init_tracing();
    let injector = Bootstrapper::new().init().await.unwrap();
    assert!(injector.is_started());
    assert!(injector.can_resolve(<dyn Logger>::token()));
}

#[tokio::test]
async fn test_run_resolves_and_runs_entry_point() {
    let runs = Arc::new(AtomicUsize::new(0));
    let logger = Arc::new(CaptureLogger::default());

    Bootstrapper::new()
        .logger(logger.clone())
        .provider(Provider::value(token_of::<Arc<AtomicUsize>>(), runs.clone()))
        .provider(Provider::factory_dyn(
            <dyn EntryPoint>::token(),
            [token_of::<Arc<AtomicUsize>>()],
            |args: Args| async move {
                let runs = args.get::<Arc<AtomicUsize>>(0)?;
                Ok::<Arc<dyn EntryPoint>, DiError>(Arc::new(App { runs: Arc::clone(&runs) }))
            },
        ))
        .run()
        .await
        .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(logger.contains("debug", "Startup completed in"));
    assert!(logger.contains("debug", "EntryPoint finished in"));
}

#[tokio::test]
async fn test_run_without_entry_point() {
    let logger = Arc::new(CaptureLogger::default());
    Bootstrapper::new().logger(logger.clone()).run().await.unwrap();
    assert!(logger.contains("debug", "No EntryPoint registered, nothing to run"));

    let err = Bootstrapper::new()
        .with_config(BootstrapConfig {
            require_entry_point: true,
            ..BootstrapConfig::default()
        })
        .run()
        .await
        .unwrap_err();
    assert!(err.is_missing_provider());
}

#[tokio::test]
async fn test_failing_entry_point_is_reported() {
    struct Broken;
    #[async_trait]
    impl EntryPoint for Broken {
        async fn run(&self) -> Result<(), BoxError> {
            Err("port already in use".into())
        }
    }

    let logger = Arc::new(CaptureLogger::default());
    let err = Bootstrapper::new()
        .with_config(BootstrapConfig {
            log_startup_timing: false,
            ..BootstrapConfig::default()
        })
        .logger(logger.clone())
        .provider(Provider::value_dyn(<dyn EntryPoint>::token(), Arc::new(Broken) as Arc<dyn EntryPoint>))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(&err, DiError::Invocation { method, .. } if method == "EntryPoint::run"));
    assert!(logger.contains("error", "Inner error: port already in use"));
    assert!(!logger.contains("debug", "Startup completed"));
}

#[tokio::test]
async fn test_explicit_providers_override_scanned_ones() {
    let mode = SymbolToken::new("Mode");
    let injector = Bootstrapper::new()
        .scanner(StaticScanner::new([Provider::value(mode.clone(), "scanned")]))
        .provider(Provider::value(mode.clone(), "explicit"))
        .init()
        .await
        .unwrap();

    assert_eq!(*injector.inject::<&str>(mode).await.unwrap(), "explicit");
    let sources: Vec<String> = injector
        .repository()
        .sources()
        .iter()
        .map(|s| s.name().to_string())
        .collect();
    assert!(sources.contains(&"scanner #0".to_string()));
    assert!(sources.contains(&"bootstrap".to_string()));
}

#[tokio::test]
async fn test_scanner_failure_aborts_startup() {
    struct Failing;
    #[async_trait]
    impl Scanner for Failing {
        async fn scan(&self) -> DiResult<Vec<Registerable>> {
            Err(DiError::Config("scan root unreadable".into()))
        }
    }

    let bootstrapper = Bootstrapper::new().scanner(Failing);
    let injector = bootstrapper.injector().clone();
    assert!(matches!(bootstrapper.init().await, Err(DiError::Config(_))));
    assert!(!injector.is_started());
}

struct Clock;

#[async_trait]
impl Injectable for Clock {
    async fn construct(_args: Args) -> Result<Self, BoxError> {
        Ok(Clock)
    }
}

#[tokio::test]
#[serial]
async fn test_ambient_scanner_registers_logged_injectables() {
    clear_registered_injectables();
    let clock = SymbolToken::new("Clock");
    register_injectable::<Clock, _>(Some(clock.clone().into()), [InjectableOption::Singleton]);
    assert_eq!(registered_injectables().len(), 1);

    let injector = Bootstrapper::new().scanner(AmbientScanner).init().await.unwrap();
    let by_token = injector.inject::<Clock>(clock).await.unwrap();
    let by_type = injector.get::<Clock>().await.unwrap();
    assert!(Arc::ptr_eq(&by_token, &by_type));

    clear_registered_injectables();
    assert!(registered_injectables().is_empty());
}

#[tokio::test]
#[serial]
async fn test_ambient_registration_rejects_non_tokens() {
    clear_registered_injectables();
    let err = try_register_injectable::<Clock, _>(&"Clock", [InjectableOption::Singleton]).unwrap_err();
    assert!(matches!(err, DiError::InjectionTokenType(_)));
    assert!(registered_injectables().is_empty());

    try_register_injectable::<Clock, _>(&SymbolToken::new("Clock"), Vec::<InjectableOption>::new()).unwrap();
    assert_eq!(registered_injectables().len(), 1);
    clear_registered_injectables();
}

#[test]
#[serial]
fn test_bootstrap_config_from_env() {
    std::env::remove_var("DANDI_LOG_STARTUP_TIMING");
    std::env::remove_var("DANDI_REQUIRE_ENTRY_POINT");
    assert_eq!(BootstrapConfig::from_env().unwrap(), BootstrapConfig::default());

    std::env::set_var("DANDI_REQUIRE_ENTRY_POINT", "true");
    std::env::set_var("DANDI_LOG_STARTUP_TIMING", "false");
    let config = BootstrapConfig::from_env().unwrap();
    assert!(config.require_entry_point);
    assert!(!config.log_startup_timing);

    std::env::set_var("DANDI_REQUIRE_ENTRY_POINT", "sometimes");
    assert!(matches!(BootstrapConfig::from_env(), Err(DiError::Config(_))));

    std::env::remove_var("DANDI_LOG_STARTUP_TIMING");
    std::env::remove_var("DANDI_REQUIRE_ENTRY_POINT");
}
