use dandi::{
    report, Dependency, DiError, InjectableDef, InjectionScope, Injector, Provider, Registerable, SymbolToken,
};
use std::error::Error as _;

fn started() -> Injector {
    let injector = Injector::new();
    injector.start().unwrap();
    injector
}

#[tokio::test]
async fn test_missing_provider_chain_names_scopes() {
    let repo = SymbolToken::new("UserRepository");
    let db = SymbolToken::new("Database");
    let request = SymbolToken::new("Request");

    let root = started();
    root.register("app", [Provider::factory_sync(repo.clone(), [Dependency::required(db)], |_| {
        Ok::<_, DiError>(())
    })])
    .unwrap();
    let scoped = root
        .create_child(InjectionScope::new(request, "GET /users"), Vec::<Provider>::new())
        .unwrap();

    let err = scoped.resolve(repo).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "No provider for Symbol(Database)\n  while resolving Symbol(UserRepository) (scope: GET /users)"
    );
}

#[tokio::test]
async fn test_missing_provider_at_top_has_no_chain() {
    let err = started().resolve(SymbolToken::new("Nothing")).await.unwrap_err();
    match err {
        DiError::MissingProvider { token, chain } => {
            assert_eq!(token, "Symbol(Nothing)");
            assert!(chain.is_empty());
        }
        other => panic!("expected missing provider, got {other}"),
    }
}

#[tokio::test]
async fn test_dependency_failures_propagate_unwrapped() {
    let broken = SymbolToken::new("Broken");
    let service = SymbolToken::new("Service");
    let injector = started();
    injector
        .register("app", [
            Provider::factory_sync(broken.clone(), Vec::<Dependency>::new(), |_| {
                Err::<u8, _>(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"))
            }),
            Provider::factory_sync(service.clone(), [Dependency::required(broken)], |_| Ok::<_, DiError>(1u8)),
        ])
        .unwrap();

    let err = injector.resolve(service).await.unwrap_err();
    match &err {
        DiError::Factory { token, .. } => assert_eq!(token, "Symbol(Broken)"),
        other => panic!("expected factory error, got {other}"),
    }
    let source = err.source().unwrap();
    assert!(source.downcast_ref::<std::io::Error>().is_some());
    assert_eq!(err.report(), "Factory for Symbol(Broken) failed\n  Inner error: refused");
}

#[tokio::test]
async fn test_optional_dependency_suppresses_only_missing() {
    let cache = SymbolToken::new("Cache");
    let service = SymbolToken::new("Service");
    let injector = started();
    injector
        .register("app", [Provider::factory_sync(service.clone(), [Dependency::optional(cache)], |args| {
            Ok::<_, DiError>(args.optional::<u8>(0)?.is_none())
        })])
        .unwrap();

    assert!(*injector.inject::<bool>(service).await.unwrap());
}

#[test]
fn test_unknown_registrations_are_rejected() {
    let err = Registerable::from_any(Box::new(42u32)).unwrap_err();
    assert!(matches!(err, DiError::ProviderType(_)));

    let provider = Provider::value(SymbolToken::new("ok"), 1u8);
    assert!(matches!(
        Registerable::from_any(Box::new(provider)),
        Ok(Registerable::Provider(_))
    ));
    assert!(matches!(
        Registerable::from_any(Box::new(InjectableDef::of::<NoopService>())),
        Ok(Registerable::Injectable(_))
    ));
}

struct NoopService;

#[async_trait::async_trait]
impl dandi::Injectable for NoopService {
    async fn construct(_args: dandi::Args) -> Result<Self, dandi::BoxError> {
        Ok(NoopService)
    }
}

#[test]
fn test_report_free_function_accepts_any_error() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "config.json");
    let wrapped = DiError::Factory {
        token: "Settings".into(),
        source: Box::new(io),
    };
    let rendered = report(&wrapped);
    assert_eq!(rendered, wrapped.report());
    assert!(rendered.ends_with("Inner error: config.json"));
}
