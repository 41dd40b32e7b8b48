use dandi::{is_injection_token, token_of, InjectionToken, MappedToken, SymbolToken, TypeToken};
use proptest::prelude::*;
use std::collections::HashMap;

proptest! {
    #[test]
    fn for_key_returns_the_same_symbol(key in "[a-z][a-z0-9_.]{0,24}") {
        let key = format!("proptest-{}", key);
        let a = SymbolToken::for_key(key.clone());
        let b = SymbolToken::for_key(key.clone());
        prop_assert_eq!(&a, &b);
        prop_assert!(a.is_interned());
        prop_assert_eq!(a.description(), key.as_str());
    }

    #[test]
    fn new_symbols_are_always_distinct(description in ".{0,32}") {
        let a = SymbolToken::new(description.clone());
        let b = SymbolToken::new(description.clone());
        prop_assert_ne!(&a, &b);
        prop_assert_eq!(a.description(), b.description());
        prop_assert!(!a.is_interned());
    }

    #[test]
    fn local_and_for_local_namespaces(package in "[a-z]{1,8}", key in "[a-z]{1,8}") {
        let package = format!("pt-{}", package);
        let cached = SymbolToken::for_local(&package, &key);
        prop_assert_eq!(&cached, &SymbolToken::for_local(&package, &key));
        prop_assert_ne!(&SymbolToken::local(&package, &key), &SymbolToken::local(&package, &key));
        prop_assert_ne!(&SymbolToken::local(&package, &key), &cached);
        let expected = format!("{}#{}", package, key);
        prop_assert_eq!(cached.description(), expected.as_str());
    }

    #[test]
    fn mapped_tokens_compare_by_parts(key in "[a-z]{1,12}", other in "[A-Z]{1,12}") {
        let base = SymbolToken::new("Cache");
        let mapped = InjectionToken::from(MappedToken::new(base.clone(), key.clone()));
        prop_assert_eq!(&mapped, &InjectionToken::from(MappedToken::new(base.clone(), key.clone())));
        prop_assert_ne!(&mapped, &InjectionToken::from(MappedToken::new(base.clone(), other)));
        prop_assert_ne!(&mapped, &InjectionToken::from(MappedToken::new(SymbolToken::new("Cache"), key)));
        prop_assert_ne!(&mapped, &InjectionToken::from(base));
    }
}

#[test]
fn test_token_kinds_never_collide() {
    struct Engine;
    let symbol = SymbolToken::new("Engine");

    let mut map: HashMap<InjectionToken, &str> = HashMap::new();
    map.insert(token_of::<Engine>(), "type");
    map.insert(symbol.clone().into(), "symbol");
    map.insert(MappedToken::new(symbol.clone(), "v2").into(), "mapped");

    assert_eq!(map.len(), 3);
    assert_eq!(map[&token_of::<Engine>()], "type");
    assert_eq!(map[&InjectionToken::from(TypeToken::of::<Engine>())], "type");
    assert_eq!(map[&InjectionToken::from(&symbol)], "symbol");
}

#[test]
fn test_trait_object_tokens() {
    trait Repository: Send + Sync {}
    trait Cache: Send + Sync {}

    assert_eq!(token_of::<dyn Repository>(), token_of::<dyn Repository>());
    assert_ne!(token_of::<dyn Repository>(), token_of::<dyn Cache>());
    assert!(token_of::<dyn Repository>().display_name().contains("Repository"));
}

#[test]
fn test_injection_token_guard() {
    assert!(is_injection_token(&token_of::<String>()));
    assert!(is_injection_token(&TypeToken::of::<u8>()));
    assert!(is_injection_token(&SymbolToken::new("x")));
    assert!(is_injection_token(&MappedToken::new(SymbolToken::new("x"), "k")));

    assert!(!is_injection_token(&"x"));
    assert!(!is_injection_token(&String::from("x")));
    assert!(!is_injection_token(&0usize));
    assert!(!is_injection_token(&()));
}

#[test]
fn test_from_any_round_trips_every_kind() {
    let symbol = SymbolToken::new("Clock");
    let mapped = MappedToken::new(symbol.clone(), "utc");

    assert_eq!(InjectionToken::from_any(&symbol).unwrap(), symbol.clone().into());
    assert_eq!(InjectionToken::from_any(&mapped).unwrap(), mapped.into());
    assert_eq!(InjectionToken::from_any(&TypeToken::of::<u8>()).unwrap(), token_of::<u8>());
    assert_eq!(InjectionToken::from_any(&token_of::<u8>()).unwrap(), token_of::<u8>());

    let err = InjectionToken::from_any(&Option::<InjectionToken>::None).unwrap_err();
    assert!(err.to_string().contains("missing token"));
    let err = InjectionToken::from_any(&String::from("Clock")).unwrap_err();
    assert!(err.to_string().contains("\"Clock\""));
}

#[test]
fn test_display_forms() {
    assert_eq!(SymbolToken::new("Db").to_string(), "Symbol(Db)");
    let mapped = MappedToken::new(SymbolToken::new("Db"), "primary");
    assert_eq!(mapped.to_string(), "Symbol(Db)[primary]");
    assert_eq!(mapped.key(), "primary");
    assert_eq!(TypeToken::of::<u32>().type_name(), "u32");
    assert_eq!(token_of::<u32>().to_string(), "u32");
}
