#![no_main]

use dandi::{DiError, InjectionScope, Injector, Provider, SymbolToken};
use futures::executor::block_on;
use libfuzzer_sys::fuzz_target;

// Each input byte is one operation against a small fixed token set:
// the low bits pick the token, the high bits pick what happens.
fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let tokens: Vec<SymbolToken> = (0..4).map(|i| SymbolToken::new(format!("t{}", i))).collect();
    let request = SymbolToken::new("Request");
    let root = Injector::new();
    if root.start().is_err() {
        return;
    }
    let mut injectors = vec![root.clone()];

    block_on(async {
        for (step, byte) in data.iter().enumerate() {
            let token = tokens[(byte & 0b11) as usize].clone();
            let current = injectors[injectors.len() - 1].clone();
            match byte >> 2 {
                0..=15 => {
                    let _ = current.register("fuzz", [Provider::value(token, step)]);
                }
                16..=23 => {
                    let _ = current.register("fuzz", [Provider::value(token, step).multi()]);
                }
                24..=31 => {
                    let _ = current.register("fuzz", [Provider::value(token, step).restrict_scope(request.clone())]);
                }
                32..=39 => {
                    let scope = if byte & 1 == 0 {
                        InjectionScope::root()
                    } else {
                        InjectionScope::new(request.clone(), "fuzz request")
                    };
                    if let Ok(child) = current.create_child(scope, Vec::<Provider>::new()) {
                        injectors.push(child);
                    }
                }
                40..=47 => {
                    if injectors.len() > 1 {
                        if let Some(child) = injectors.pop() {
                            child.dispose("fuzz pop").await;
                            assert!(child.is_disposed());
                        }
                    }
                }
                _ => match current.resolve_optional(token).await {
                    Ok(result) => {
                        let values = result.values();
                        if result.is_multi() {
                            assert_eq!(values.len(), result.elements().len());
                        } else {
                            assert!(values.len() <= 1);
                        }
                        result.dispose("fuzz").await;
                    }
                    Err(DiError::ConflictingProviders { .. }) => {}
                    Err(other) => panic!("unexpected error: {}", other),
                },
            }
        }
    });

    block_on(root.dispose("fuzz done"));
});
