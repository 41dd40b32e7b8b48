//! Process-wide registration log for ambient `Injectable` types.
//!
//! The log is append-only and filled by an explicit initialisation pass the
//! host application calls, typically once at the top of `main`. The
//! [`AmbientScanner`] hands its contents to the bootstrapper.

use std::any::Any;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::bootstrap::Scanner;
use crate::error::DiResult;
use crate::injectable::{Injectable, InjectableDef, InjectableOption};
use crate::repository::Registerable;
use crate::token::InjectionToken;

static REGISTERED: Lazy<Mutex<Vec<InjectableDef>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Appends definitions to the log.
pub fn register_injectables<I>(defs: I)
where
    I: IntoIterator<Item = InjectableDef>,
{
    let mut log = REGISTERED.lock();
    for def in defs {
        tracing::trace!(injectable = def.type_name(), "registered ambient injectable");
        log.push(def);
    }
}

/// Appends `T` with an optional token and options.
pub fn register_injectable<T, I>(token: Option<InjectionToken>, options: I)
where
    T: Injectable,
    I: IntoIterator<Item = InjectableOption>,
{
    register_injectables([InjectableDef::new::<T, _>(token, options)]);
}

/// Appends `T` under a dynamically typed token, rejecting non-tokens with
/// [`DiError::InjectionTokenType`](crate::DiError::InjectionTokenType).
pub fn try_register_injectable<T, I>(token: &dyn Any, options: I) -> DiResult<()>
where
    T: Injectable,
    I: IntoIterator<Item = InjectableOption>,
{
    let def = InjectableDef::try_new::<T, _>(token, options)?;
    register_injectables([def]);
    Ok(())
}

/// Snapshot of the log in registration order.
pub fn registered_injectables() -> Vec<InjectableDef> {
    REGISTERED.lock().clone()
}

/// Empties the log. Meant for test isolation.
pub fn clear_registered_injectables() {
    REGISTERED.lock().clear();
}

/// Scanner yielding everything in the process-wide log.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmbientScanner;

#[async_trait]
impl Scanner for AmbientScanner {
    async fn scan(&self) -> DiResult<Vec<Registerable>> {
        Ok(registered_injectables()
            .into_iter()
            .map(Registerable::Injectable)
            .collect())
    }
}
