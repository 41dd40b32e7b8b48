//! Configuration clients and bootstrap settings.
//!
//! A [`ConfigClient`] is registered like any other provider, under
//! `<dyn ConfigClient>::token()`. Values are strings at the source; typed
//! reads parse them as JSON and fall back to the plain string.

use std::env;

use ahash::AHashMap;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{DiError, DiResult};
use crate::token::InjectionToken;

/// Source of configuration values.
#[async_trait]
pub trait ConfigClient: Send + Sync {
    /// Raw value for `key`, `None` when unset.
    async fn get(&self, key: &str) -> DiResult<Option<String>>;
}

impl<'a> dyn ConfigClient + 'a {
    /// Token config clients are registered under.
    pub fn token() -> InjectionToken {
        InjectionToken::of::<dyn ConfigClient>()
    }

    /// Typed value for `key`.
    ///
    /// ```rust
    /// use dandi::config::{ConfigClient, MemoryConfigClient};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> dandi::DiResult<()> {
    /// let client: Box<dyn ConfigClient> = Box::new(
    ///     MemoryConfigClient::new([("port", "8080"), ("name", "api"), ("tags", "[\"a\",\"b\"]")]),
    /// );
    /// assert_eq!(client.get_value::<u16>("port").await?, Some(8080));
    /// assert_eq!(client.get_value::<String>("name").await?, Some("api".to_string()));
    /// assert_eq!(client.get_value::<Vec<String>>("tags").await?.map(|t| t.len()), Some(2));
    /// assert!(client.get_value::<u16>("name").await.is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_value<T: DeserializeOwned>(&self, key: &str) -> DiResult<Option<T>> {
        match self.get(key).await? {
            None => Ok(None),
            Some(raw) => parse_value(key, raw).map(Some),
        }
    }

    /// Typed value for `key`, failing with [`DiError::Config`] when unset.
    pub async fn get_required<T: DeserializeOwned>(&self, key: &str) -> DiResult<T> {
        self.get_value(key)
            .await?
            .ok_or_else(|| DiError::Config(format!("missing configuration key {}", key)))
    }
}

fn parse_value<T: DeserializeOwned>(key: &str, raw: String) -> DiResult<T> {
    match serde_json::from_str::<T>(&raw) {
        Ok(value) => Ok(value),
        Err(json_err) => serde_json::from_value::<T>(serde_json::Value::String(raw))
            .map_err(|_| DiError::Config(format!("invalid value for {}: {}", key, json_err))),
    }
}

/// Reads values from environment variables.
///
/// Keys are upper-cased with `.` and `-` mapped to `_`, then prefixed:
/// with prefix `app`, key `db.url` reads `APP_DB_URL`.
#[derive(Debug, Clone, Default)]
pub struct EnvConfigClient {
    prefix: Option<String>,
}

impl EnvConfigClient {
    /// Reads unprefixed variables.
    pub fn new() -> Self {
        Self { prefix: None }
    }

    /// Reads variables under `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// Environment variable name for `key`.
    pub fn variable(&self, key: &str) -> String {
        let key = key.replace(['.', '-'], "_").to_uppercase();
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix.to_uppercase(), key),
            None => key,
        }
    }

    /// Synchronous read, for settings needed before any runtime exists.
    pub fn read(&self, key: &str) -> Option<String> {
        env::var(self.variable(key)).ok()
    }
}

#[async_trait]
impl ConfigClient for EnvConfigClient {
    async fn get(&self, key: &str) -> DiResult<Option<String>> {
        Ok(self.read(key))
    }
}

/// Fixed in-memory values, for tests and defaults.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigClient {
    values: AHashMap<String, String>,
}

impl MemoryConfigClient {
    /// Creates a client from key/value pairs.
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Sets one value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

#[async_trait]
impl ConfigClient for MemoryConfigClient {
    async fn get(&self, key: &str) -> DiResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }
}

/// Settings read by the [`Bootstrapper`](crate::Bootstrapper).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Log how long startup took
    pub log_startup_timing: bool,
    /// Fail when no entry point is registered
    pub require_entry_point: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            log_startup_timing: true,
            require_entry_point: false,
        }
    }
}

impl BootstrapConfig {
    /// Prefix of the bootstrap environment variables.
    pub const ENV_PREFIX: &'static str = "DANDI";

    /// Reads `DANDI_LOG_STARTUP_TIMING` and `DANDI_REQUIRE_ENTRY_POINT`,
    /// keeping defaults for unset variables.
    pub fn from_env() -> DiResult<Self> {
        let env = EnvConfigClient::with_prefix(Self::ENV_PREFIX);
        let mut config = Self::default();
        if let Some(raw) = env.read("log_startup_timing") {
            config.log_startup_timing = parse_value("log_startup_timing", raw)?;
        }
        if let Some(raw) = env.read("require_entry_point") {
            config.require_entry_point = parse_value("require_entry_point", raw)?;
        }
        Ok(config)
    }

    /// Reads both settings from `client`, keeping defaults for unset keys.
    pub async fn from_client(client: &dyn ConfigClient) -> DiResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            log_startup_timing: client
                .get_value("log_startup_timing")
                .await?
                .unwrap_or(defaults.log_startup_timing),
            require_entry_point: client
                .get_value("require_entry_point")
                .await?
                .unwrap_or(defaults.require_entry_point),
        })
    }
}
