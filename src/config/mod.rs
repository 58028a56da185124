//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Connection strings wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;
pub mod uri;

use crate::error::{Error, Result};
use crate::queue::Fingerprint;
use secrecy::SecretString;
use std::collections::BTreeMap;

/// Connection name that resolves to `DATABASE_URL`.
pub const DEFAULT_CONNECTION: &str = "default";

const CONNECTION_PREFIX: &str = "DATABASE_URL_";

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    /// Extra named connections from `DATABASE_URL_<NAME>`, keyed by the
    /// lowercased name.
    pub connections: BTreeMap<String, SecretString>,
    pub schema: String,
    pub instance_id: Option<String>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of variables.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let connections = vars
            .iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(CONNECTION_PREFIX)?;
                (!name.is_empty())
                    .then(|| (name.to_lowercase(), SecretString::from(value.clone())))
            })
            .collect();

        Ok(Self {
            database_url: SecretString::from(required_var(&vars, "DATABASE_URL")?),
            connections,
            schema: vars
                .get("QUEUE_SCHEMA")
                .cloned()
                .unwrap_or_else(|| "public".to_string()),
            instance_id: vars.get("QUEUE_INSTANCE_ID").cloned(),
            otel_endpoint: vars.get("OTEL_ENDPOINT").cloned(),
            log_level: vars
                .get("LOG_LEVEL")
                .cloned()
                .unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Resolve a queue URI connection name to its database URL.
    pub fn connection_url(&self, name: &str) -> Result<&SecretString> {
        if name.eq_ignore_ascii_case(DEFAULT_CONNECTION) {
            return Ok(&self.database_url);
        }
        self.connections.get(&name.to_lowercase()).ok_or_else(|| {
            Error::Config(format!(
                "no connection named '{name}': set {CONNECTION_PREFIX}{}",
                name.to_uppercase()
            ))
        })
    }

    /// Claim fingerprint for this process: `QUEUE_INSTANCE_ID` when set,
    /// otherwise derived from the deployment.
    pub fn fingerprint(&self) -> Fingerprint {
        match &self.instance_id {
            Some(id) => Fingerprint::from_identity(id),
            None => Fingerprint::deployment(),
        }
    }
}

fn required_var(vars: &BTreeMap<String, String>, name: &str) -> Result<String> {
    vars.get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}
