use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::checkpoint::CheckpointBackend;
use crate::constants::{DEFAULT_IMS_HOST, DEFAULT_METASCOPE, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::error::{ConnectorError, Result};
use crate::types::Credential;

pub const DEFAULT_CONFIG_PATH: &str = "connector.toml";

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connector: ConnectorSettings,
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectorSettings {
    pub checkpoint_dir: PathBuf,
    pub checkpoint_backend: CheckpointBackend,
    pub ims_host: String,
    pub metascope: String,
    pub request_timeout_secs: u64,
    /// NDJSON file receiving delivered events; standard output when unset.
    pub output: Option<PathBuf>,
    pub metrics_port: Option<u16>,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("checkpoints"),
            checkpoint_backend: CheckpointBackend::default(),
            ims_host: DEFAULT_IMS_HOST.to_string(),
            metascope: DEFAULT_METASCOPE.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            output: None,
            metrics_port: None,
        }
    }
}

impl ConnectorSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// One journal to stream. Secret fields accept `env:VAR` to read the value
/// from the environment.
#[derive(Deserialize)]
pub struct InputConfig {
    pub name: String,
    pub endpoint: String,
    pub api_key: String,
    pub technical_account_id: String,
    pub org_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
}

impl fmt::Debug for InputConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputConfig")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl InputConfig {
    /// Resolves secrets and builds a validated credential.
    pub fn credential(&self) -> Result<Credential> {
        let private_key = match (&self.private_key, &self.private_key_path) {
            (Some(inline), _) => resolve_secret(inline)?,
            (None, Some(path)) => fs::read_to_string(path).map_err(|e| {
                ConnectorError::Config(format!(
                    "input '{}': failed to read private key '{}': {}",
                    self.name,
                    path.display(),
                    e
                ))
            })?,
            (None, None) => {
                return Err(ConnectorError::Config(format!(
                    "input '{}': one of private_key or private_key_path is required",
                    self.name
                )))
            }
        };

        let credential = Credential {
            api_key: resolve_secret(&self.api_key)?,
            technical_account_id: self.technical_account_id.clone(),
            org_id: self.org_id.clone(),
            client_secret: resolve_secret(&self.client_secret)?,
            private_key,
            endpoint: self.endpoint.clone(),
        };
        credential
            .validate()
            .map_err(|e| ConnectorError::Config(format!("input '{}': {}", self.name, e)))?;
        Ok(credential)
    }
}

/// `env:NAME` reads `NAME` from the environment; anything else is literal.
pub fn resolve_secret(value: &str) -> Result<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var.trim()).map_err(|e| {
            ConnectorError::Config(format!("environment variable '{}': {}", var.trim(), e))
        }),
        None => Ok(value.to_string()),
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConnectorError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.connector.request_timeout_secs == 0 {
            return Err(ConnectorError::Config("request_timeout_secs must be positive".into()));
        }
        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        for input in &self.inputs {
            if !names.insert(input.name.as_str()) {
                return Err(ConnectorError::Config(format!("duplicate input name '{}'", input.name)));
            }
            // Two engines over one credential would race on the same checkpoint.
            // An unresolvable `env:` key is reported when the input is built.
            let key = resolve_secret(&input.api_key).unwrap_or_else(|_| input.api_key.clone());
            if !keys.insert(key) {
                return Err(ConnectorError::Config(format!(
                    "input '{}' reuses an api_key already configured for another input",
                    input.name
                )));
            }
        }
        Ok(())
    }

    /// All inputs, or just the one called `name`.
    pub fn select_inputs(&self, name: Option<&str>) -> Result<Vec<&InputConfig>> {
        match name {
            None => Ok(self.inputs.iter().collect()),
            Some(n) => self
                .inputs
                .iter()
                .find(|i| i.name == n)
                .map(|i| vec![i])
                .ok_or_else(|| ConnectorError::Config(format!("no input named '{}'", n))),
        }
    }
}
