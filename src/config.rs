//! Exporter Configuration
//!
//! Runtime settings plus the file-backed desired configuration source and
//! secret resolver used by the binary.

use crate::domain::ports::{
    ArrayCredentials, ArrayId, DesiredArray, DesiredConfig, DesiredConfigSource, PoolBinding,
    SecretResolver,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Exporter Settings
// =============================================================================

/// Settings shared by every array session
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Management REST port on the array
    pub rest_port: u16,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Arrays ship self-signed certificates
    pub accept_invalid_certs: bool,
    /// Continuous auth failure before an alert is raised
    pub auth_alert_threshold: chrono::Duration,
    /// Fetch per-volume capacity (one extra call per volume)
    pub collect_volumes: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            rest_port: 7443,
            request_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
            accept_invalid_certs: true,
            auth_alert_threshold: chrono::Duration::minutes(2),
            collect_volumes: false,
        }
    }
}

// =============================================================================
// Desired Configuration File
// =============================================================================

#[derive(Debug, Deserialize)]
struct PoolConfigFile {
    #[serde(default)]
    clusters: BTreeMap<String, ClusterEntry>,
}

#[derive(Debug, Deserialize)]
struct ClusterEntry {
    #[serde(default)]
    secret: String,
    #[serde(default)]
    storageclass_pool: BTreeMap<String, String>,
}

/// Reads the array/pool mapping from a JSON or YAML file on every load
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse file contents; `.json` files are read as JSON, anything else as YAML
    pub fn parse(&self, contents: &str) -> Result<DesiredConfig> {
        let file: PoolConfigFile = match self.path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(contents)?,
            _ => serde_yaml::from_str(contents)?,
        };

        Ok(file
            .clusters
            .into_iter()
            .map(|(name, entry)| {
                let id = ArrayId::from(name);
                let desired = DesiredArray {
                    id: id.clone(),
                    secret: entry.secret,
                    binding: PoolBinding::new(entry.storageclass_pool),
                };
                (id, desired)
            })
            .collect())
    }
}

#[async_trait]
impl DesiredConfigSource for FileConfigSource {
    async fn load(&self) -> Result<DesiredConfig> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Configuration(format!(
                "Cannot read pool config {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let config = self.parse(&contents)?;
        debug!(path = %self.path.display(), arrays = config.len(), "Loaded desired configuration");
        Ok(config)
    }
}

// =============================================================================
// Secret Files
// =============================================================================

const ADDRESS_FILE: &str = "management_address";
const USERNAME_FILE: &str = "username";
const PASSWORD_FILE: &str = "password";

/// Resolves `<dir>/<secret>/{management_address,username,password}`
#[derive(Debug, Clone)]
pub struct FileSecretResolver {
    dir: PathBuf,
}

impl FileSecretResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read_field(&self, secret: &str, file: &str) -> Result<String> {
        let path = self.dir.join(secret).join(file);
        let value = std::fs::read_to_string(&path).map_err(|e| Error::SecretInvalid {
            secret: secret.to_string(),
            reason: format!("{}: {}", file, e),
        })?;
        let value = value.trim().to_string();
        if value.is_empty() {
            return Err(Error::SecretInvalid {
                secret: secret.to_string(),
                reason: format!("{} is empty", file),
            });
        }
        Ok(value)
    }
}

impl SecretResolver for FileSecretResolver {
    fn resolve(&self, secret: &str) -> Result<ArrayCredentials> {
        if secret.is_empty() || secret.contains('/') || secret.contains("..") {
            return Err(Error::SecretInvalid {
                secret: secret.to_string(),
                reason: "invalid secret name".into(),
            });
        }

        let address = self.read_field(secret, ADDRESS_FILE)?;
        Ok(ArrayCredentials {
            host: normalize_host(&address),
            username: self.read_field(secret, USERNAME_FILE)?,
            password: self.read_field(secret, PASSWORD_FILE)?,
        })
    }
}

/// Strip any scheme and trailing slash from a management address
fn normalize_host(address: &str) -> String {
    let host = address
        .strip_prefix("https://")
        .or_else(|| address.strip_prefix("http://"))
        .unwrap_or(address);
    host.trim_end_matches('/').to_string()
}
