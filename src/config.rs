//! Run configuration.
//!
//! Settings come from an optional `dumpsync.yaml`, the environment (a `.env`
//! file is loaded by the binary) and command-line flags. For the store
//! endpoint the precedence is: flag, then environment, then the YAML file,
//! then the web app's config script.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::store::StoreConfig;

pub const ENV_STORE_URL: &str = "DUMPSYNC_STORE_URL";
pub const ENV_API_KEY: &str = "DUMPSYNC_API_KEY";
pub const ENV_INSECURE_TLS: &str = "DUMPSYNC_INSECURE_TLS";

/// Contents of `dumpsync.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub collections: CollectionNames,
    /// Dump table holding employee rows.
    #[serde(default = "default_employee_table")]
    pub employee_table: String,
    #[serde(default)]
    pub extract: ExtractSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub insecure_tls: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Web app config script holding `apiKey: '…'` and `baseUrl: '…'`.
    #[serde(default)]
    pub web_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionNames {
    #[serde(default = "default_employee_table")]
    pub employees: String,
    #[serde(default = "default_role_collection")]
    pub role_permissions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractSection {
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub min_id: Option<i64>,
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

fn default_employee_table() -> String {
    "tbl_employee".to_string()
}

fn default_role_collection() -> String {
    "marga_role_permissions".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_page_size() -> usize {
    1000
}

fn default_id_column() -> String {
    "id".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store: StoreSection::default(),
            collections: CollectionNames::default(),
            employee_table: default_employee_table(),
            extract: ExtractSection::default(),
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            insecure_tls: false,
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
            web_config: None,
        }
    }
}

impl Default for ExtractSection {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            output_dir: None,
            format: None,
            min_id: None,
            id_column: default_id_column(),
        }
    }
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            employees: default_employee_table(),
            role_permissions: default_role_collection(),
        }
    }
}

impl SyncConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load a YAML config file.
    ///
    /// # Example
    /// ```ignore
    /// let config = SyncConfig::load("dumpsync.yaml")?;
    /// println!("Employee table: {}", config.employee_table);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Load `path` if given, otherwise `./dumpsync.yaml` if it exists,
    /// otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new("dumpsync.yaml").exists() => Self::load("dumpsync.yaml"),
            None => Ok(Self::default()),
        }
    }
}

/// Store settings given on the command line.
#[derive(Debug, Clone, Default)]
pub struct StoreOverrides {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub insecure_tls: bool,
    pub web_config: Option<PathBuf>,
}

/// Endpoint and key scraped from the web app's config script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

pub fn parse_web_config(text: &str) -> WebConfig {
    let capture = |pattern: &str| {
        Regex::new(pattern)
            .ok()
            .and_then(|re| re.captures(text).map(|c| c[1].to_string()))
    };
    WebConfig {
        api_key: capture(r"apiKey:\s*'([^']+)'"),
        base_url: capture(r"baseUrl:\s*'([^']+)'"),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Resolve the store endpoint from all configuration sources.
///
/// `env` looks up an environment variable; the binary passes
/// `|k| std::env::var(k).ok()`.
pub fn resolve_store_config<F>(
    file: &SyncConfig,
    overrides: &StoreOverrides,
    env: F,
) -> Result<StoreConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let web_config_path = overrides
        .web_config
        .as_ref()
        .or(file.store.web_config.as_ref());
    let web = match web_config_path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            parse_web_config(&text)
        }
        None => WebConfig::default(),
    };

    let base_url = non_empty(overrides.base_url.clone())
        .or_else(|| non_empty(env(ENV_STORE_URL)))
        .or_else(|| non_empty(file.store.base_url.clone()))
        .or(web.base_url)
        .ok_or(ConfigError::Missing("base_url"))?;

    let api_key = non_empty(overrides.api_key.clone())
        .or_else(|| non_empty(env(ENV_API_KEY)))
        .or_else(|| non_empty(file.store.api_key.clone()))
        .or(web.api_key);
    if api_key.is_none() {
        tracing::warn!("No store API key configured; requests will be unauthenticated");
    }

    let insecure_tls = overrides.insecure_tls
        || env(ENV_INSECURE_TLS).is_some_and(|v| is_truthy(&v))
        || file.store.insecure_tls;

    Ok(StoreConfig {
        base_url,
        api_key,
        insecure_tls,
        timeout: Duration::from_secs(file.store.timeout_secs),
        page_size: file.store.page_size,
    })
}
