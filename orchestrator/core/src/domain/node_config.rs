// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the configuration schema for a dapp host node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Dapp directories, download limits and sandbox interpreter
// - Per-dapp launch parameters
// - Network and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "DappNodeConfig";

/// Top-level Kubernetes-style node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "DappNodeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: NodeConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Node configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfigSpec {
    #[serde(default)]
    pub dapps: DappsConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DappsConfig {
    /// Root under which `dapps/` install directories live
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Static assets root; dapp `public/` folders are linked under `<public_dir>/dapps`
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,

    /// Download staging directory
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,

    /// Gate for install/uninstall/launch/stop. Disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_password: Option<String>,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_seconds: u64,

    /// Program used to run a dapp entry point
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// Launch parameters per dapp id, used when the node becomes ready
    #[serde(default)]
    pub params: HashMap<String, Vec<String>>,
}

impl DappsConfig {
    pub fn dapps_dir(&self) -> PathBuf {
        self.base_dir.join("dapps")
    }
}

impl Default for DappsConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            public_dir: default_public_dir(),
            tmp_dir: default_tmp_dir(),
            master_password: None,
            download_timeout_seconds: default_download_timeout(),
            interpreter: default_interpreter(),
            entry_point: default_entry_point(),
            params: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network bind address (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("./public")
}

fn default_tmp_dir() -> PathBuf {
    std::env::temp_dir().join("aegis-dapps")
}

fn default_download_timeout() -> u64 {
    30
}

fn default_interpreter() -> String {
    "node".to_string()
}

fn default_entry_point() -> String {
    "index.js".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    4096
}

impl Default for NodeConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "aegis-dapps".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: NodeConfigSpec::default(),
        }
    }
}

impl NodeConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. AEGIS_DAPPS_CONFIG_PATH environment variable
    /// 2. ./aegis-dapps.yaml (working directory)
    /// 3. ~/.aegis/dapps.yaml (user home)
    /// 4. /etc/aegis/dapps.yaml (system, Unix) or C:\ProgramData\Aegis\dapps.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AEGIS_DAPPS_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aegis-dapps.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aegis").join("dapps.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/aegis/dapps.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Aegis\\dapps.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AEGIS_DAPPS_MASTER_PASSWORD") {
            tracing::info!("Environment override: AEGIS_DAPPS_MASTER_PASSWORD=<redacted>");
            self.spec.dapps.master_password = (!val.is_empty()).then_some(val);
        }

        if let Ok(val) = std::env::var("AEGIS_DAPPS_BASE_DIR") {
            tracing::info!("Environment override: AEGIS_DAPPS_BASE_DIR={}", val);
            self.spec.dapps.base_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("AEGIS_DAPPS_DOWNLOAD_TIMEOUT") {
            match val.parse::<u64>() {
                Ok(seconds) => {
                    tracing::info!("Environment override: AEGIS_DAPPS_DOWNLOAD_TIMEOUT={}", seconds);
                    self.spec.dapps.download_timeout_seconds = seconds;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for AEGIS_DAPPS_DOWNLOAD_TIMEOUT: '{}'. Expected seconds. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.dapps.download_timeout_seconds == 0 {
            anyhow::bail!("spec.dapps.download_timeout_seconds must be greater than zero");
        }

        if self.spec.dapps.interpreter.is_empty() {
            anyhow::bail!("spec.dapps.interpreter cannot be empty");
        }

        Ok(())
    }

    pub fn network(&self) -> NetworkConfig {
        self.spec.network.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> Option<&LoggingConfig> {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.as_ref())
    }
}
