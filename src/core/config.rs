//! Configuration handling for Kiln
//!
//! Layers, lowest precedence first: built-in defaults, the user config file,
//! the project's `kiln.toml`, the project's `.kilnrc` (JSON), then
//! environment variable overrides.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::core::{KilnError, KilnResult};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Registry configuration
    pub registry: RegistryConfig,

    /// Network configuration
    pub network: NetworkConfig,

    /// Install layout configuration
    pub install: InstallConfig,

    /// Security configuration
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Primary registry URL
    pub url: String,

    /// Scoped registry overrides
    #[serde(default)]
    pub scopes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Per-request deadline in seconds
    pub timeout: u64,

    /// Maximum concurrent registry requests
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Dependency directory, relative to the project root
    pub dependency_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Refuse archives the registry publishes without an integrity hash
    pub require_integrity: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "https://registry.npmjs.org".to_string(),
            scopes: HashMap::new(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            concurrency: 8,
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            dependency_dir: PathBuf::from("node_modules"),
        }
    }
}

impl Config {
    /// Load configuration for a project directory and merge with defaults
    pub fn load(project_dir: &Path) -> KilnResult<Self> {
        let mut config = Config::default();

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                tracing::debug!("Loading user config from {}", user_path.display());
                config = config.merge(read_toml(&user_path)?);
            }
        }

        let toml_path = project_dir.join("kiln.toml");
        if toml_path.exists() {
            config = config.merge(read_toml(&toml_path)?);
        }

        let rc_path = project_dir.join(".kilnrc");
        if rc_path.exists() {
            let content = std::fs::read_to_string(&rc_path)?;
            let rc = serde_json::from_str(&content)
                .map_err(|e| KilnError::config(format!("{}: {}", rc_path.display(), e)))?;
            config = config.merge(rc);
        }

        Ok(config.apply_env_overrides(|key| env::var(key).ok()))
    }

    /// Location of the per-user config file
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "kiln", "kiln").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Merge another config into this one (other takes precedence where it
    /// differs from the defaults)
    fn merge(self, other: Config) -> Self {
        let defaults = Config::default();

        Self {
            registry: RegistryConfig {
                url: if other.registry.url != defaults.registry.url {
                    other.registry.url
                } else {
                    self.registry.url
                },
                scopes: {
                    let mut merged = self.registry.scopes;
                    merged.extend(other.registry.scopes);
                    merged
                },
            },
            network: NetworkConfig {
                timeout: if other.network.timeout != defaults.network.timeout {
                    other.network.timeout
                } else {
                    self.network.timeout
                },
                concurrency: if other.network.concurrency != defaults.network.concurrency {
                    other.network.concurrency
                } else {
                    self.network.concurrency
                },
            },
            install: InstallConfig {
                dependency_dir: if other.install.dependency_dir != defaults.install.dependency_dir {
                    other.install.dependency_dir
                } else {
                    self.install.dependency_dir
                },
            },
            security: SecurityConfig {
                require_integrity: other.security.require_integrity
                    || self.security.require_integrity,
            },
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(registry) = var("KILN_REGISTRY") {
            self.registry.url = registry;
        }

        if let Some(concurrency) = var("KILN_CONCURRENCY") {
            match concurrency.parse() {
                Ok(n) if n > 0 => self.network.concurrency = n,
                _ => tracing::warn!("Ignoring invalid KILN_CONCURRENCY={}", concurrency),
            }
        }

        if let Some(timeout) = var("KILN_TIMEOUT") {
            match timeout.parse() {
                Ok(n) => self.network.timeout = n,
                Err(_) => tracing::warn!("Ignoring invalid KILN_TIMEOUT={}", timeout),
            }
        }

        if let Some(dir) = var("KILN_DEPENDENCY_DIR") {
            self.install.dependency_dir = PathBuf::from(dir);
        }

        self
    }
}

fn read_toml(path: &Path) -> KilnResult<Config> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| KilnError::config(format!("{}: {}", path.display(), e)))
}
