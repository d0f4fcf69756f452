//! ---
//! pldm_section: "01-core-functionality"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Shared primitives and utilities for the firmware-update runtime."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("/var/log/pldm")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_retained_log_files() -> usize {
    7
}

fn default_software_root() -> String {
    "/xyz/openbmc_project/software".to_owned()
}

fn default_fallback_board_path() -> String {
    "/xyz/openbmc_project/inventory/system/board/PLDM_Device".to_owned()
}

fn default_board_interface() -> String {
    "xyz.openbmc_project.Inventory.Item.Board".to_owned()
}

fn default_queue_depth() -> usize {
    64
}

/// Primary configuration object for the firmware-update daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub conditions: ConditionsConfig,
    #[serde(default)]
    pub reactor: ReactorConfig,
    #[serde(default)]
    pub standalone: StandaloneConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "PLDM_FWUP_CONFIG";

    /// Load configuration from disk, respecting the `PLDM_FWUP_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.inventory.validate()?;
        if self.logging.retained_files == 0 {
            return Err(anyhow!("logging.retained_files must be greater than zero"));
        }
        if self.reactor.queue_depth == 0 {
            return Err(anyhow!("reactor.queue_depth must be greater than zero"));
        }
        self.standalone.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Rotated daily files kept on disk.
    #[serde(default = "default_retained_log_files")]
    pub retained_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            retained_files: default_retained_log_files(),
        }
    }
}

/// Object-path conventions used when publishing component inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default = "default_software_root")]
    pub software_root: String,
    #[serde(default = "default_fallback_board_path")]
    pub fallback_board_path: String,
    #[serde(default = "default_board_interface")]
    pub board_interface: String,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            software_root: default_software_root(),
            fallback_board_path: default_fallback_board_path(),
            board_interface: default_board_interface(),
        }
    }
}

impl InventoryConfig {
    pub fn validate(&self) -> Result<()> {
        for (key, path) in [
            ("inventory.software_root", &self.software_root),
            ("inventory.fallback_board_path", &self.fallback_board_path),
        ] {
            if !path.starts_with('/') || (path.len() > 1 && path.ends_with('/')) {
                return Err(anyhow!(
                    "{} must be an absolute object path without a trailing '/': {}",
                    key,
                    path
                ));
            }
        }
        if self.board_interface.trim().is_empty() {
            return Err(anyhow!("inventory.board_interface must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionsConfig {
    /// JSON descriptor binding component names to pre/post setup targets.
    #[serde(default)]
    pub descriptor: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactorConfig {
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
        }
    }
}

/// Endpoints seeded into the in-process backends when the daemon runs
/// without a system bus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandaloneConfig {
    #[serde(default)]
    pub endpoints: Vec<StandaloneEndpoint>,
}

impl StandaloneConfig {
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.eid) {
                return Err(anyhow!(
                    "standalone endpoint {} declared more than once",
                    endpoint.eid
                ));
            }
            if endpoint.inventory_path.trim().is_empty() {
                return Err(anyhow!(
                    "standalone endpoint {} must declare an inventory_path",
                    endpoint.eid
                ));
            }
            if endpoint.components.iter().any(|c| c.name.is_empty()) {
                return Err(anyhow!(
                    "standalone endpoint {} has a component without a name",
                    endpoint.eid
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandaloneEndpoint {
    pub eid: u8,
    pub inventory_path: String,
    #[serde(default)]
    pub board: Option<String>,
    #[serde(default)]
    pub components: Vec<StandaloneComponent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandaloneComponent {
    pub name: String,
    #[serde(default)]
    pub version: String,
}
