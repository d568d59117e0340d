//! Client configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default upper bound on busy-port retries during one attach
pub const DEFAULT_MAX_BUSY_RETRIES: u32 = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client: ClientSettings,
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub vhci: VhciSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// TCP port or service name of the remote exporter
    pub tcp_port: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VhciSettings {
    /// Directory holding the `vhci_hcd.N` platform devices
    pub sysfs_root: PathBuf,
    /// Directory for per-port connection records (`~` is expanded)
    pub state_dir: PathBuf,
    /// Busy outcomes tolerated before giving up with "no free port"
    pub max_busy_retries: u32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            tcp_port: protocol::USBIP_PORT.to_string(),
        }
    }
}

impl Default for VhciSettings {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/devices/platform"),
            state_dir: PathBuf::from("/var/run/vhci_hcd"),
            max_busy_retries: DEFAULT_MAX_BUSY_RETRIES,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client: ClientSettings {
                log_level: "info".to_string(),
            },
            network: NetworkSettings::default(),
            vhci: VhciSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![Self::default_path(), PathBuf::from("/etc/usbip/client.toml")];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ClientConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        tracing::debug!(
            "Config: tcp_port={}, sysfs_root={}, state_dir={}, max_busy_retries={}",
            config.network.tcp_port,
            config.vhci.sysfs_root.display(),
            config.vhci.state_dir.display(),
            config.vhci.max_busy_retries
        );
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                // Print to stderr since logging might not be initialized yet
                eprintln!("Config: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usbip").join("client.toml")
        } else {
            PathBuf::from(".config/usbip/client.toml")
        }
    }

    /// State directory with a leading `~` expanded
    pub fn state_dir(&self) -> PathBuf {
        expand_path(&self.vhci.state_dir)
    }

    /// Sysfs root with a leading `~` expanded
    pub fn sysfs_root(&self) -> PathBuf {
        expand_path(&self.vhci.sysfs_root)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.client.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.client.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.network.tcp_port.trim().is_empty() {
            return Err(anyhow!("Empty tcp_port in [network]"));
        }

        if self.vhci.max_busy_retries == 0 {
            return Err(anyhow!("max_busy_retries must be at least 1"));
        }

        Ok(())
    }
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}
