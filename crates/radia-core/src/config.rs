use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stations: StationsConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub buttons: ButtonsConfig,
    #[serde(default)]
    pub mpv: MpvConfig,
    #[serde(default)]
    pub power: PowerConfig,
}

/// Station list sources. The backup is only read when the primary fails to
/// parse or holds no stations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationsConfig {
    #[serde(default = "default_primary")]
    pub primary: PathBuf,
    #[serde(default = "default_backup")]
    pub backup: PathBuf,
    /// Station started right after the first render, if present in the catalog.
    /// An empty string disables autoplay.
    #[serde(default = "default_autoplay")]
    pub autoplay: Option<String>,
}

/// SH1106 wiring. Pin numbers are gpiochip line offsets (BCM numbering on a Pi).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_spi_device")]
    pub spi_device: PathBuf,
    #[serde(default = "default_gpio_chip")]
    pub gpio_chip: PathBuf,
    #[serde(default = "default_reset_pin")]
    pub reset_pin: u32,
    #[serde(default = "default_dc_pin")]
    pub dc_pin: u32,
    /// Chip-select line. Left unset, spidev toggles CE0 itself.
    #[serde(default)]
    pub cs_pin: Option<u32>,
    #[serde(default = "default_backlight_pin")]
    pub backlight_pin: u32,
    #[serde(default = "default_invert")]
    pub invert: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonsConfig {
    #[serde(default = "default_gpio_chip")]
    pub gpio_chip: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpvConfig {
    #[serde(default = "default_network_caching_ms")]
    pub network_caching_ms: u64,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerConfig {
    #[serde(default = "default_shutdown_command")]
    pub shutdown_command: Vec<String>,
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            backup: default_backup(),
            autoplay: default_autoplay(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            spi_device: default_spi_device(),
            gpio_chip: default_gpio_chip(),
            reset_pin: default_reset_pin(),
            dc_pin: default_dc_pin(),
            cs_pin: None,
            backlight_pin: default_backlight_pin(),
            invert: default_invert(),
        }
    }
}

impl Default for ButtonsConfig {
    fn default() -> Self {
        Self {
            gpio_chip: default_gpio_chip(),
        }
    }
}

impl Default for MpvConfig {
    fn default() -> Self {
        Self {
            network_caching_ms: default_network_caching_ms(),
            volume: default_volume(),
        }
    }
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            shutdown_command: default_shutdown_command(),
        }
    }
}

fn default_primary() -> PathBuf {
    platform::config_dir().join("CZ.json")
}

fn default_backup() -> PathBuf {
    platform::config_dir().join("CZ_bak.json")
}

fn default_autoplay() -> Option<String> {
    Some("Rádio Beat".to_string())
}

fn default_spi_device() -> PathBuf {
    PathBuf::from("/dev/spidev0.0")
}

fn default_gpio_chip() -> PathBuf {
    PathBuf::from("/dev/gpiochip0")
}

fn default_reset_pin() -> u32 {
    25
}

fn default_dc_pin() -> u32 {
    24
}

fn default_backlight_pin() -> u32 {
    18
}

fn default_invert() -> bool {
    true
}

fn default_network_caching_ms() -> u64 {
    7000
}

fn default_volume() -> f32 {
    1.0
}

fn default_shutdown_command() -> Vec<String> {
    ["sudo", "shutdown", "-h", "now"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stations: StationsConfig::default(),
            display: DisplayConfig::default(),
            buttons: ButtonsConfig::default(),
            mpv: MpvConfig::default(),
            power: PowerConfig::default(),
        }
    }
}
