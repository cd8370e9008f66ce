//! Configuration for TrainBrick
//!
//! Provides configuration file handling and validation.
//! Supports JSON and TOML file formats; the default file lives in the
//! platform configuration directory.
//!
//! Configuration is organized into sections:
//! - Scan settings (discovery budget, backoff, adapter scan window)
//! - Startup settings (port-assignment polling)
//! - Hub profiles (which hubs to drive and what is attached to them)

use crate::error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use trainbrick_core::{HubIdentity, HubKind, Peripheral};

/// Discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Discovery rounds before a hub counts as not found
    pub max_rounds: u32,
    /// Pause between rounds in milliseconds
    pub backoff_ms: u64,
    /// How long the adapter listens per round, in milliseconds
    pub discover_window_ms: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_rounds: 60,
            backoff_ms: 1000,
            discover_window_ms: 2000,
        }
    }
}

/// Start-up settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupSettings {
    /// Delay before the first check that all peripherals have ports
    pub first_port_poll_ms: u64,
    /// Delay between later checks
    pub port_poll_ms: u64,
}

impl Default for StartupSettings {
    fn default() -> Self {
        Self {
            first_port_poll_ms: 100,
            port_poll_ms: 1000,
        }
    }
}

/// Peripheral presets that can be named in a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeripheralKind {
    DuploTrainMotor,
    DuploSpeaker,
    DuploSpeedometer,
    DuploVisionSensor,
    RgbLight,
    HubButton,
}

impl std::fmt::Display for PeripheralKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeripheralKind::DuploTrainMotor => write!(f, "Duplo train motor"),
            PeripheralKind::DuploSpeaker => write!(f, "Duplo speaker"),
            PeripheralKind::DuploSpeedometer => write!(f, "Duplo speedometer"),
            PeripheralKind::DuploVisionSensor => write!(f, "Duplo vision sensor"),
            PeripheralKind::RgbLight => write!(f, "RGB light"),
            PeripheralKind::HubButton => write!(f, "Hub button"),
        }
    }
}

/// A peripheral entry of a hub profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralProfile {
    /// Name used by the program
    pub name: String,
    /// Preset to build
    pub kind: PeripheralKind,
    /// Expected port, overriding the preset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u8>,
}

impl PeripheralProfile {
    pub fn new(name: impl Into<String>, kind: PeripheralKind) -> Self {
        Self {
            name: name.into(),
            kind,
            port: None,
        }
    }

    /// Build the declared peripheral
    pub fn build(&self) -> Peripheral {
        let peripheral = match self.kind {
            PeripheralKind::DuploTrainMotor => Peripheral::duplo_train_motor(&self.name),
            PeripheralKind::DuploSpeaker => Peripheral::duplo_speaker(&self.name),
            PeripheralKind::DuploSpeedometer => Peripheral::duplo_speedometer(&self.name),
            PeripheralKind::DuploVisionSensor => Peripheral::duplo_vision_sensor(&self.name),
            PeripheralKind::RgbLight => Peripheral::rgb_light(&self.name),
            PeripheralKind::HubButton => Peripheral::hub_button(&self.name),
        };
        match self.port {
            Some(port) => peripheral.on_port(port),
            None => peripheral,
        }
    }
}

/// One hub the program drives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubProfile {
    /// Display name
    pub name: String,
    /// Hub family
    pub kind: HubKind,
    /// Advertised name, if not the family default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ble_name: Option<String>,
    /// Address or UUID of one specific hub
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ble_id: Option<String>,
    /// Attached peripherals
    #[serde(default)]
    pub peripherals: Vec<PeripheralProfile>,
}

impl HubProfile {
    pub fn new(name: impl Into<String>, kind: HubKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ble_name: None,
            ble_id: None,
            peripherals: Vec::new(),
        }
    }

    /// The stock Duplo train: motor, speaker and light
    pub fn duplo_train(name: impl Into<String>) -> Self {
        let mut profile = Self::new(name, HubKind::DuploTrain);
        profile.peripherals = vec![
            PeripheralProfile::new("motor", PeripheralKind::DuploTrainMotor),
            PeripheralProfile::new("speaker", PeripheralKind::DuploSpeaker),
            PeripheralProfile::new("light", PeripheralKind::RgbLight),
        ];
        profile
    }

    /// Identity to search for
    pub fn identity(&self) -> HubIdentity {
        let mut identity = HubIdentity::for_kind(&self.name, self.kind);
        if let Some(ble_name) = &self.ble_name {
            identity = identity.with_ble_name(ble_name);
        }
        if let Some(ble_id) = &self.ble_id {
            identity = identity.with_ble_id(ble_id);
        }
        identity
    }

    /// Declared peripherals, in file order
    pub fn build_peripherals(&self) -> Vec<Peripheral> {
        self.peripherals.iter().map(PeripheralProfile::build).collect()
    }

    fn validate(&self, index: usize) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingValue(format!("hubs[{}].name", index)));
        }
        if self.ble_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(ConfigError::MissingValue(format!("hubs[{}].ble_id", index)));
        }

        let mut names = HashSet::new();
        for (i, peripheral) in self.peripherals.iter().enumerate() {
            if peripheral.name.trim().is_empty() {
                return Err(ConfigError::MissingValue(format!(
                    "hubs[{}].peripherals[{}].name",
                    index, i
                )));
            }
            if !names.insert(peripheral.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    section: format!("peripheral on hub '{}'", self.name),
                    name: peripheral.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Discovery settings
    #[serde(default)]
    pub scan: ScanSettings,
    /// Start-up settings
    #[serde(default)]
    pub startup: StartupSettings,
    /// Hubs to connect, in connection order
    #[serde(default)]
    pub hubs: Vec<HubProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan: ScanSettings::default(),
            startup: StartupSettings::default(),
            hubs: vec![HubProfile::duplo_train("Duplo train")],
        }
    }
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> ConfigResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location, e.g. `~/.config/trainbrick/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| {
            SettingsError::ConfigDirectory("no configuration directory on this platform".to_string())
        })?;
        Ok(dir.join("trainbrick").join("config.toml"))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::LoadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return the defaults
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content).map_err(|e| SettingsError::SaveError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scan.max_rounds == 0 {
            return Err(ConfigError::ValueOutOfRange {
                key: "scan.max_rounds".to_string(),
                value: "0".to_string(),
            });
        }

        if self.scan.discover_window_ms == 0 {
            return Err(ConfigError::ValueOutOfRange {
                key: "scan.discover_window_ms".to_string(),
                value: "0".to_string(),
            });
        }

        if self.startup.port_poll_ms == 0 {
            return Err(ConfigError::ValueOutOfRange {
                key: "startup.port_poll_ms".to_string(),
                value: "0".to_string(),
            });
        }

        let mut names = HashSet::new();
        for (index, hub) in self.hubs.iter().enumerate() {
            hub.validate(index)?;
            if !names.insert(hub.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    section: "hub".to_string(),
                    name: hub.name.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scan.max_rounds, 60);
        assert_eq!(config.startup.first_port_poll_ms, 100);
        assert_eq!(config.hubs[0].kind, HubKind::DuploTrain);
    }

    #[test]
    fn test_rejects_zero_budget() {
        let mut config = Config::default();
        config.scan.max_rounds = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let mut config = Config::default();
        config.hubs.push(HubProfile::duplo_train("Duplo train"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateName { .. })
        ));

        let mut config = Config::default();
        config.hubs[0]
            .peripherals
            .push(PeripheralProfile::new("motor", PeripheralKind::DuploTrainMotor));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_profile_identity() {
        let mut profile = HubProfile::new("crane", HubKind::ControlPlus);
        profile.ble_name = Some("Crane".to_string());
        profile.ble_id = Some("90:84:2B:4A:2B:75".to_string());

        let identity = profile.identity();
        assert_eq!(identity.name, "crane");
        assert_eq!(identity.ble_name, "Crane");
        assert_eq!(identity.manufacturer_id, 0x80);
        assert_eq!(identity.ble_id.as_deref(), Some("90:84:2B:4A:2B:75"));
    }

    #[test]
    fn test_peripheral_port_override() {
        let mut profile = PeripheralProfile::new("light", PeripheralKind::RgbLight);
        profile.port = Some(0x11);
        assert_eq!(profile.build().declared_port(), Some(0x11));
    }

    #[test]
    fn test_toml_sections_default() {
        let config: Config = toml::from_str(
            r#"
            [[hubs]]
            name = "remote"
            kind = "powered_up_remote"
            "#,
        )
        .unwrap();
        assert_eq!(config.scan, ScanSettings::default());
        assert_eq!(config.hubs.len(), 1);
        assert!(config.hubs[0].peripherals.is_empty());
    }
}
