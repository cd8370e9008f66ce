//! TrainBrick Settings Crate
//!
//! Loads, validates and saves the configuration file that lists the hubs to
//! drive together with the discovery and start-up timing.

pub mod config;
pub mod error;

pub use config::{
    Config, HubProfile, PeripheralKind, PeripheralProfile, ScanSettings, StartupSettings,
};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
