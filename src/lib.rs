//! # TrainBrick
//!
//! Drive LEGO Powered Up hubs (Duplo trains, Boost, Control+, remotes) over
//! Bluetooth LE from async Rust.
//!
//! ## Architecture
//!
//! TrainBrick is organized as a workspace with multiple crates:
//!
//! 1. **trainbrick-core** - Hub and peripheral descriptions, errors, event bus
//! 2. **trainbrick-communication** - BLE adapter worker, command queue, connection protocol, message parser, hubs and the system orchestrator
//! 3. **trainbrick-settings** - Configuration file (TOML/JSON) listing the hubs to drive
//! 4. **trainbrick** - Command line binary tying the crates together
//!
//! A program declares hubs with their peripherals and logic, registers them
//! with a [`System`] and runs it against an adapter. The system connects the
//! hubs one after another, waits until every peripheral has reported its
//! port, runs all hub programs concurrently and shuts the adapter down once
//! they are done.

pub mod app;

pub use trainbrick_communication::{
    spawn_adapter_task, spawn_adapter_thread, spawn_adapter_thread_with, Adapter, AdapterCommand,
    AdapterEvent, AdapterHandle, AdapterThread, ChangeHandler, Color, CommandQueue,
    ConnectionState, Connector, DuploSound, Hub, HubBuilder, HubConnection, HubLogic, HubMessage,
    PeripheralUpdate, ScanPolicy, SimulatedAdapter, SimulationLog, System, SystemOptions,
};

#[cfg(feature = "ble")]
pub use trainbrick_communication::BtleplugAdapter;

pub use trainbrick_core::{
    Capability, ConnectionError, DiscoveredDevice, Error, EventBus, EventCategory, EventFilter,
    HubError, HubIdentity, HubKind, IoType, Peripheral, ProtocolError, Result, SystemEvent,
};

pub use trainbrick_settings::{Config, HubProfile, PeripheralKind, PeripheralProfile};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
