//! # TrainBrick Communication
//!
//! BLE command queue, connection protocol and hub runtime for TrainBrick.
//! Hub tasks enqueue commands that a single dispatcher frames and forwards
//! to a BLE adapter running on its own thread; notifications flow back
//! through a listener table to per-hub message parsers.

pub mod communication;
pub mod hub;
pub mod protocol;
pub mod system;

pub use communication::{
    spawn_adapter_task, spawn_adapter_thread, spawn_adapter_thread_with, Adapter, AdapterCommand,
    AdapterEvent, AdapterHandle, AdapterThread, CommandQueue, ConnectionState, Connector,
    ScanPolicy, SimulatedAdapter, SimulationLog,
};

#[cfg(feature = "ble")]
pub use communication::BtleplugAdapter;

pub use hub::{ChangeHandler, Hub, HubBuilder, HubConnection, HubLogic, PeripheralUpdate};
pub use protocol::{Color, DuploSound, HubMessage};
pub use system::{System, SystemOptions};
