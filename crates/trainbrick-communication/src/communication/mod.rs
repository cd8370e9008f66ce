//! Channels, codecs and state machines between hub tasks and the BLE
//! adapter.

pub mod adapter;
#[cfg(feature = "ble")]
pub mod btle;
pub mod connection;
pub mod framing;
pub mod matcher;
pub mod queue;
pub mod router;
pub mod simulated;

pub use adapter::{
    run_adapter, spawn_adapter_task, spawn_adapter_thread, spawn_adapter_thread_with, Adapter,
    AdapterCommand, AdapterEvent, AdapterHandle, AdapterThread, NotificationSink,
};
#[cfg(feature = "ble")]
pub use btle::BtleplugAdapter;
pub use connection::{
    Connected, ConnectionSession, ConnectionState, Connector, ScanPolicy, DEFAULT_SCAN_BACKOFF,
    DEFAULT_SCAN_ROUNDS,
};
pub use matcher::{select_device, MatchTarget};
pub use queue::{command_queue, CommandQueue, Dispatcher, OutboundKind, OutboundRequest, QueueReceiver};
pub use router::{spawn_router, ListenerKey, ListenerTable};
pub use simulated::{attached_io_frame, SimulatedAdapter, SimulatedCall, SimulationLog};
