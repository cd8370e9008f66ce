//! System orchestrator
//!
//! A [`System`] owns the registered hubs and the event bus. [`System::run`]
//! brings up the dispatcher and router, connects the hubs one after another,
//! waits for each hub's peripherals to report their ports, runs the hub
//! programs concurrently and tears everything down once they have finished.

use crate::communication::adapter::AdapterHandle;
use crate::communication::connection::{Connector, ScanPolicy};
use crate::communication::queue::{command_queue, Dispatcher};
use crate::communication::router::{spawn_router, ListenerTable};
use crate::hub::Hub;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trainbrick_core::{Error, ErrorEvent, EventBus, Result, SystemEvent};

/// Timing of a system run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemOptions {
    /// Discovery retry budget
    pub scan: ScanPolicy,
    /// Delay before the first port-assignment check
    pub first_port_poll: Duration,
    /// Delay between later port-assignment checks
    pub port_poll: Duration,
}

impl Default for SystemOptions {
    fn default() -> Self {
        Self {
            scan: ScanPolicy::default(),
            first_port_poll: Duration::from_millis(100),
            port_poll: Duration::from_secs(1),
        }
    }
}

/// Explicit runtime context holding every hub of a program
#[derive(Debug, Default)]
pub struct System {
    hubs: Vec<Arc<Hub>>,
    options: SystemOptions,
    events: Arc<EventBus>,
}

impl System {
    /// Create an empty system with its own event bus
    pub fn new(options: SystemOptions) -> Self {
        Self {
            hubs: Vec::new(),
            options,
            events: Arc::new(EventBus::new()),
        }
    }

    /// Use an existing event bus
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Register a hub. Hubs connect in registration order.
    pub fn register(&mut self, hub: Arc<Hub>) {
        tracing::debug!("Registered hub {}", hub.name());
        self.hubs.push(hub);
    }

    /// Registered hubs, in connection order
    pub fn hubs(&self) -> &[Arc<Hub>] {
        &self.hubs
    }

    /// Event bus shared by every hub of the system
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Timing used by [`System::run`]
    pub fn options(&self) -> &SystemOptions {
        &self.options
    }

    /// Run every hub to completion over the given adapter.
    ///
    /// A hub that cannot be connected aborts the run: no further hubs are
    /// tried, the adapter is told to quit and the error is returned. A hub
    /// program that fails is logged; the first such failure is returned once
    /// the whole system has been torn down.
    pub async fn run(&self, adapter: AdapterHandle) -> Result<()> {
        let AdapterHandle { commands, events } = adapter;

        let listeners = ListenerTable::new();
        let (responses, router) = spawn_router(events, listeners.clone());

        let (queue, requests) = command_queue();
        let shutdown = CancellationToken::new();
        let dispatcher = Dispatcher::new(requests, commands.clone(), self.events.clone());
        let dispatcher = tokio::spawn(dispatcher.run(shutdown.clone()));

        let mut connector = Connector::new(
            commands,
            responses,
            listeners,
            queue,
            self.events.clone(),
            self.options.scan.clone(),
        );

        let mut parsers = Vec::with_capacity(self.hubs.len());
        for hub in &self.hubs {
            match connector.connect(hub).await {
                Ok(connected) => parsers.push(connected.parser),
                Err(e) => {
                    tracing::error!("Aborting: {}", e);
                    drop(connector);
                    shutdown.cancel();
                    let _ = dispatcher.await;
                    abort_all(parsers).await;
                    router.abort();
                    return Err(e);
                }
            }
        }
        drop(connector);

        let mut listening = Vec::with_capacity(self.hubs.len());
        let mut running = Vec::with_capacity(self.hubs.len());
        for hub in &self.hubs {
            let listener = hub.clone();
            listening.push(tokio::spawn(async move { listener.listen().await }));

            self.wait_for_ports(hub).await;

            let runner = hub.clone();
            running.push((hub.name().to_string(), tokio::spawn(runner.run())));
        }

        tracing::info!("Waiting for hubs to end");
        let mut failure = None;
        for (name, task) in running {
            let error = match task.await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("task aborted: {}", e),
            };
            tracing::error!("Hub {} failed: {}", name, error);
            self.events.emit(SystemEvent::Error(ErrorEvent::HubTaskFailed {
                hub: name.clone(),
                error: error.clone(),
            }));
            failure.get_or_insert(Error::other(format!("hub {} failed: {}", name, error)));
        }
        tracing::info!("Hubs end");

        abort_all(listening).await;
        shutdown.cancel();
        let _ = dispatcher.await;
        abort_all(parsers).await;
        router.abort();

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn wait_for_ports(&self, hub: &Hub) {
        let mut delay = self.options.first_port_poll;
        for peripheral in hub.peripherals() {
            while !peripheral.is_attached() {
                tracing::info!(
                    "Waiting for peripheral {} on {} to attach to a port",
                    peripheral.name(),
                    hub.name()
                );
                tokio::time::sleep(delay).await;
                delay = self.options.port_poll;
            }
        }
    }
}

async fn abort_all(tasks: Vec<JoinHandle<()>>) {
    for task in &tasks {
        task.abort();
    }
    for task in tasks {
        let _ = task.await;
    }
}
