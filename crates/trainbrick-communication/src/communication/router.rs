//! Inbound notification routing
//!
//! The adapter's event stream carries two kinds of traffic: answers to
//! `discover`/`connect` requests and unsolicited notifications. The router
//! splits them, forwarding notifications to the listener registered for
//! their `(device, characteristic)` key.

use super::adapter::AdapterEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use trainbrick_core::{thread_safe_rw_map, DeviceHandle, ThreadSafeRwMap};
use uuid::Uuid;

/// Key a listener is registered on
pub type ListenerKey = (DeviceHandle, Uuid);

/// Listener table shared between the connection protocol and the router
#[derive(Debug, Clone)]
pub struct ListenerTable {
    listeners: ThreadSafeRwMap<ListenerKey, mpsc::UnboundedSender<Vec<u8>>>,
}

impl ListenerTable {
    /// Empty table
    pub fn new() -> Self {
        Self {
            listeners: thread_safe_rw_map(),
        }
    }

    /// Register the parser channel for a key, replacing any previous one
    pub fn register(&self, key: ListenerKey, listener: mpsc::UnboundedSender<Vec<u8>>) {
        if self.listeners.write().insert(key, listener).is_some() {
            tracing::warn!("Replaced listener for {} / {}", key.0, key.1);
        }
    }

    /// Drop the listener for a key
    pub fn remove(&self, key: &ListenerKey) -> bool {
        self.listeners.write().remove(key).is_some()
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Forward bytes to the listener for `key`, unmodified.
    ///
    /// Returns false when nobody listens on the key.
    pub fn route(&self, key: ListenerKey, data: Vec<u8>) -> bool {
        let listener = self.listeners.read().get(&key).cloned();
        match listener {
            Some(listener) => {
                if listener.send(data).is_err() {
                    tracing::debug!("Listener for {} / {} is gone", key.0, key.1);
                    self.remove(&key);
                    return false;
                }
                true
            }
            None => false,
        }
    }
}

impl Default for ListenerTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the router task.
///
/// Returns the stream of request answers and the task handle. The task ends
/// when the adapter closes its event stream.
pub fn spawn_router(
    mut events: mpsc::UnboundedReceiver<AdapterEvent>,
    listeners: ListenerTable,
) -> (mpsc::UnboundedReceiver<AdapterEvent>, JoinHandle<()>) {
    let (responses_tx, responses_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                AdapterEvent::Notification {
                    device,
                    characteristic,
                    data,
                } => {
                    if !listeners.route((device, characteristic), data) {
                        tracing::debug!(
                            "Dropping notification for unknown key {} / {}",
                            device,
                            characteristic
                        );
                    }
                }
                response => {
                    if responses_tx.send(response).is_err() {
                        tracing::debug!("Nobody waits for adapter responses any more");
                    }
                }
            }
        }
        tracing::debug!("Adapter event stream closed, router stopping");
    });

    (responses_rx, task)
}
