//! Outbound command queue and dispatcher
//!
//! Hub tasks enqueue [`OutboundRequest`]s on a shared [`CommandQueue`]. A
//! single [`Dispatcher`] drains the queue in FIFO order, frames `tx`
//! payloads and hands one physical command per request to the adapter.
//! When the dispatcher stops, for whatever reason, the adapter receives
//! exactly one `quit`.

use super::adapter::AdapterCommand;
use super::framing;
use crate::hub::Hub;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use trainbrick_core::{
    CommunicationEvent, ConnectionError, ConnectionEvent, EventBus, SystemEvent,
};

/// Kind of outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundKind {
    /// Frame and write the payload
    Tx,
    /// (Re)register notifications on the hub's transmit target
    Notify,
}

/// One unit of work for the dispatcher
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// What to do
    pub kind: OutboundKind,
    /// Destination hub
    pub hub: Arc<Hub>,
    /// Unframed payload (empty for `Notify`)
    pub payload: Vec<u8>,
}

impl OutboundRequest {
    /// A write request
    pub fn tx(hub: Arc<Hub>, payload: Vec<u8>) -> Self {
        Self {
            kind: OutboundKind::Tx,
            hub,
            payload,
        }
    }

    /// A notification registration request
    pub fn notify(hub: Arc<Hub>) -> Self {
        Self {
            kind: OutboundKind::Notify,
            hub,
            payload: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Producer handle of the command queue
#[derive(Debug, Clone)]
pub struct CommandQueue {
    sender: mpsc::UnboundedSender<OutboundRequest>,
    pending: Arc<Pending>,
}

/// Consumer end of the command queue, owned by the dispatcher
#[derive(Debug)]
pub struct QueueReceiver {
    receiver: mpsc::UnboundedReceiver<OutboundRequest>,
    pending: Arc<Pending>,
}

/// Create a connected queue pair
pub fn command_queue() -> (CommandQueue, QueueReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let pending = Arc::new(Pending::default());
    (
        CommandQueue {
            sender,
            pending: pending.clone(),
        },
        QueueReceiver { receiver, pending },
    )
}

impl CommandQueue {
    /// Append a request
    pub fn put(&self, request: OutboundRequest) -> Result<(), ConnectionError> {
        self.pending.count.fetch_add(1, Ordering::AcqRel);
        self.sender.send(request).map_err(|_| {
            self.pending.done();
            ConnectionError::ChannelClosed {
                channel: "command queue".to_string(),
            }
        })
    }

    /// Requests enqueued but not yet acknowledged
    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::Acquire)
    }

    /// Wait until every enqueued request has been acknowledged
    pub async fn join(&self) {
        loop {
            let idle = self.pending.idle.notified();
            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }
}

impl QueueReceiver {
    /// Take the next request, waiting while the queue is empty
    pub async fn recv(&mut self) -> Option<OutboundRequest> {
        self.receiver.recv().await
    }

    /// Acknowledge the request taken last
    pub fn task_done(&self) {
        self.pending.done();
    }
}

/// Sends `quit` to the adapter when dropped
struct QuitOnDrop {
    adapter: mpsc::UnboundedSender<AdapterCommand>,
    events: Arc<EventBus>,
}

impl Drop for QuitOnDrop {
    fn drop(&mut self) {
        tracing::info!("Terminating and disconnecting");
        if self.adapter.send(AdapterCommand::Quit).is_err() {
            tracing::debug!("Adapter already gone");
        }
        self.events
            .emit(SystemEvent::Connection(ConnectionEvent::AdapterShutdown));
    }
}

/// Single consumer of the command queue
pub struct Dispatcher {
    requests: QueueReceiver,
    adapter: mpsc::UnboundedSender<AdapterCommand>,
    events: Arc<EventBus>,
}

impl Dispatcher {
    /// Create a dispatcher feeding `adapter`
    pub fn new(
        requests: QueueReceiver,
        adapter: mpsc::UnboundedSender<AdapterCommand>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            requests,
            adapter,
            events,
        }
    }

    /// Drain the queue until `shutdown` fires, the queue closes or the task
    /// is aborted. Sends `quit` on the way out in every case.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let _quit = QuitOnDrop {
            adapter: self.adapter.clone(),
            events: self.events.clone(),
        };

        loop {
            let request = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                request = self.requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            self.dispatch(request);
            self.requests.task_done();
        }
    }

    fn dispatch(&self, request: OutboundRequest) {
        let hub = request.hub.name();
        let Some(target) = request.hub.tx_target() else {
            tracing::warn!("Dropping {:?} request for unconnected hub {}", request.kind, hub);
            return;
        };

        let command = match request.kind {
            OutboundKind::Tx => {
                let data = match framing::encode(&request.payload) {
                    Ok(data) => data,
                    Err(e) => {
                        tracing::warn!("Dropping message for {}: {}", hub, e);
                        return;
                    }
                };
                tracing::debug!("Got msg for {}: {:02x?}", hub, data);
                self.events
                    .emit(SystemEvent::Communication(CommunicationEvent::FrameSent {
                        hub: hub.to_string(),
                        len: data.len(),
                    }));
                AdapterCommand::Tx {
                    device: target.device,
                    characteristic: target.characteristic,
                    data,
                }
            }
            OutboundKind::Notify => AdapterCommand::Notify {
                device: target.device,
                characteristic: target.characteristic,
            },
        };

        if self.adapter.send(command).is_err() {
            tracing::warn!("Adapter is gone, dropping request for {}", hub);
        }
    }
}
