//! Event Bus implementation.
//!
//! Each `System` owns one [`EventBus`]; there is no process-wide instance.
//! Synchronous handlers run on the publishing task, async consumers use a
//! broadcast receiver.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::events::{EventCategory, SystemEvent};

/// Subscription handle for unsubscribing from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Filter to receive only specific events
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    /// Receive all events.
    #[default]
    All,
    /// Receive events matching any of these categories.
    Categories(Vec<EventCategory>),
    /// Receive events concerning one hub.
    Hub(String),
}

impl EventFilter {
    /// Check if an event matches this filter
    pub fn matches(&self, event: &SystemEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
            EventFilter::Hub(name) => event.hub() == Some(name.as_str()),
        }
    }
}

type EventHandler = Arc<dyn Fn(&SystemEvent) + Send + Sync>;

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Capacity of the broadcast channel.
    pub channel_capacity: usize,
    /// Number of recent events kept for inspection (0 disables history).
    pub history_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            history_size: 0,
        }
    }
}

/// Event bus distributing [`SystemEvent`]s
pub struct EventBus {
    sender: broadcast::Sender<SystemEvent>,
    handlers: RwLock<HashMap<SubscriptionId, (EventFilter, EventHandler)>>,
    history: RwLock<VecDeque<SystemEvent>>,
    config: EventBusConfig,
}

impl EventBus {
    /// Create a new event bus with default configuration
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            handlers: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::with_capacity(config.history_size)),
            config,
        }
    }

    /// Publish an event to handlers and receivers.
    ///
    /// Events nobody listens to are dropped silently.
    pub fn emit(&self, event: SystemEvent) {
        tracing::trace!("event: {}", event.description());

        if self.config.history_size > 0 {
            let mut history = self.history.write();
            if history.len() == self.config.history_size {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // Clone handlers out so a handler may subscribe/unsubscribe
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .values()
            .filter(|(filter, _)| filter.matches(&event))
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(&event);
        }

        let _ = self.sender.send(event);
    }

    /// Register a synchronous handler.
    ///
    /// The handler runs on the publishing task and should return quickly.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&SystemEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.handlers.write().insert(id, (filter, Arc::new(handler)));
        tracing::debug!("Subscription {} added", id);
        id
    }

    /// Get a receiver for consuming events in a tokio task
    pub fn receiver(&self) -> broadcast::Receiver<SystemEvent> {
        self.sender.subscribe()
    }

    /// Remove a handler. Returns true if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.handlers.write().remove(&id).is_some();
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Number of registered handlers
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Recent events, oldest first (empty when history is disabled)
    pub fn history(&self) -> Vec<SystemEvent> {
        self.history.read().iter().cloned().collect()
    }

    /// Get the current configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::events::{ConnectionEvent, PeripheralEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn attached(hub: &str) -> SystemEvent {
        SystemEvent::Peripheral(PeripheralEvent::Attached {
            hub: hub.to_string(),
            peripheral: "motor".to_string(),
            port: 0,
        })
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new();

        let id = bus.subscribe(EventFilter::All, |_| {});
        assert_eq!(bus.subscriber_count(), 1);

        assert!(bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn test_emit_without_listeners() {
        let bus = EventBus::new();
        bus.emit(SystemEvent::Connection(ConnectionEvent::AdapterShutdown));
    }

    #[test]
    fn test_event_filtering() {
        let bus = EventBus::new();
        let connection_count = Arc::new(AtomicUsize::new(0));
        let train_count = Arc::new(AtomicUsize::new(0));

        let cc = connection_count.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Connection]),
            move |_| {
                cc.fetch_add(1, Ordering::SeqCst);
            },
        );

        let tc = train_count.clone();
        bus.subscribe(EventFilter::Hub("train".to_string()), move |_| {
            tc.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(SystemEvent::Connection(ConnectionEvent::Connected {
            hub: "train".to_string(),
            address: "aa".to_string(),
        }));
        bus.emit(attached("train"));
        bus.emit(attached("crane"));

        assert_eq!(connection_count.load(Ordering::SeqCst), 1);
        assert_eq!(train_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_history_is_bounded() {
        let bus = EventBus::with_config(EventBusConfig {
            history_size: 3,
            ..Default::default()
        });

        for hub in ["a", "b", "c", "d", "e"] {
            bus.emit(attached(hub));
        }

        let hubs: Vec<_> = bus
            .history()
            .iter()
            .filter_map(|e| e.hub().map(str::to_string))
            .collect();
        assert_eq!(hubs, vec!["c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let bus = EventBus::new();
        let mut receiver = bus.receiver();

        bus.emit(attached("train"));

        match receiver.recv().await {
            Ok(SystemEvent::Peripheral(PeripheralEvent::Attached { hub, port, .. })) => {
                assert_eq!(hub, "train");
                assert_eq!(port, 0);
            }
            other => panic!("Wrong event received: {:?}", other),
        }
    }
}
