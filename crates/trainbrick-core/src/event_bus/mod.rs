//! # Event Bus Module
//!
//! Publish/subscribe distribution of [`SystemEvent`]s between the connection
//! protocol, the per-hub parsers and whatever observes a running system.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trainbrick_core::event_bus::{EventBus, EventFilter, EventCategory, SystemEvent};
//!
//! let bus = EventBus::new();
//! let id = bus.subscribe(
//!     EventFilter::Categories(vec![EventCategory::Connection]),
//!     |event| println!("{}", event.description()),
//! );
//! bus.unsubscribe(id);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
