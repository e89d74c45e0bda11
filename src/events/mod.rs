//! Named event bus with multi-alias lookup.
//!
//! This module provides the kernel-mediated notification fabric. Components
//! never hold references to each other to stay informed: they look events up
//! by name and register listeners, enabling:
//!   - Loose coupling between producers and observers
//!   - Multiple alias names resolving to one event
//!   - Upstream chaining (prerequisite events fire first)
//!   - Full tracing and observability
//!
//! Events are created explicitly (`create_event`) or on demand
//! (`get_event` with `create_if_missing`); listener registration never
//! creates events on its own.

pub mod event;

pub use event::{Event, EventListener};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::kernel::threads::ThreadRegistry;

// =============================================================================
// Shared Index
// =============================================================================

/// State shared between the bus and its events.
///
/// Events hold a weak back-reference so alias bookkeeping and statistics
/// stay consistent no matter which end performs the change.
pub(crate) struct EventIndex {
    /// Alias lookup: every name of an event maps to the same handle
    pub(crate) by_name: RwLock<HashMap<String, Arc<Event>>>,

    /// Events in creation order
    pub(crate) events: Mutex<Vec<Arc<Event>>>,

    /// Statistics
    pub(crate) stats: Mutex<BusStats>,
}

/// Statistics about bus usage.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BusStats {
    pub events_created: u64,
    pub triggers: u64,
    pub listener_notifications: u64,
    pub reentrant_triggers_suppressed: u64,
    pub off_thread_triggers: u64,
    pub registered_events: usize,
}

// =============================================================================
// EventBus
// =============================================================================

/// Name-indexed event registry.
///
/// The bus owns every event for the lifetime of the kernel; handles returned
/// to callers are shared references to the same objects, so listener and
/// alias changes made through a handle are visible bus-wide.
pub struct EventBus {
    index: Arc<EventIndex>,

    /// Main-thread designation handed to each event for trigger checks
    threads: Arc<ThreadRegistry>,
}

impl EventBus {
    /// Create an empty bus bound to a thread registry.
    pub fn new(threads: Arc<ThreadRegistry>) -> Self {
        Self {
            index: Arc::new(EventIndex {
                by_name: RwLock::new(HashMap::new()),
                events: Mutex::new(Vec::new()),
                stats: Mutex::new(BusStats::default()),
            }),
            threads,
        }
    }

    // =========================================================================
    // Creation and Lookup
    // =========================================================================

    /// Create an event under a single name.
    ///
    /// Returns the new event, or None if the name is empty or already taken.
    pub fn create_event(&self, name: &str, description: &str) -> Option<Arc<Event>> {
        self.create_event_aliased(&[name], description)
    }

    /// Create one event reachable under several alias names.
    ///
    /// All-or-nothing: if any requested name is empty, repeated within the
    /// call, or already taken, no event is created and None is returned.
    pub fn create_event_aliased(&self, names: &[&str], description: &str) -> Option<Arc<Event>> {
        if names.is_empty() {
            tracing::warn!("Cannot create an event without a name");
            return None;
        }
        if names.iter().any(|name| name.is_empty()) {
            tracing::warn!("Event names cannot be empty");
            return None;
        }
        for (position, name) in names.iter().enumerate() {
            if names[..position].contains(name) {
                tracing::warn!("Event name '{}' repeated in creation request", name);
                return None;
            }
        }

        let mut by_name = self.index.by_name.write();
        if let Some(taken) = names.iter().find(|name| by_name.contains_key(**name)) {
            tracing::warn!("Event name '{}' already exists", taken);
            return None;
        }

        let event = Event::new(
            names.iter().map(|name| name.to_string()).collect(),
            description.to_string(),
            Arc::downgrade(&self.index),
            Arc::clone(&self.threads),
        );
        for name in names {
            by_name.insert(name.to_string(), Arc::clone(&event));
        }
        drop(by_name);

        self.index.events.lock().push(Arc::clone(&event));
        {
            let mut stats = self.index.stats.lock();
            stats.events_created += 1;
            stats.registered_events += 1;
        }

        tracing::debug!("Created event '{}' ({} names)", event.name(), names.len());
        Some(event)
    }

    /// Look an event up by any of its names.
    ///
    /// With `create_if_missing`, an unknown name creates a fresh event with
    /// an empty description under that single name.
    pub fn get_event(&self, name: &str, create_if_missing: bool) -> Option<Arc<Event>> {
        if let Some(event) = self.index.by_name.read().get(name) {
            return Some(Arc::clone(event));
        }
        if !create_if_missing {
            return None;
        }
        if name.is_empty() {
            tracing::warn!("Event names cannot be empty");
            return None;
        }

        let mut by_name = self.index.by_name.write();
        // A racing creator may have inserted it between the read and write lock
        if let Some(event) = by_name.get(name) {
            return Some(Arc::clone(event));
        }

        let event = Event::new(
            vec![name.to_string()],
            String::new(),
            Arc::downgrade(&self.index),
            Arc::clone(&self.threads),
        );
        by_name.insert(name.to_string(), Arc::clone(&event));
        drop(by_name);

        self.index.events.lock().push(Arc::clone(&event));
        {
            let mut stats = self.index.stats.lock();
            stats.events_created += 1;
            stats.registered_events += 1;
        }

        tracing::debug!("Created event '{}' on first lookup", name);
        Some(event)
    }

    // =========================================================================
    // Listener Registration
    // =========================================================================

    /// Register a listener with the event of the given name.
    ///
    /// Lookup never creates the event: registering against an unknown name
    /// fails, logging a warning when `warn_if_missing` is set. Returns the
    /// event the listener was registered with, or None if no such event.
    pub fn register_for_event(
        &self,
        name: &str,
        listener: &Arc<dyn EventListener>,
        warn_if_missing: bool,
    ) -> Option<Arc<Event>> {
        let Some(event) = self.get_event(name, false) else {
            if warn_if_missing {
                tracing::warn!("Cannot register listener: no event named '{}'", name);
            }
            return None;
        };

        event.add_event_listener(listener);
        Some(event)
    }

    /// Deregister a listener from the event of the given name.
    ///
    /// Returns true if the event exists and the listener was registered.
    pub fn deregister_from_event(&self, name: &str, listener: &Arc<dyn EventListener>) -> bool {
        match self.get_event(name, false) {
            Some(event) => event.remove_event_listener(listener),
            None => false,
        }
    }

    /// Drop every listener registration on every event.
    pub fn detach_all_listeners(&self) {
        let events = self.index.events.lock().clone();

        let mut detached = 0;
        for event in events {
            detached += event.clear_listeners();
        }

        tracing::debug!("Detached {} listener registrations", detached);
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// All registered names, aliases included, in no particular order.
    pub fn event_names(&self) -> Vec<String> {
        self.index.by_name.read().keys().cloned().collect()
    }

    /// Number of distinct events (an event with three names counts once).
    pub fn event_count(&self) -> usize {
        self.index.events.lock().len()
    }

    /// Get current bus statistics.
    pub fn get_stats(&self) -> BusStats {
        let mut stats = self.index.stats.lock().clone();
        stats.registered_events = self.index.events.lock().len();
        stats
    }

    /// Reset statistics counters. Gauges reflect live state and are kept.
    pub fn reset_stats(&self) {
        let mut stats = self.index.stats.lock();
        let registered_events = stats.registered_events;
        *stats = BusStats {
            registered_events,
            ..BusStats::default()
        };
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Drop every event and alias. Outstanding handles keep their events
    /// alive but the bus no longer resolves their names.
    pub fn clear(&self) {
        self.index.by_name.write().clear();

        let dropped = {
            let mut events = self.index.events.lock();
            let dropped = events.len();
            events.clear();
            dropped
        };

        self.index.stats.lock().registered_events = 0;
        tracing::debug!("Dropped {} events", dropped);
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.index.events.lock().len())
            .field("names", &self.index.by_name.read().len())
            .finish()
    }
}
