//! Event objects and listener registration.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::EventIndex;
use crate::kernel::threads::ThreadRegistry;

/// Observer notified when an event fires.
///
/// The bus stores only weak references: registering a listener does not keep
/// it alive, and a dropped listener is skipped and pruned. `on_event` runs on
/// the triggering thread with no bus lock held, so listeners may register,
/// deregister, or trigger other events from inside the callback.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Compare a stored listener reference with a live listener by address.
fn same_listener(stored: &Weak<dyn EventListener>, listener: &Arc<dyn EventListener>) -> bool {
    stored.as_ptr() as *const () == Arc::as_ptr(listener) as *const ()
}

// =============================================================================
// Event
// =============================================================================

/// A named notification channel.
///
/// An event carries one or more alias names (all resolving to this same
/// object), a human-readable description, a listener list notified in
/// reverse-of-registration order, and a list of upstream events that fire
/// to completion before this event's own listeners run.
pub struct Event {
    /// Alias names; the first entry is the primary name used in logs.
    names: Mutex<Vec<String>>,

    description: String,

    /// Listener references in notification order (newest first).
    listeners: Mutex<Vec<Weak<dyn EventListener>>>,

    /// Upstream events, triggered in addition order.
    upstream: Mutex<Vec<Arc<Event>>>,

    /// Set while a trigger cycle is executing.
    triggering: AtomicBool,

    /// Back-reference to the bus index for alias bookkeeping and stats.
    index: Weak<EventIndex>,

    /// Self-reference so alias registration can hand out a shared handle.
    self_ref: Weak<Event>,

    /// Main-thread designation consulted when triggering.
    threads: Arc<ThreadRegistry>,
}

impl Event {
    pub(crate) fn new(
        names: Vec<String>,
        description: String,
        index: Weak<EventIndex>,
        threads: Arc<ThreadRegistry>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            names: Mutex::new(names),
            description,
            listeners: Mutex::new(Vec::new()),
            upstream: Mutex::new(Vec::new()),
            triggering: AtomicBool::new(false),
            index,
            self_ref: self_ref.clone(),
            threads,
        })
    }

    // =========================================================================
    // Names
    // =========================================================================

    /// Primary name (the first alias).
    pub fn name(&self) -> String {
        self.names
            .lock()
            .first()
            .cloned()
            .unwrap_or_default()
    }

    /// All alias names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.names.lock().clone()
    }

    /// Human-readable description (empty for implicitly created events).
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Add an alias for this event.
    /// Returns true on success, false if the name is empty, already mapped
    /// anywhere on the bus, or the bus is gone.
    pub fn add_name(&self, name: &str) -> bool {
        if name.is_empty() {
            tracing::warn!("Event alias cannot be empty");
            return false;
        }

        let (Some(index), Some(this)) = (self.index.upgrade(), self.self_ref.upgrade()) else {
            tracing::warn!("Cannot add alias '{}': event bus is gone", name);
            return false;
        };

        let mut by_name = index.by_name.write();
        if by_name.contains_key(name) {
            tracing::warn!("Event name '{}' is already taken", name);
            return false;
        }

        by_name.insert(name.to_string(), this);
        self.names.lock().push(name.to_string());

        tracing::debug!("Event '{}' gained alias '{}'", self.name(), name);
        true
    }

    /// Remove an alias. The last remaining name cannot be removed: an event
    /// must stay reachable by at least one name.
    pub fn remove_name(&self, name: &str) -> bool {
        let index = self.index.upgrade();
        let mut by_name = index.as_ref().map(|i| i.by_name.write());

        let mut names = self.names.lock();
        if !names.iter().any(|n| n == name) {
            return false;
        }
        if names.len() == 1 {
            tracing::warn!("Cannot remove '{}': it is the event's last name", name);
            return false;
        }

        names.retain(|n| n != name);
        if let Some(map) = by_name.as_mut() {
            map.remove(name);
        }

        tracing::debug!("Event '{}' lost alias '{}'", names[0], name);
        true
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Register a listener. New listeners are prepended: one trigger notifies
    /// in reverse-of-registration order.
    /// Returns true on success, false if this listener is already registered.
    pub fn add_event_listener(&self, listener: &Arc<dyn EventListener>) -> bool {
        let mut listeners = self.listeners.lock();
        listeners.retain(|stored| stored.upgrade().is_some());

        if listeners.iter().any(|stored| same_listener(stored, listener)) {
            tracing::warn!("Listener already registered for event '{}'", self.name());
            return false;
        }

        listeners.insert(0, Arc::downgrade(listener));
        tracing::debug!("Listener registered for event '{}'", self.name());
        true
    }

    /// Deregister a listener. Returns true if it was registered.
    pub fn remove_event_listener(&self, listener: &Arc<dyn EventListener>) -> bool {
        let mut listeners = self.listeners.lock();
        let found = listeners.iter().any(|stored| same_listener(stored, listener));

        listeners.retain(|stored| {
            stored.upgrade().is_some() && !same_listener(stored, listener)
        });

        if found {
            tracing::debug!("Listener deregistered from event '{}'", self.name());
        }
        found
    }

    /// Drop every listener registration. Returns the number of live
    /// registrations removed.
    pub fn clear_listeners(&self) -> usize {
        let mut listeners = self.listeners.lock();
        let live = listeners
            .iter()
            .filter(|stored| stored.upgrade().is_some())
            .count();
        listeners.clear();
        live
    }

    /// Number of live listener registrations.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|stored| stored.upgrade().is_some())
            .count()
    }

    // =========================================================================
    // Upstream Events
    // =========================================================================

    /// Chain an upstream event: it fires to completion before this event's
    /// own listeners whenever this event triggers.
    /// Returns true on success, false if already chained.
    pub fn add_upstream_event(&self, upstream: Arc<Event>) -> bool {
        let mut list = self.upstream.lock();
        if list.iter().any(|e| Arc::ptr_eq(e, &upstream)) {
            tracing::warn!(
                "Event '{}' is already upstream of '{}'",
                upstream.name(),
                self.name()
            );
            return false;
        }

        tracing::debug!(
            "Event '{}' chained upstream of '{}'",
            upstream.name(),
            self.name()
        );
        list.push(upstream);
        true
    }

    /// Unchain an upstream event. Returns true if it was chained.
    pub fn remove_upstream_event(&self, upstream: &Arc<Event>) -> bool {
        let mut list = self.upstream.lock();
        let before = list.len();
        list.retain(|e| !Arc::ptr_eq(e, upstream));
        list.len() < before
    }

    /// Number of chained upstream events.
    pub fn upstream_count(&self) -> usize {
        self.upstream.lock().len()
    }

    // =========================================================================
    // Triggering
    // =========================================================================

    /// Whether a trigger cycle is currently executing.
    pub fn is_triggering(&self) -> bool {
        self.triggering.load(Ordering::SeqCst)
    }

    /// Fire the event.
    ///
    /// Re-triggering while a cycle is executing is a logged no-op, which also
    /// terminates upstream cycles. Triggering off the main execution thread
    /// is logged but proceeds. Upstream events fire depth-first to completion
    /// first; then the listener list is snapshotted and each listener that is
    /// still registered at its turn is invoked. Listeners added during the
    /// cycle wait for the next trigger. The triggering guard is released even
    /// if a listener panics.
    pub fn trigger(&self) {
        if self.triggering.swap(true, Ordering::SeqCst) {
            if let Some(index) = self.index.upgrade() {
                index.stats.lock().reentrant_triggers_suppressed += 1;
            }
            tracing::warn!(
                "Event '{}' triggered while already executing; listeners not notified",
                self.name()
            );
            return;
        }
        // Cleared on every exit path, including an unwinding callback
        let _reset = TriggerReset(&self.triggering);

        if !self.threads.is_main_execution_thread() {
            if let Some(index) = self.index.upgrade() {
                index.stats.lock().off_thread_triggers += 1;
            }
            tracing::warn!("Event '{}' triggered off the main execution thread", self.name());
        }

        let upstream = self.upstream.lock().clone();
        for event in upstream {
            event.trigger();
        }

        let snapshot = self.listeners.lock().clone();
        let mut notified = 0u64;
        for stored in snapshot {
            let Some(listener) = stored.upgrade() else { continue };

            // Honor deregistration that happened earlier in this cycle
            let still_registered = self
                .listeners
                .lock()
                .iter()
                .any(|current| same_listener(current, &listener));
            if !still_registered {
                continue;
            }

            listener.on_event(self);
            notified += 1;
        }

        if let Some(index) = self.index.upgrade() {
            let mut stats = index.stats.lock();
            stats.triggers += 1;
            stats.listener_notifications += notified;
        }

        tracing::debug!("Event '{}' notified {} listeners", self.name(), notified);
    }
}

/// Clears the triggering flag when dropped, so an unwinding listener cannot
/// leave the event permanently suppressed.
struct TriggerReset<'a>(&'a AtomicBool);

impl Drop for TriggerReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name())
            .field("aliases", &self.names.lock().len())
            .field("listeners", &self.listeners.lock().len())
            .field("upstream", &self.upstream.lock().len())
            .field("triggering", &self.is_triggering())
            .finish()
    }
}
