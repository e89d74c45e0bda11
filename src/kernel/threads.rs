//! Thread registry and main-execution-thread designation.
//!
//! Features:
//!   - Bookkeeping for worker threads the embedding application spawns
//!   - Designation of a single "main execution thread"
//!   - Join-all support for orderly shutdown
//!
//! Thread-affine operations (task draining, event triggering) consult the
//! designation. When no thread is designated, every thread counts as main:
//! an undesignated kernel never rejects work.

use parking_lot::Mutex;
use std::thread::{self, JoinHandle, ThreadId};

/// Entry for a known thread. A handle-less entry is known but not joinable
/// (e.g. the self-registered main thread).
#[derive(Debug)]
struct ThreadEntry {
    id: ThreadId,
    handle: Option<JoinHandle<()>>,
}

// =============================================================================
// Thread Registry
// =============================================================================

/// ThreadRegistry tracks application threads and the main-thread designation.
///
/// All methods are safe to call from any thread; the registry lock is never
/// held while joining.
#[derive(Debug)]
pub struct ThreadRegistry {
    /// Known threads in registration order.
    threads: Mutex<Vec<ThreadEntry>>,

    /// Currently designated main execution thread, if any.
    main_thread: Mutex<Option<ThreadId>>,
}

impl ThreadRegistry {
    /// Create a new registry with no known threads and no designation.
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(Vec::new()),
            main_thread: Mutex::new(None),
        }
    }

    // =========================================================================
    // Thread Registration
    // =========================================================================

    /// Register a spawned thread for later joining.
    /// Returns true if registration succeeded, false if the thread is already known.
    pub fn register_thread(&self, handle: JoinHandle<()>) -> bool {
        let id = handle.thread().id();
        let mut threads = self.threads.lock();

        if threads.iter().any(|entry| entry.id == id) {
            tracing::debug!("Thread {:?} already registered", id);
            return false;
        }

        threads.push(ThreadEntry {
            id,
            handle: Some(handle),
        });

        tracing::debug!("Registered thread {:?}", id);
        true
    }

    /// Register the calling thread without a join handle.
    /// Returns true if registration succeeded, false if the thread is already known.
    pub fn register_current_thread(&self) -> bool {
        let id = thread::current().id();
        let mut threads = self.threads.lock();

        if threads.iter().any(|entry| entry.id == id) {
            return false;
        }

        threads.push(ThreadEntry { id, handle: None });

        tracing::debug!("Registered current thread {:?}", id);
        true
    }

    /// Deregister a thread, detaching its join handle if one was stored.
    /// Returns true if the thread was known. Safe to call repeatedly.
    pub fn deregister_thread(&self, id: ThreadId) -> bool {
        let mut threads = self.threads.lock();
        let before = threads.len();
        threads.retain(|entry| entry.id != id);

        let removed = threads.len() < before;
        if removed {
            tracing::debug!("Deregistered thread {:?}", id);
        }
        removed
    }

    /// Number of known threads.
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    /// Forget every known thread without joining. Stored join handles are
    /// dropped, detaching those threads. Returns the number of entries removed.
    pub fn clear_threads(&self) -> usize {
        let mut threads = self.threads.lock();
        let removed = threads.len();
        threads.clear();

        if removed > 0 {
            tracing::debug!("Cleared {} registered threads", removed);
        }
        removed
    }

    // =========================================================================
    // Main Execution Thread
    // =========================================================================

    /// Designate the calling thread as the main execution thread.
    ///
    /// The calling thread is registered (handle-less) if not already known.
    pub fn set_main_execution_thread(&self) {
        let id = thread::current().id();
        self.register_current_thread();

        let mut main_thread = self.main_thread.lock();
        if let Some(previous) = *main_thread {
            if previous != id {
                tracing::debug!(
                    "Main execution thread changed from {:?} to {:?}",
                    previous,
                    id
                );
            }
        }
        *main_thread = Some(id);

        tracing::debug!("Designated main execution thread {:?}", id);
    }

    /// Remove the main-thread designation. Every thread counts as main again.
    pub fn clear_main_execution_thread(&self) {
        *self.main_thread.lock() = None;
        tracing::debug!("Cleared main execution thread designation");
    }

    /// Check whether the calling thread is the main execution thread.
    ///
    /// True when the caller is the designated thread, or when no thread has
    /// been designated at all.
    pub fn is_main_execution_thread(&self) -> bool {
        match *self.main_thread.lock() {
            Some(id) => id == thread::current().id(),
            None => true,
        }
    }

    /// Currently designated main execution thread, if any.
    pub fn main_thread_id(&self) -> Option<ThreadId> {
        *self.main_thread.lock()
    }

    // =========================================================================
    // Join-All
    // =========================================================================

    /// Join every registered thread that has a join handle.
    ///
    /// Handles are taken out of the registry before joining so the lock is
    /// not held while waiting. Handle-less entries are cleared as well. A
    /// panicked thread is logged and does not abort the join loop. Returns
    /// the number of threads joined.
    pub fn wait_for_all_threads_to_complete(&self) -> usize {
        let entries = std::mem::take(&mut *self.threads.lock());
        let current = thread::current().id();
        let mut joined = 0;

        for entry in entries {
            let Some(handle) = entry.handle else { continue };

            // Joining our own handle would never return.
            if entry.id == current {
                continue;
            }

            match handle.join() {
                Ok(()) => joined += 1,
                Err(payload) => {
                    let msg = payload
                        .downcast_ref::<&str>()
                        .copied()
                        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                        .unwrap_or("unknown panic");
                    tracing::error!("Thread {:?} panicked: {}", entry.id, msg);
                    joined += 1;
                }
            }
        }

        tracing::debug!("Joined {} registered threads", joined);
        joined
    }
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}
