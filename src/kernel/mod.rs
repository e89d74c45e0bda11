//! Kernel - the application core context object.
//!
//! The Kernel owns all shared state: the service container, the event bus,
//! the deferred task queue, and the thread registry. Subsystems are plain
//! structs owned by the Kernel, not separate actors; embedders share the
//! Kernel itself as `Arc<Kernel>` and every subsystem is safe to call
//! through `&self`.
//!
//! There is no hidden global instance. An application constructs exactly one
//! Kernel, passes it to every collaborator, and calls `reset` when it wants
//! the destroy-and-recreate cycle of a fresh core.

pub mod services;
pub mod tasks;
pub mod threads;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::events::{BusStats, Event, EventBus, EventListener};
use crate::types::Config;

use self::services::{ContainerStats, Service, ServiceContainer};
use self::tasks::{QueueStats, Task, TaskQueue};
use self::threads::ThreadRegistry;

/// Fired after every service ran its initialization phase, pass or fail.
pub const EVENT_INITIALIZATION_COMPLETED: &str = "kernel.initialization_completed";

/// Fired after every service ran its bind phase.
pub const EVENT_BIND_COMPLETED: &str = "kernel.bind_completed";

/// Fired when the kernel begins shutting down, after service teardown.
pub const EVENT_SHUTDOWN: &str = "kernel.shutdown";

/// Aggregate statistics across every kernel subsystem.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct KernelStats {
    pub services: ContainerStats,
    pub events: BusStats,
    pub tasks: QueueStats,
    pub registered_threads: usize,
}

// =============================================================================
// Kernel
// =============================================================================

/// The application core.
///
/// Drives the service lifecycle (`run_startup` / `run_shutdown`), owns the
/// event bus and the deferred task queue, and tracks the main execution
/// thread. All lifecycle errors surface as booleans plus log output; the
/// kernel itself never panics over misuse.
pub struct Kernel {
    services: ServiceContainer,
    events: EventBus,
    tasks: TaskQueue,
    threads: Arc<ThreadRegistry>,

    /// Latched by a fully successful startup.
    initialized: AtomicBool,

    /// Set when `run_shutdown` begins; stays set until `reset`.
    shutting_down: AtomicBool,

    /// Idempotence guard for `run_shutdown`, set as its first action.
    shutdown_complete: AtomicBool,

    config: Config,
}

impl Kernel {
    /// Create a kernel with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a kernel with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let threads = Arc::new(ThreadRegistry::new());
        let kernel = Self {
            services: ServiceContainer::new(),
            events: EventBus::new(Arc::clone(&threads)),
            tasks: TaskQueue::new(Arc::clone(&threads), config.tasks.clone()),
            threads,
            initialized: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            shutdown_complete: AtomicBool::new(false),
            config,
        };
        kernel.create_builtin_events();
        kernel
    }

    /// Built-in events exist from construction so listeners can subscribe
    /// through `register_for_event` before startup.
    fn create_builtin_events(&self) {
        self.events.create_event(
            EVENT_INITIALIZATION_COMPLETED,
            "All services ran their initialization phase",
        );
        self.events.create_event(
            EVENT_BIND_COMPLETED,
            "All services ran their bind phase",
        );
        self.events
            .create_event(EVENT_SHUTDOWN, "The kernel is shutting down");
    }

    fn trigger_builtin(&self, name: &str) {
        match self.events.get_event(name, false) {
            Some(event) => event.trigger(),
            None => tracing::warn!("Built-in event '{}' is missing; skipping trigger", name),
        }
    }

    // =========================================================================
    // Startup and Shutdown
    // =========================================================================

    /// Drive every registered service through initialize and bind.
    ///
    /// The calling thread becomes the main execution thread. Every service
    /// gets its chance at each phase even when an earlier one fails; the
    /// initialization-completed event fires regardless of the outcome, while
    /// the bind phase (and its event) only runs if all initialization
    /// succeeded. Returns the conjunction of all phase results.
    pub fn run_startup(&self) -> bool {
        if self.initialized.load(Ordering::SeqCst) {
            tracing::warn!("Startup refused: kernel is already initialized");
            return false;
        }
        if self.shutdown_complete.load(Ordering::SeqCst) {
            tracing::warn!("Startup refused: kernel was shut down; call reset() first");
            return false;
        }

        tracing::info!(
            "Kernel startup: {} services registered",
            self.services.service_count()
        );
        self.threads.set_main_execution_thread();

        let init_ok = self.services.initialize_all();
        self.trigger_builtin(EVENT_INITIALIZATION_COMPLETED);
        if !init_ok {
            tracing::error!("Startup aborted: one or more services failed to initialize");
            return false;
        }

        let bind_ok = self.services.bind_all();
        self.trigger_builtin(EVENT_BIND_COMPLETED);
        if !bind_ok {
            tracing::error!("Startup failed: one or more services failed to bind");
            return false;
        }

        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!("Kernel startup complete");
        true
    }

    /// Tear every service down and notify shutdown observers.
    ///
    /// Idempotent: only the first call does anything, later calls return
    /// false. Teardown runs over a snapshot in registration order, then the
    /// shutdown event fires, then every listener registration on every event
    /// is released. The kernel stops reporting initialized once shutdown
    /// completes. Safe to call after a failed startup.
    pub fn run_shutdown(&self) -> bool {
        if self.shutdown_complete.swap(true, Ordering::SeqCst) {
            tracing::debug!("Shutdown already completed; ignoring repeat call");
            return false;
        }
        self.shutting_down.store(true, Ordering::SeqCst);
        tracing::info!("Kernel shutting down");

        let ok = self.services.tear_down_all();
        self.trigger_builtin(EVENT_SHUTDOWN);
        self.events.detach_all_listeners();
        self.initialized.store(false, Ordering::SeqCst);

        if ok {
            tracing::info!("Kernel shutdown complete");
        } else {
            tracing::error!("Kernel shutdown completed with teardown failures");
        }
        ok
    }

    /// True from a fully successful startup until shutdown completes.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// True from the moment `run_shutdown` begins.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Restore the pristine just-constructed state.
    ///
    /// Runs `run_shutdown` first if it has not completed, then destroys
    /// pending tasks without running them, drops every event and service,
    /// clears the thread table and main-thread designation, resets the
    /// lifecycle flags, and recreates the built-in events. The same instance
    /// can then run a fresh startup.
    pub fn reset(&self) {
        if !self.shutdown_complete.load(Ordering::SeqCst) {
            self.run_shutdown();
        }

        self.tasks.clear_pending_tasks();
        self.events.clear();
        self.services.clear();
        self.threads.clear_main_execution_thread();
        self.threads.clear_threads();

        self.initialized.store(false, Ordering::SeqCst);
        self.shutting_down.store(false, Ordering::SeqCst);
        self.shutdown_complete.store(false, Ordering::SeqCst);

        self.create_builtin_events();
        tracing::info!("Kernel reset to pristine state");
    }

    // =========================================================================
    // Service Delegates
    // =========================================================================

    /// Register a service. See [`ServiceContainer::add_service`].
    pub fn add_service(&self, service: Arc<dyn Service>) -> bool {
        self.services.add_service(service)
    }

    /// Deregister a service. See [`ServiceContainer::remove_service`].
    pub fn remove_service(&self, service: &Arc<dyn Service>) -> bool {
        self.services.remove_service(service)
    }

    /// Register a service under a process-unique global name.
    pub fn add_global_object(&self, name: &str, service: Arc<dyn Service>) -> bool {
        self.services.add_global_object(name, service)
    }

    /// Remove a global name mapping without deregistering the service.
    pub fn remove_global_object(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.remove_global_object(name)
    }

    /// Look a service up by global name.
    pub fn get_global_object(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.get_global_object(name)
    }

    /// All registered global names.
    pub fn get_global_object_names(&self) -> Vec<String> {
        self.services.get_global_object_names()
    }

    // =========================================================================
    // Event Delegates
    // =========================================================================

    /// Create an event. See [`EventBus::create_event`].
    pub fn create_event(&self, name: &str, description: &str) -> Option<Arc<Event>> {
        self.events.create_event(name, description)
    }

    /// Look an event up by name. See [`EventBus::get_event`].
    pub fn get_event(&self, name: &str, create_if_missing: bool) -> Option<Arc<Event>> {
        self.events.get_event(name, create_if_missing)
    }

    /// Register a listener with a named event. See
    /// [`EventBus::register_for_event`].
    pub fn register_for_event(
        &self,
        name: &str,
        listener: &Arc<dyn EventListener>,
        warn_if_missing: bool,
    ) -> Option<Arc<Event>> {
        self.events.register_for_event(name, listener, warn_if_missing)
    }

    /// Deregister a listener from a named event.
    pub fn deregister_from_event(&self, name: &str, listener: &Arc<dyn EventListener>) -> bool {
        self.events.deregister_from_event(name, listener)
    }

    // =========================================================================
    // Task Delegates
    // =========================================================================

    /// Schedule a deferred task. See [`TaskQueue::schedule_task`].
    pub fn schedule_task(&self, task: Arc<dyn Task>) -> bool {
        self.tasks.schedule_task(task)
    }

    /// Drain the task queue on the main execution thread. See
    /// [`TaskQueue::execute_pending_tasks`].
    pub fn execute_pending_tasks(&self) -> usize {
        self.tasks.execute_pending_tasks()
    }

    /// Snapshot of the queued tasks.
    pub fn get_pending_tasks(&self) -> Vec<Arc<dyn Task>> {
        self.tasks.get_pending_tasks()
    }

    /// Destroy queued tasks without running them.
    pub fn clear_pending_tasks(&self) -> usize {
        self.tasks.clear_pending_tasks()
    }

    // =========================================================================
    // Thread Delegates
    // =========================================================================

    /// Designate the calling thread as the main execution thread.
    pub fn set_main_execution_thread(&self) {
        self.threads.set_main_execution_thread();
    }

    /// Remove the main execution thread designation.
    pub fn clear_main_execution_thread(&self) {
        self.threads.clear_main_execution_thread();
    }

    /// Whether the calling thread may mutate shared state.
    pub fn is_main_execution_thread(&self) -> bool {
        self.threads.is_main_execution_thread()
    }

    /// Register a spawned worker for shutdown waiting.
    pub fn register_thread(&self, handle: std::thread::JoinHandle<()>) -> bool {
        self.threads.register_thread(handle)
    }

    /// Deregister a worker by id.
    pub fn deregister_thread(&self, id: std::thread::ThreadId) -> bool {
        self.threads.deregister_thread(id)
    }

    /// Join every registered worker thread.
    pub fn wait_for_all_threads_to_complete(&self) -> usize {
        self.threads.wait_for_all_threads_to_complete()
    }

    // =========================================================================
    // Subsystem Access
    // =========================================================================

    /// The event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The deferred task queue.
    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    /// The thread registry.
    pub fn threads(&self) -> &Arc<ThreadRegistry> {
        &self.threads
    }

    /// The service container.
    pub fn services(&self) -> &ServiceContainer {
        &self.services
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Aggregate statistics across all subsystems.
    pub fn get_stats(&self) -> KernelStats {
        KernelStats {
            services: self.services.get_stats(),
            events: self.events.get_stats(),
            tasks: self.tasks.get_stats(),
            registered_threads: self.threads.thread_count(),
        }
    }

    /// Reset statistics counters across all subsystems.
    pub fn reset_stats(&self) {
        self.events.reset_stats();
        self.tasks.reset_stats();
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        if self.initialized.load(Ordering::SeqCst) && !self.shutdown_complete.load(Ordering::SeqCst)
        {
            tracing::warn!("Kernel dropped without run_shutdown; services were not torn down");
        }
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("services", &self.services.service_count())
            .field("events", &self.events.event_count())
            .field("pending_tasks", &self.tasks.pending_count())
            .field("initialized", &self.is_initialized())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
