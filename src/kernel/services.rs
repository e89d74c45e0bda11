//! Service lifecycle container and named dependency registry.
//!
//! Features:
//!   - Ordered service registration (registration order == phase order)
//!   - Named global objects for cross-service lookup
//!   - Phase drivers for initialize / bind / tear_down
//!
//! Teardown deliberately runs in registration order, not reverse: services
//! constructed first are torn down first. Phase drivers iterate a snapshot,
//! so a service may deregister itself (or a peer) mid-phase without
//! corrupting the iteration; snapshotted services still get their phase call.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A kernel-managed component with a three-phase lifecycle.
///
/// Phase methods take `&self`; services keep their own state behind interior
/// mutability. A phase returns false to report failure; the container logs
/// the offender and keeps going.
pub trait Service: Send + Sync {
    /// Stable name used in logs and the named dependency registry.
    fn name(&self) -> &str;

    /// First startup phase: acquire resources, no cross-service calls yet.
    fn initialize(&self) -> bool;

    /// Second startup phase: resolve references to other services.
    /// Runs only when every service initialized successfully.
    fn bind(&self) -> bool;

    /// Shutdown phase: release resources.
    fn tear_down(&self) -> bool;
}

// =============================================================================
// Service Container
// =============================================================================

/// ServiceContainer owns every registered service and drives its lifecycle.
///
/// Identity is the service instance (`Arc::ptr_eq`), so two services may
/// share a display name. The container holds the owning reference: dropping
/// a service happens when it is removed or the container is cleared and no
/// embedder clone remains.
pub struct ServiceContainer {
    /// Registered services in registration order.
    services: Mutex<Vec<Arc<dyn Service>>>,

    /// Named dependency registry: process-unique name -> service.
    globals: Mutex<HashMap<String, Arc<dyn Service>>>,
}

/// Container statistics.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ContainerStats {
    pub registered_services: usize,
    pub global_objects: usize,
}

impl ServiceContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self {
            services: Mutex::new(Vec::new()),
            globals: Mutex::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Service Registration
    // =========================================================================

    /// Register a service at the end of the lifecycle order.
    /// Returns true if registration succeeded, false if the instance is
    /// already registered.
    pub fn add_service(&self, service: Arc<dyn Service>) -> bool {
        let mut services = self.services.lock();

        if services.iter().any(|s| Arc::ptr_eq(s, &service)) {
            tracing::warn!("Service '{}' is already registered", service.name());
            return false;
        }

        tracing::debug!("Registered service '{}'", service.name());
        services.push(service);
        true
    }

    /// Remove a service from the lifecycle order and from every global name
    /// that points at it. Returns true if the instance was registered.
    pub fn remove_service(&self, service: &Arc<dyn Service>) -> bool {
        let mut services = self.services.lock();
        let before = services.len();
        services.retain(|s| !Arc::ptr_eq(s, service));

        if services.len() == before {
            return false;
        }

        self.globals.lock().retain(|_, s| !Arc::ptr_eq(s, service));
        tracing::debug!("Removed service '{}'", service.name());
        true
    }

    /// Check whether a service instance is registered.
    pub fn is_registered(&self, service: &Arc<dyn Service>) -> bool {
        self.services.lock().iter().any(|s| Arc::ptr_eq(s, service))
    }

    /// Snapshot of the registered services in registration order.
    pub fn get_services(&self) -> Vec<Arc<dyn Service>> {
        self.services.lock().clone()
    }

    /// Number of registered services.
    pub fn service_count(&self) -> usize {
        self.services.lock().len()
    }

    // =========================================================================
    // Named Dependency Registry
    // =========================================================================

    /// Publish a service under a process-unique name, registering the service
    /// first if it is not yet registered.
    /// Returns true if the name was free, false if it is already taken.
    pub fn add_global_object(&self, name: &str, service: Arc<dyn Service>) -> bool {
        let mut services = self.services.lock();
        let mut globals = self.globals.lock();

        if globals.contains_key(name) {
            tracing::warn!("Global object name '{}' is already taken", name);
            return false;
        }

        if !services.iter().any(|s| Arc::ptr_eq(s, &service)) {
            tracing::debug!("Registered service '{}'", service.name());
            services.push(Arc::clone(&service));
        }

        globals.insert(name.to_string(), service);
        tracing::debug!("Registered global object '{}'", name);
        true
    }

    /// Unmap a global name. The service itself stays registered and owned by
    /// the container. Returns the service that was mapped, if any.
    pub fn remove_global_object(&self, name: &str) -> Option<Arc<dyn Service>> {
        let removed = self.globals.lock().remove(name);

        if let Some(service) = &removed {
            tracing::debug!(
                "Removed global object '{}' (service '{}' stays registered)",
                name,
                service.name()
            );
        }
        removed
    }

    /// Look up a service by global name.
    pub fn get_global_object(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.globals.lock().get(name).cloned()
    }

    /// All registered global names.
    pub fn get_global_object_names(&self) -> Vec<String> {
        self.globals.lock().keys().cloned().collect()
    }

    // =========================================================================
    // Phase Drivers
    // =========================================================================

    /// Run `initialize` on every service in registration order.
    /// Failures are logged and do not stop the pass. Returns the conjunction.
    pub fn initialize_all(&self) -> bool {
        let mut all_ok = true;
        for service in self.get_services() {
            if service.initialize() {
                tracing::debug!("Service '{}' initialized", service.name());
            } else {
                tracing::error!("Service '{}' failed to initialize", service.name());
                all_ok = false;
            }
        }
        all_ok
    }

    /// Run `bind` on every service in registration order.
    /// Failures are logged and do not stop the pass. Returns the conjunction.
    pub fn bind_all(&self) -> bool {
        let mut all_ok = true;
        for service in self.get_services() {
            if service.bind() {
                tracing::debug!("Service '{}' bound", service.name());
            } else {
                tracing::error!("Service '{}' failed to bind", service.name());
                all_ok = false;
            }
        }
        all_ok
    }

    /// Run `tear_down` on every service, in registration order over a
    /// snapshot taken up front. Returns the conjunction.
    pub fn tear_down_all(&self) -> bool {
        let mut all_ok = true;
        for service in self.get_services() {
            if service.tear_down() {
                tracing::debug!("Service '{}' torn down", service.name());
            } else {
                tracing::error!("Service '{}' failed to tear down", service.name());
                all_ok = false;
            }
        }
        all_ok
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Drop every service and global name.
    pub fn clear(&self) {
        let mut services = self.services.lock();
        let mut globals = self.globals.lock();

        globals.clear();
        let dropped = services.len();
        services.clear();

        if dropped > 0 {
            tracing::debug!("Dropped {} services", dropped);
        }
    }

    /// Get container statistics.
    pub fn get_stats(&self) -> ContainerStats {
        ContainerStats {
            registered_services: self.services.lock().len(),
            global_objects: self.globals.lock().len(),
        }
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("services", &self.services.lock().len())
            .field("globals", &self.globals.lock().len())
            .finish()
    }
}
