//! # Axon Core - Application Kernel
//!
//! Rust implementation of the Axon application kernel providing:
//! - Service lifecycle orchestration (initialize / bind / tear down phases)
//! - A named dependency registry for cross-module object lookup
//! - A multi-alias event bus with deterministic notification ordering
//! - A deferred task queue with main-thread execution affinity
//! - Thread registration for orderly shutdown waiting
//!
//! ## Architecture
//!
//! The kernel follows a single-context model where the `Kernel` owns all shared state:
//! ```text
//!                     ┌─────────────────────────────────┐
//!   embedding app  →  │             Kernel              │
//!                     │  ┌─────────┐ ┌─────────┐        │
//!                     │  │ Service │ │  Event  │        │
//!                     │  │Container│ │   Bus   │        │
//!                     │  └─────────┘ └─────────┘        │
//!                     │  ┌─────────┐ ┌─────────┐        │
//!                     │  │  Task   │ │ Thread  │        │
//!                     │  │  Queue  │ │Registry │        │
//!                     │  └─────────┘ └─────────┘        │
//!                     └─────────────────────────────────┘
//! ```
//!
//! Concurrency follows a single-mutator convention: one designated "main
//! execution thread" drains the task queue and mutates the service/event
//! graph, while any other thread hands mutations over via `schedule_task`.
//! The kernel enforces the convention by rejecting off-thread drains and
//! warning on off-thread event triggers, not by per-object locking around
//! user callbacks.

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod events;
pub mod kernel;
pub mod types;

// Internal utilities
pub mod observability;

pub use events::{Event, EventBus, EventListener};
pub use kernel::services::Service;
pub use kernel::tasks::Task;
pub use kernel::threads::ThreadRegistry;
pub use kernel::Kernel;
pub use types::{Config, Error, Result};
