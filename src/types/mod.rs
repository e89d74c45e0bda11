//! Core types for the Axon kernel.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (TaskId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for observability and the task queue

mod config;
mod errors;
mod ids;

pub use config::{Config, ObservabilityConfig, TaskQueueConfig};
pub use errors::{Error, Result};
pub use ids::TaskId;
