//! Pod usage monitoring library
//!
//! This crate provides the core functionality for:
//! - Fetching pod/container usage from the Kubernetes metrics API
//! - Normalizing raw quantities into usage records
//! - Durable CSV and audit-log recording
//! - The fixed-interval poll scheduler
//! - The live view publisher and its rolling windows
//! - Health checks and observability

pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod normalizer;
pub mod observability;
pub mod publisher;
pub mod recorder;
pub mod scheduler;
pub mod source;

pub use config::MonitorConfig;
pub use error::{ConfigError, FetchError, MalformedDataError, MonitorError, PersistenceError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
