//! Edgelb Core - Shared domain types and service infrastructure
//!
//! This crate provides:
//! - Load balancer domain types shared across the platform
//! - The observer event taxonomy pushed to live sessions
//! - Error handling utilities
//! - Standard service trait and microservice runtime

pub mod domain;
pub mod error;
pub mod events;
pub mod service;

pub use domain::{
    ActiveWorkflowRecord, HealthCheckConfig, HealthRecord, LoadBalancerConfig,
    LoadBalancerListing, RoutingExpression,
};
pub use error::{EdgelbError, Result};
pub use events::{ObserverEvent, WorkflowStatusEvent};
pub use service::{
    DependencyStatus, EdgelbService, HealthStatus, MicroserviceRuntime, ReadinessStatus,
};
