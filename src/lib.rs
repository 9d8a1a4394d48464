//! Metric downloads for Kubernetes resources.
//!
//! Selectors for pods, nodes or derived workloads (deployments, replica sets,
//! ...) are resolved to native resources, merged by backend path, fetched
//! concurrently and handed back as promises in request order.
pub mod error;
pub mod k8s;
