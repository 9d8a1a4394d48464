//! Time-series metrics for pods, nodes and the workloads built from them.
//!
//! ```text
//! selectors -> resolve -> compress -> fetch groups -> unpack -> promises
//!                                                        \-> aggregate
//! ```
pub mod aggregate;
pub mod client;
pub mod compress;
pub mod config;
pub mod errors;
pub mod heapster;
pub mod points;
pub mod promise;
pub mod resolve;
pub mod sidecar;
pub mod transport;
pub mod types;

pub use aggregate::{aggregate_data, aggregate_metric_promises};
pub use client::{MetricClient, PipelineClient, WireFormat};
pub use compress::{CompressedSelector, NativeSelector, ReverseMapping, compress};
pub use config::{DownloadPolicy, Endpoint, MetricsConfig, connect};
pub use errors::MetricError;
pub use heapster::Heapster;
pub use promise::{MetricPromise, MetricPromises, MetricResult, PromiseResolver};
pub use resolve::{CachedResources, Derivation, DerivationTable, ResolvedSelector, resolve};
pub use sidecar::Sidecar;
pub use transport::{RawClient, RemoteClient, ServiceProxyClient};
pub use types::{
    AggregationMode, DataPoint, Label, Metric, MetricPoint, ProviderId, ResourceKind,
    ResourceSelector,
};
