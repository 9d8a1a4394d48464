/**
 * Configuration constants and construction of metric clients
 */
use super::client::{MetricClient, PipelineClient};
use super::heapster::Heapster;
use super::resolve::DerivationTable;
use super::sidecar::Sidecar;
use super::transport::{RawClient, RemoteClient, ServiceProxyClient};
use super::types::{ProviderId, ResourceKind};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Path probed by `MetricClient::health_check`
pub const DEFAULT_HEALTH_PATH: &str = "/healthz";

/// In-cluster location of heapster
pub const HEAPSTER_NAMESPACE: &str = "kube-system";
pub const HEAPSTER_SERVICE: &str = "heapster";

/// In-cluster location of the metrics scraper sidecar
pub const SIDECAR_NAMESPACE: &str = "kubernetes-dashboard";
pub const SIDECAR_SERVICE: &str = "dashboard-metrics-scraper";

/// Environment variable overriding the user agent sent to backends
pub const USER_AGENT_ENV: &str = "KUBEMETRICS_USER_AGENT";

pub const CPU_USAGE_RATE: &str = "cpu/usage_rate";
pub const MEMORY_USAGE: &str = "memory/usage";

/// Metrics fetched when the caller names none
pub const DEFAULT_METRIC_NAMES: [&str; 2] = [CPU_USAGE_RATE, MEMORY_USAGE];

/// Which resource kinds a backend can serve in one request for many resources.
#[derive(Debug, Clone)]
pub struct DownloadPolicy {
    all_in_one: HashMap<ResourceKind, bool>,
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        Self {
            all_in_one: HashMap::from([(ResourceKind::Pod, true), (ResourceKind::Node, false)]),
        }
    }
}

impl DownloadPolicy {
    #[must_use]
    pub fn with_kind(mut self, kind: ResourceKind, all_in_one: bool) -> Self {
        self.all_in_one.insert(kind, all_in_one);
        self
    }

    /// Unlisted kinds are downloaded one resource at a time.
    #[must_use]
    pub fn supports_all_in_one(&self, kind: ResourceKind) -> bool {
        self.all_in_one.get(&kind).copied().unwrap_or(false)
    }
}

/// Where backend requests go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Direct URL, e.g. `http://heapster.example:8082`
    Remote { base_url: String },
    /// Through the API server's service proxy
    ServiceProxy { namespace: String, service: String },
}

impl Endpoint {
    /// The in-cluster service a provider is usually deployed as
    #[must_use]
    pub fn in_cluster(provider: ProviderId) -> Self {
        let (namespace, service) = match provider {
            ProviderId::Heapster => (HEAPSTER_NAMESPACE, HEAPSTER_SERVICE),
            ProviderId::Sidecar => (SIDECAR_NAMESPACE, SIDECAR_SERVICE),
        };
        Self::ServiceProxy {
            namespace: namespace.to_string(),
            service: service.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub provider: ProviderId,
    pub endpoint: Endpoint,
    pub health_path: String,
    pub user_agent: String,
    pub download_policy: DownloadPolicy,
    pub derivations: DerivationTable,
}

impl MetricsConfig {
    #[must_use]
    pub fn new(provider: ProviderId, endpoint: Endpoint) -> Self {
        Self {
            provider,
            endpoint,
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            user_agent: user_agent(),
            download_policy: DownloadPolicy::default(),
            derivations: DerivationTable::default(),
        }
    }
}

/// User agent for backend requests, `KUBEMETRICS_USER_AGENT` when set
#[must_use]
pub fn user_agent() -> String {
    std::env::var(USER_AGENT_ENV).unwrap_or_else(|_| crate::k8s::USER_AGENT.to_string())
}

/// Builds the client described by `config`.
///
/// # Errors
///
/// Returns `Err` if the HTTP client cannot be built, or if a service proxy
/// endpoint is configured without a kube client.
pub fn connect(config: &MetricsConfig, kube: Option<kube::Client>) -> Result<Box<dyn MetricClient>> {
    let raw: Arc<dyn RawClient> = match &config.endpoint {
        Endpoint::Remote { base_url } => {
            info!("Using {} at {}", config.provider, base_url);
            Arc::new(RemoteClient::new(base_url, &config.user_agent)?)
        }
        Endpoint::ServiceProxy { namespace, service } => {
            let client = kube.ok_or_else(|| {
                Error::Custom(format!(
                    "service proxy to {namespace}/{service} needs a kubernetes client"
                ))
            })?;
            info!(
                "Using {} through service proxy {}/{}",
                config.provider, namespace, service
            );
            Arc::new(ServiceProxyClient::new(client, namespace, service))
        }
    };

    Ok(match config.provider {
        ProviderId::Heapster => Box::new(PipelineClient::new(raw, Heapster, config)),
        ProviderId::Sidecar => Box::new(PipelineClient::new(raw, Sidecar, config)),
    })
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(!DEFAULT_HEALTH_PATH.is_empty(), "DEFAULT_HEALTH_PATH must not be empty");
    assert!(!HEAPSTER_SERVICE.is_empty(), "HEAPSTER_SERVICE must not be empty");
    assert!(!SIDECAR_SERVICE.is_empty(), "SIDECAR_SERVICE must not be empty");
};
