use super::types::{ProviderId, ResourceKind};
use k8s_openapi::serde_json;
use thiserror::Error;

/// Failure delivered through a metric promise.
///
/// Cloneable so one failed backend request can be handed to every selector it
/// was serving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricError {
    /// A derived resource could not be mapped to native resources
    #[error("cannot resolve resource: {0}")]
    Resolution(String),

    #[error("derivation of {kind} into {target} is not supported")]
    UnsupportedDerivation {
        kind: ResourceKind,
        target: ResourceKind,
    },

    #[error("{provider} has no metrics for resources of kind {kind}")]
    UnsupportedResource {
        kind: ResourceKind,
        provider: ProviderId,
    },

    #[error("metrics backend request failed: {0}")]
    Transport(String),

    #[error("malformed metrics response: {0}")]
    Decode(String),

    #[error("cannot get metrics for {resource}")]
    MissingMetrics { resource: String },

    /// The task owning the promise went away without resolving it
    #[error("metric promise was dropped before being resolved")]
    Abandoned,
}

impl From<reqwest::Error> for MetricError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<kube::Error> for MetricError {
    fn from(e: kube::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for MetricError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
