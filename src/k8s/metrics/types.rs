//! Data model shared by every stage of the metrics pipeline.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Resource kinds a selector can name.
///
/// `Pod` and `Node` are understood by the metric backends directly, the rest
/// are summed over the pods they own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pod,
    Node,
    Deployment,
    ReplicaSet,
    ReplicationController,
    DaemonSet,
    StatefulSet,
    Job,
}

impl ResourceKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pod => "pod",
            Self::Node => "node",
            Self::Deployment => "deployment",
            Self::ReplicaSet => "replicaset",
            Self::ReplicationController => "replicationcontroller",
            Self::DaemonSet => "daemonset",
            Self::StatefulSet => "statefulset",
            Self::Job => "job",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pod" | "pods" => Ok(Self::Pod),
            "node" | "nodes" => Ok(Self::Node),
            "deployment" | "deployments" => Ok(Self::Deployment),
            "replicaset" | "replicasets" => Ok(Self::ReplicaSet),
            "replicationcontroller" | "replicationcontrollers" => {
                Ok(Self::ReplicationController)
            }
            "daemonset" | "daemonsets" => Ok(Self::DaemonSet),
            "statefulset" | "statefulsets" => Ok(Self::StatefulSet),
            "job" | "jobs" => Ok(Self::Job),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}

/// A logical request for the metrics of one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSelector {
    pub namespace: String,
    pub resource_type: Option<ResourceKind>,
    pub resource_name: String,
    /// Label selector, only consulted for label-matched derivation
    pub selector: Option<BTreeMap<String, String>>,
    pub uid: String,
}

impl ResourceSelector {
    #[must_use]
    pub fn new(kind: ResourceKind, namespace: &str, name: &str, uid: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            resource_type: Some(kind),
            resource_name: name.to_string(),
            selector: None,
            uid: uid.to_string(),
        }
    }

    #[must_use]
    pub fn with_selector(mut self, selector: BTreeMap<String, String>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Kind of the selected resource, pods when unset
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.resource_type.unwrap_or(ResourceKind::Pod)
    }
}

/// Identity of the resources a metric was computed from, keyed by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label(BTreeMap<ResourceKind, Vec<String>>);

impl Label {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(kind: ResourceKind, uid: &str) -> Self {
        let mut label = Self::new();
        label.push(kind, uid);
        label
    }

    pub fn push(&mut self, kind: ResourceKind, uid: &str) {
        self.0.entry(kind).or_default().push(uid.to_string());
    }

    /// Appends every uid of `other`, keeping per-kind order.
    pub fn merge(&mut self, other: &Self) {
        for (kind, uids) in &other.0 {
            self.0.entry(*kind).or_default().extend(uids.iter().cloned());
        }
    }

    #[must_use]
    pub fn get(&self, kind: ResourceKind) -> &[String] {
        self.0.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

/// Raw sample as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: u64,
}

/// Normalized sample: epoch seconds and a non-negative value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    pub x: i64,
    pub y: i64,
}

/// A time series for one metric name over one or more resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub data_points: Vec<DataPoint>,
    /// Only filled when the metric describes a single resource
    pub metric_points: Vec<MetricPoint>,
    pub metric_name: String,
    pub label: Label,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregationMode>,
}

impl Metric {
    #[must_use]
    pub fn empty(metric_name: &str) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            ..Self::default()
        }
    }
}

/// Reduction applied to values sharing a timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    #[default]
    Sum,
    Min,
    Max,
}

impl AggregationMode {
    /// Lenient parse: unrecognized names fall back to the default mode.
    // TODO: decide whether an unknown mode should be reported to the caller once
    // the REST layer can surface validation errors.
    #[must_use]
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or_else(|()| {
            debug!("Unknown aggregation mode {:?}, using {}", name, Self::default());
            Self::default()
        })
    }

    /// Reduction function for this mode. An empty slice reduces to zero.
    #[must_use]
    pub fn reducer(self) -> fn(&[i64]) -> i64 {
        match self {
            Self::Sum => |values: &[i64]| values.iter().sum(),
            Self::Min => |values: &[i64]| values.iter().copied().min().unwrap_or(0),
            Self::Max => |values: &[i64]| values.iter().copied().max().unwrap_or(0),
        }
    }
}

impl FromStr for AggregationMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" | "default" | "" => Ok(Self::Sum),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sum => f.write_str("sum"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
        }
    }
}

/// Which backend a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Heapster,
    Sidecar,
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heapster => f.write_str("heapster"),
            Self::Sidecar => f.write_str("sidecar"),
        }
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "heapster" => Ok(Self::Heapster),
            "sidecar" => Ok(Self::Sidecar),
            other => Err(format!("unknown metrics provider: {other}")),
        }
    }
}
