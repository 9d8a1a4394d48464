//! Dashboard metrics scraper ("sidecar") API.
//!
//! Every returned series names the resources it belongs to, so responses are
//! matched by identity and may arrive in any order.
use super::client::WireFormat;
use super::compress::CompressedSelector;
use super::errors::MetricError;
use super::points::{RawPoint, to_metric};
use super::promise::MetricResult;
use super::types::{Label, ProviderId, ResourceKind};
use k8s_openapi::serde_json;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

const PREFIX: &str = "/api/v1/dashboard";

#[derive(Debug, Clone, Copy, Default)]
pub struct Sidecar;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SidecarMetric {
    #[serde(default)]
    metric_points: Vec<RawPoint>,
    #[serde(default)]
    metric_name: String,
    /// Uids or names of the resources the series belongs to
    #[serde(default)]
    uids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SidecarMetricResultList {
    #[serde(default)]
    items: Vec<SidecarMetric>,
}

impl SidecarMetricResultList {
    /// Index of every series by each identity it carries.
    fn by_identity(&self) -> HashMap<&str, &SidecarMetric> {
        self.items
            .iter()
            .flat_map(|item| item.uids.iter().map(move |uid| (uid.as_str(), item)))
            .collect()
    }
}

fn lookup<'a>(
    index: &HashMap<&str, &'a SidecarMetric>,
    uid: &str,
    name: &str,
) -> Option<&'a SidecarMetric> {
    index.get(uid).or_else(|| index.get(name)).copied()
}

fn convert(
    item: &SidecarMetric,
    target: ResourceKind,
    uid: &str,
    metric_name: &str,
) -> MetricResult {
    if !item.metric_name.is_empty() && item.metric_name != metric_name {
        debug!(
            "Sidecar answered {} for requested {}",
            item.metric_name, metric_name
        );
    }
    Ok(to_metric(
        &item.metric_points,
        metric_name,
        Label::single(target, uid),
    ))
}

impl WireFormat for Sidecar {
    fn id(&self) -> ProviderId {
        ProviderId::Sidecar
    }

    fn path(&self, kind: ResourceKind, namespace: &str) -> Result<String, MetricError> {
        match kind {
            ResourceKind::Pod => Ok(format!("{PREFIX}/namespaces/{namespace}/pod-list/")),
            ResourceKind::Node => Ok(format!("{PREFIX}/nodes/")),
            _ => Err(MetricError::UnsupportedResource {
                kind,
                provider: ProviderId::Sidecar,
            }),
        }
    }

    fn decode_bulk(
        &self,
        body: &[u8],
        group: &CompressedSelector,
        metric_name: &str,
    ) -> Result<Vec<MetricResult>, MetricError> {
        let list: SidecarMetricResultList = serde_json::from_slice(body)?;
        if list.items.len() != group.resources.len() {
            warn!(
                "Sidecar returned {} series for {} requested resources",
                list.items.len(),
                group.resources.len()
            );
        }

        let index = list.by_identity();
        Ok(group
            .resources
            .iter()
            .enumerate()
            .map(|(position, resource)| {
                let uid = group.uid(position).unwrap_or(resource);
                lookup(&index, uid, resource).map_or_else(
                    || {
                        Err(MetricError::MissingMetrics {
                            resource: resource.clone(),
                        })
                    },
                    |item| convert(item, group.target, uid, metric_name),
                )
            })
            .collect())
    }

    fn decode_single(
        &self,
        body: &[u8],
        group: &CompressedSelector,
        index: usize,
        metric_name: &str,
    ) -> MetricResult {
        let resource = group
            .resources
            .get(index)
            .ok_or_else(|| MetricError::MissingMetrics {
                resource: format!("{} #{index}", group.target),
            })?;
        let uid = group.uid(index).unwrap_or(resource);

        let list: SidecarMetricResultList = serde_json::from_slice(body)?;
        let by_identity = list.by_identity();
        let item = lookup(&by_identity, uid, resource)
            .or_else(|| match list.items.as_slice() {
                [only] => Some(only),
                _ => None,
            })
            .ok_or_else(|| MetricError::MissingMetrics {
                resource: resource.clone(),
            })?;

        convert(item, group.target, uid, metric_name)
    }
}
