//! Heapster model API.
//!
//! Bulk responses carry no resource identity: series come back in the order
//! the resources were named in the request.
use super::client::WireFormat;
use super::compress::CompressedSelector;
use super::errors::MetricError;
use super::points::{RawPoint, to_metric};
use super::promise::MetricResult;
use super::types::{Label, ProviderId, ResourceKind};
use k8s_openapi::serde_json;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default)]
pub struct Heapster;

#[derive(Debug, Deserialize)]
struct HeapsterResult {
    metrics: Vec<RawPoint>,
}

#[derive(Debug, Deserialize)]
struct HeapsterResultList {
    items: Vec<HeapsterResult>,
}

/// Single resource routes answer with a bare result, list routes with items.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Body {
    List(HeapsterResultList),
    Single(HeapsterResult),
}

impl WireFormat for Heapster {
    fn id(&self) -> ProviderId {
        ProviderId::Heapster
    }

    fn path(&self, kind: ResourceKind, namespace: &str) -> Result<String, MetricError> {
        match kind {
            ResourceKind::Pod => Ok(format!("/model/namespaces/{namespace}/pod-list/")),
            ResourceKind::Node => Ok("/model/nodes/".to_string()),
            _ => Err(MetricError::UnsupportedResource {
                kind,
                provider: ProviderId::Heapster,
            }),
        }
    }

    fn decode_bulk(
        &self,
        body: &[u8],
        group: &CompressedSelector,
        metric_name: &str,
    ) -> Result<Vec<MetricResult>, MetricError> {
        let list: HeapsterResultList = serde_json::from_slice(body)?;
        if list.items.len() != group.resources.len() {
            warn!(
                "Heapster returned {} series for {} requested resources",
                list.items.len(),
                group.resources.len()
            );
        }

        Ok(group
            .resources
            .iter()
            .enumerate()
            .map(|(index, resource)| {
                list.items.get(index).map_or_else(
                    || {
                        Err(MetricError::MissingMetrics {
                            resource: resource.clone(),
                        })
                    },
                    |item| {
                        Ok(to_metric(
                            &item.metrics,
                            metric_name,
                            Label::single(group.target, group.uid(index).unwrap_or(resource)),
                        ))
                    },
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

        let points = match serde_json::from_slice::<Body>(body)? {
            Body::Single(result) => result.metrics,
            Body::List(list) => list
                .items
                .into_iter()
                .next()
                .map(|item| item.metrics)
                .ok_or_else(|| MetricError::MissingMetrics {
                    resource: resource.clone(),
                })?,
        };

        Ok(to_metric(
            &points,
            metric_name,
            Label::single(group.target, group.uid(index).unwrap_or(resource)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::metrics::types::DataPoint;

    fn pods(names: &[&str]) -> CompressedSelector {
        let mut label = Label::new();
        for name in names {
            label.push(ResourceKind::Pod, &format!("{name}-uid"));
        }
        CompressedSelector {
            path: "/model/namespaces/default/pod-list/".to_string(),
            target: ResourceKind::Pod,
            resources: names.iter().map(|name| (*name).to_string()).collect(),
            label,
        }
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            Heapster.path(ResourceKind::Pod, "default").unwrap(),
            "/model/namespaces/default/pod-list/"
        );
        assert_eq!(Heapster.path(ResourceKind::Node, "").unwrap(), "/model/nodes/");
        assert!(Heapster.path(ResourceKind::Deployment, "default").is_err());

        let group = pods(&["a", "b"]);
        assert_eq!(
            Heapster.bulk_request(&group.path, &group.resources, "cpu/usage_rate"),
            "/model/namespaces/default/pod-list/a,b/metrics/cpu/usage_rate"
        );
        assert_eq!(
            Heapster.single_request("/model/nodes/", "node-1", "memory/usage"),
            "/model/nodes/node-1/metrics/memory/usage"
        );
    }

    #[test]
    fn test_bulk_is_positional_and_reports_missing() {
        let body = br#"{"items":[
            {"metrics":[{"timestamp":"2017-03-01T10:00:00Z","value":5}],"latestTimestamp":"2017-03-01T10:00:00Z"}
        ]}"#;
        let group = pods(&["a", "b"]);
        let results = Heapster.decode_bulk(body, &group, "cpu/usage_rate").unwrap();

        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.label.get(ResourceKind::Pod), ["a-uid"]);
        assert_eq!(first.data_points, vec![DataPoint { x: 1_488_362_400, y: 5 }]);
        assert_eq!(
            results[1],
            Err(MetricError::MissingMetrics {
                resource: "b".to_string()
            })
        );
    }

    #[test]
    fn test_single_result() {
        let body = br#"{"metrics":[{"timestamp":"2017-03-01T10:00:00Z","value":-2}],"latestTimestamp":"2017-03-01T10:00:00Z"}"#;
        let group = pods(&["a"]);
        let metric = Heapster.decode_single(body, &group, 0, "cpu/usage_rate").unwrap();

        assert_eq!(metric.data_points, vec![DataPoint { x: 1_488_362_400, y: 0 }]);
        assert_eq!(metric.metric_points.len(), 1);
    }

    #[test]
    fn test_error_object_is_not_an_empty_series() {
        let group = pods(&["a"]);
        let bodies: [&[u8]; 3] = [br#"{"message":"no such node"}"#, b"{}", br#"{"items":[{}]}"#];
        for body in bodies {
            assert!(matches!(
                Heapster.decode_single(body, &group, 0, "cpu/usage_rate"),
                Err(MetricError::Decode(_))
            ));
        }
        assert!(matches!(
            Heapster.decode_bulk(br#"{"items":[{"message":"gone"}]}"#, &group, "cpu/usage_rate"),
            Err(MetricError::Decode(_))
        ));
    }

    #[test]
    fn test_single_out_of_range() {
        let body = br#"{"metrics":[]}"#;
        assert!(matches!(
            Heapster.decode_single(body, &pods(&["a"]), 3, "cpu/usage_rate"),
            Err(MetricError::MissingMetrics { .. })
        ));
    }

    #[test]
    fn test_malformed_body() {
        let group = pods(&["a"]);
        assert!(matches!(
            Heapster.decode_bulk(b"<html>", &group, "cpu/usage_rate"),
            Err(MetricError::Decode(_))
        ));
    }
}
