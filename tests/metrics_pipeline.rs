/// End to end tests of the download pipeline against a stub backend.
///
/// The stub records every requested path so tests can assert how many
/// round-trips a download cost.
use async_trait::async_trait;
use bytes::Bytes;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kubemetrics::k8s::metrics::{
    AggregationMode, CachedResources, DataPoint, Endpoint, Heapster, MetricClient, MetricError,
    MetricsConfig, PipelineClient, ProviderId, RawClient, ResourceKind, ResourceSelector, Sidecar,
    WireFormat,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

const CPU: &str = "cpu/usage_rate";
const TIMESTAMPS: [&str; 3] = [
    "2017-03-01T10:00:00Z",
    "2017-03-01T10:01:00Z",
    "2017-03-01T10:02:00Z",
];

type Handler = Box<dyn Fn(&str) -> Result<String, MetricError> + Send + Sync>;

struct StubBackend {
    calls: Mutex<Vec<String>>,
    handler: Handler,
}

impl StubBackend {
    fn new(handler: impl Fn(&str) -> Result<String, MetricError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RawClient for StubBackend {
    async fn get(&self, path: &str) -> Result<Bytes, MetricError> {
        self.calls.lock().unwrap().push(path.to_string());
        (self.handler)(path).map(Bytes::from)
    }
}

fn client<W: WireFormat>(stub: &Arc<StubBackend>, wire: W, provider: ProviderId) -> PipelineClient<W> {
    let config = MetricsConfig::new(
        provider,
        Endpoint::Remote {
            base_url: "http://metrics.test".to_string(),
        },
    );
    let raw: Arc<dyn RawClient> = stub.clone();
    PipelineClient::new(raw, wire, &config)
}

fn points(values: &[i64]) -> String {
    values
        .iter()
        .zip(TIMESTAMPS)
        .map(|(value, ts)| format!(r#"{{"timestamp":"{ts}","value":{value}}}"#))
        .collect::<Vec<_>>()
        .join(",")
}

fn heapster_items(series: &[&[i64]]) -> String {
    let items: Vec<String> = series
        .iter()
        .map(|values| format!(r#"{{"metrics":[{}],"latestTimestamp":"{}"}}"#, points(values), TIMESTAMPS[2]))
        .collect();
    format!(r#"{{"items":[{}]}}"#, items.join(","))
}

fn sidecar_items(series: &[(&str, &[i64])]) -> String {
    let items: Vec<String> = series
        .iter()
        .map(|(uid, values)| {
            format!(
                r#"{{"metricName":"{CPU}","uids":["{uid}"],"metricPoints":[{}]}}"#,
                points(values)
            )
        })
        .collect();
    format!(r#"{{"items":[{}]}}"#, items.join(","))
}

fn ys(points: &[DataPoint]) -> Vec<i64> {
    points.iter().map(|point| point.y).collect()
}

fn pod_selector(name: &str) -> ResourceSelector {
    ResourceSelector::new(ResourceKind::Pod, "default", name, &format!("{name}-uid"))
}

fn pod(name: &str, labels: &[(&str, &str)], owner_uid: Option<&str>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some(format!("{name}-uid")),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            owner_references: owner_uid.map(|uid| {
                vec![OwnerReference {
                    api_version: "apps/v1".to_string(),
                    kind: "ReplicaSet".to_string(),
                    name: "web-rs".to_string(),
                    uid: uid.to_string(),
                    controller: Some(true),
                    ..OwnerReference::default()
                }]
            }),
            ..ObjectMeta::default()
        },
        ..Pod::default()
    }
}

#[tokio::test]
async fn test_pods_in_one_namespace_share_one_request() {
    let stub = StubBackend::new(|_| Ok(heapster_items(&[&[1, 2, 3], &[10, 20, 30], &[100, 200, 300]])));
    let heapster = client(&stub, Heapster, ProviderId::Heapster);
    let selectors = vec![pod_selector("a"), pod_selector("b"), pod_selector("c")];

    let promises = heapster.download_metric(&selectors, CPU, &CachedResources::default());
    let summed = heapster.aggregate_metrics(promises.clone(), CPU, &[AggregationMode::Sum]);

    let metrics = promises.get_metrics().await.unwrap();
    assert_eq!(ys(&metrics[1].data_points), vec![10, 20, 30]);
    assert_eq!(metrics[1].metric_points.len(), 3);

    let summed = summed.get_metrics().await.unwrap();
    assert_eq!(ys(&summed[0].data_points), vec![111, 222, 333]);
    assert!(summed[0].metric_points.is_empty());

    assert_eq!(
        stub.calls(),
        vec!["/model/namespaces/default/pod-list/a,b,c/metrics/cpu/usage_rate"]
    );
}

#[tokio::test]
async fn test_nodes_are_fetched_one_by_one_with_isolated_failures() {
    let stub = StubBackend::new(|path| {
        if path.contains("node-2") {
            Err(MetricError::Transport("connection reset".to_string()))
        } else if path.contains("node-1") {
            Ok(format!(r#"{{"metrics":[{}]}}"#, points(&[1, 1, 1])))
        } else {
            Ok(format!(r#"{{"metrics":[{}]}}"#, points(&[3, 3, 3])))
        }
    });
    let heapster = client(&stub, Heapster, ProviderId::Heapster);
    let selectors: Vec<ResourceSelector> = ["node-1", "node-2", "node-3"]
        .iter()
        .map(|name| ResourceSelector::new(ResourceKind::Node, "", name, ""))
        .collect();

    let results = heapster
        .download_metric(&selectors, CPU, &CachedResources::default())
        .get_results()
        .await;

    assert_eq!(ys(&results[0].as_ref().unwrap().data_points), vec![1, 1, 1]);
    assert_eq!(
        results[1],
        Err(MetricError::Transport("connection reset".to_string()))
    );
    assert_eq!(ys(&results[2].as_ref().unwrap().data_points), vec![3, 3, 3]);

    let mut calls = stub.calls();
    calls.sort();
    assert_eq!(
        calls,
        vec![
            "/model/nodes/node-1/metrics/cpu/usage_rate",
            "/model/nodes/node-2/metrics/cpu/usage_rate",
            "/model/nodes/node-3/metrics/cpu/usage_rate",
        ]
    );
}

#[tokio::test]
async fn test_results_follow_request_order_when_backend_reorders() {
    let stub = StubBackend::new(|_| {
        Ok(sidecar_items(&[
            ("c-uid", &[3, 3, 3]),
            ("a-uid", &[1, 1, 1]),
            ("b-uid", &[2, 2, 2]),
        ]))
    });
    let sidecar = client(&stub, Sidecar, ProviderId::Sidecar);
    let selectors = vec![pod_selector("a"), pod_selector("b"), pod_selector("c")];

    let metrics = sidecar
        .download_metric(&selectors, CPU, &CachedResources::default())
        .get_metrics()
        .await
        .unwrap();

    for (i, (metric, selector)) in metrics.iter().zip(&selectors).enumerate() {
        assert_eq!(metric.label.get(ResourceKind::Pod), [selector.uid.clone()]);
        let expected = i64::try_from(i).unwrap() + 1;
        assert_eq!(ys(&metric.data_points), vec![expected; 3]);
    }
    assert_eq!(
        stub.calls(),
        vec!["/api/v1/dashboard/namespaces/default/pod-list/a,b,c/metrics/cpu/usage_rate"]
    );
}

#[tokio::test]
async fn test_resource_missing_from_response_fails_only_its_index() {
    let stub = StubBackend::new(|_| Ok(sidecar_items(&[("a-uid", &[1, 1, 1]), ("c-uid", &[3, 3, 3])])));
    let sidecar = client(&stub, Sidecar, ProviderId::Sidecar);
    let selectors = vec![pod_selector("a"), pod_selector("b"), pod_selector("c")];

    let results = sidecar
        .download_metric(&selectors, CPU, &CachedResources::default())
        .get_results()
        .await;

    assert!(results[0].is_ok());
    assert_eq!(
        results[1],
        Err(MetricError::MissingMetrics {
            resource: "b".to_string()
        })
    );
    assert!(results[2].is_ok());
}

#[tokio::test]
async fn test_group_failure_reaches_every_member() {
    let stub = StubBackend::new(|_| Err(MetricError::Transport("503 Service Unavailable".to_string())));
    let heapster = client(&stub, Heapster, ProviderId::Heapster);
    let selectors = vec![pod_selector("a"), pod_selector("b")];

    let results = heapster
        .download_metric(&selectors, CPU, &CachedResources::default())
        .get_results()
        .await;

    assert_eq!(stub.calls().len(), 1);
    for result in results {
        assert_eq!(
            result,
            Err(MetricError::Transport("503 Service Unavailable".to_string()))
        );
    }
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() {
    let stub = StubBackend::new(|_| Ok("not json".to_string()));
    let heapster = client(&stub, Heapster, ProviderId::Heapster);

    let result = heapster
        .download_metric(&[pod_selector("a")], CPU, &CachedResources::default())[0]
        .get()
        .await;

    assert!(matches!(result, Err(MetricError::Decode(_))));
}

#[tokio::test]
async fn test_derived_selector_sums_its_pods() {
    let stub = StubBackend::new(|_| {
        Ok(sidecar_items(&[
            ("web-1-uid", &[1, 2, 3]),
            ("web-2-uid", &[4, 5, 6]),
            ("api-1-uid", &[7, 7, 7]),
        ]))
    });
    let sidecar = client(&stub, Sidecar, ProviderId::Sidecar);
    let cache = CachedResources::with_pods(vec![
        pod("web-1", &[("app", "web")], Some("rs-uid")),
        pod("web-2", &[("app", "web")], Some("rs-uid")),
        pod("api-1", &[("app", "api")], None),
    ]);
    let selectors = vec![
        ResourceSelector::new(ResourceKind::ReplicaSet, "default", "web-rs", "rs-uid"),
        ResourceSelector::new(ResourceKind::Deployment, "default", "web", "dep-uid")
            .with_selector(BTreeMap::from([("app".to_string(), "web".to_string())])),
        pod_selector("api-1"),
    ];

    let metrics = sidecar
        .download_metric(&selectors, CPU, &cache)
        .get_metrics()
        .await
        .unwrap();

    assert_eq!(ys(&metrics[0].data_points), vec![5, 7, 9]);
    assert_eq!(metrics[0].label.get(ResourceKind::Pod), ["web-1-uid", "web-2-uid"]);
    assert_eq!(ys(&metrics[1].data_points), vec![5, 7, 9]);
    assert_eq!(ys(&metrics[2].data_points), vec![7, 7, 7]);
    assert_eq!(
        stub.calls(),
        vec!["/api/v1/dashboard/namespaces/default/pod-list/web-1,web-2,api-1/metrics/cpu/usage_rate"]
    );
}

#[tokio::test]
async fn test_zero_resources_means_zero_requests() {
    let stub = StubBackend::new(|_| Ok(heapster_items(&[])));
    let heapster = client(&stub, Heapster, ProviderId::Heapster);
    let selectors = vec![ResourceSelector::new(
        ResourceKind::StatefulSet,
        "default",
        "db",
        "ss-uid",
    )];

    let metric = heapster
        .download_metric(&selectors, CPU, &CachedResources::with_pods(Vec::new()))[0]
        .get()
        .await
        .unwrap();

    assert!(metric.data_points.is_empty());
    assert_eq!(metric.metric_name, CPU);
    assert!(stub.calls().is_empty());
}

#[tokio::test]
async fn test_resolution_failure_is_isolated() {
    let stub = StubBackend::new(|_| Ok(heapster_items(&[&[4, 4, 4]])));
    let heapster = client(&stub, Heapster, ProviderId::Heapster);
    let selectors = vec![
        ResourceSelector::new(ResourceKind::DaemonSet, "default", "agent", "ds-uid"),
        pod_selector("a"),
    ];

    let results = heapster
        .download_metric(&selectors, CPU, &CachedResources::default())
        .get_results()
        .await;

    assert!(matches!(results[0], Err(MetricError::Resolution(_))));
    assert_eq!(ys(&results[1].as_ref().unwrap().data_points), vec![4, 4, 4]);
}

#[tokio::test]
async fn test_download_metrics_concatenates_by_name() {
    let stub = StubBackend::new(|path| {
        if path.ends_with("memory/usage") {
            Ok(heapster_items(&[&[9, 9, 9], &[8, 8, 8]]))
        } else {
            Ok(heapster_items(&[&[1, 1, 1], &[2, 2, 2]]))
        }
    });
    let heapster = client(&stub, Heapster, ProviderId::Heapster);
    let selectors = vec![pod_selector("a"), pod_selector("b")];

    let metrics = heapster
        .download_metrics(&selectors, &[CPU, "memory/usage"], &CachedResources::default())
        .get_metrics()
        .await
        .unwrap();

    let names: Vec<&str> = metrics.iter().map(|m| m.metric_name.as_str()).collect();
    assert_eq!(names, vec![CPU, CPU, "memory/usage", "memory/usage"]);
    assert_eq!(ys(&metrics[3].data_points), vec![8, 8, 8]);
    assert_eq!(stub.calls().len(), 2);
}

#[tokio::test]
async fn test_min_max_aggregation_across_pods() {
    let stub = StubBackend::new(|_| Ok(heapster_items(&[&[1, 9, 3], &[4, 2, 6]])));
    let heapster = client(&stub, Heapster, ProviderId::Heapster);
    let selectors = vec![pod_selector("a"), pod_selector("b")];

    let promises = heapster.download_metric(&selectors, CPU, &CachedResources::default());
    let metrics = heapster
        .aggregate_metrics(promises, CPU, &[AggregationMode::Min, AggregationMode::Max])
        .get_metrics()
        .await
        .unwrap();

    assert_eq!(ys(&metrics[0].data_points), vec![1, 2, 3]);
    assert_eq!(ys(&metrics[1].data_points), vec![4, 9, 6]);
}

#[tokio::test]
async fn test_health_check_and_id() -> anyhow::Result<()> {
    let stub = StubBackend::new(|path| {
        if path == "/healthz" {
            Ok("ok".to_string())
        } else {
            Err(MetricError::Transport("404 Not Found".to_string()))
        }
    });
    let sidecar = client(&stub, Sidecar, ProviderId::Sidecar);

    sidecar.health_check().await?;
    assert_eq!(sidecar.id(), ProviderId::Sidecar);
    assert_eq!(stub.calls(), vec!["/healthz"]);
    Ok(())
}

#[tokio::test]
async fn test_same_pod_named_with_and_without_uid() {
    let stub = StubBackend::new(|_| Ok(heapster_items(&[&[5, 5, 5]])));
    let heapster = client(&stub, Heapster, ProviderId::Heapster);
    let cache = CachedResources::with_pods(vec![pod("web-1", &[("app", "web")], Some("rs-uid"))]);
    let selectors = vec![
        ResourceSelector::new(ResourceKind::Pod, "default", "web-1", ""),
        ResourceSelector::new(ResourceKind::ReplicaSet, "default", "web-rs", "rs-uid"),
    ];

    let metrics = heapster
        .download_metric(&selectors, CPU, &cache)
        .get_metrics()
        .await
        .unwrap();

    assert_eq!(ys(&metrics[0].data_points), vec![5, 5, 5]);
    assert_eq!(metrics[0].label.get(ResourceKind::Pod), ["web-1"]);
    assert_eq!(ys(&metrics[1].data_points), vec![5, 5, 5]);
    assert_eq!(metrics[1].label.get(ResourceKind::Pod), ["web-1-uid"]);
    assert_eq!(
        stub.calls(),
        vec!["/model/namespaces/default/pod-list/web-1/metrics/cpu/usage_rate"]
    );
}

#[tokio::test]
async fn test_error_object_from_backend_is_a_decode_error() {
    let stub = StubBackend::new(|_| Ok(r#"{"message":"no such node"}"#.to_string()));
    let heapster = client(&stub, Heapster, ProviderId::Heapster);
    let selectors = vec![ResourceSelector::new(ResourceKind::Node, "", "node-9", "")];

    let result = heapster
        .download_metric(&selectors, CPU, &CachedResources::default())[0]
        .get()
        .await;

    assert!(matches!(result, Err(MetricError::Decode(_))));
}
