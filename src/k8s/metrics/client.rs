//! The download pipeline shared by every metrics provider.
//!
//! For one metric name: resolve every selector to native resources, merge the
//! selectors by backend path, fetch each merged group concurrently, then split
//! the group results back onto the caller's positions.
use super::aggregate::{aggregate_data, aggregate_metric_promises};
use super::compress::{CompressedSelector, NativeSelector, compress};
use super::config::{DownloadPolicy, MetricsConfig};
use super::errors::MetricError;
use super::promise::{MetricPromises, MetricResult, PromiseResolver};
use super::resolve::{CachedResources, DerivationTable, resolve};
use super::transport::RawClient;
use super::types::{
    AggregationMode, Label, Metric, ProviderId, ResourceKind, ResourceSelector,
};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a caller can do with a metrics backend.
///
/// Download methods return immediately; the promises are resolved by tasks
/// spawned on the current tokio runtime.
#[async_trait]
pub trait MetricClient: Send + Sync {
    fn id(&self) -> ProviderId;

    /// # Errors
    ///
    /// Returns the transport error when the backend does not answer its health path
    async fn health_check(&self) -> Result<(), MetricError>;

    /// One promise per selector, in selector order.
    fn download_metric(
        &self,
        selectors: &[ResourceSelector],
        metric_name: &str,
        cache: &CachedResources,
    ) -> MetricPromises;

    /// `download_metric` for each name, concatenated in name order.
    fn download_metrics(
        &self,
        selectors: &[ResourceSelector],
        metric_names: &[&str],
        cache: &CachedResources,
    ) -> MetricPromises {
        let mut promises = MetricPromises::empty();
        for metric_name in metric_names {
            promises.extend(self.download_metric(selectors, metric_name, cache));
        }
        promises
    }

    /// One aggregated promise per mode.
    fn aggregate_metrics(
        &self,
        promises: MetricPromises,
        metric_name: &str,
        modes: &[AggregationMode],
    ) -> MetricPromises {
        aggregate_metric_promises(promises, metric_name, modes, None)
    }
}

/// Backend specific routes and response decoding.
pub trait WireFormat: Send + Sync + 'static {
    fn id(&self) -> ProviderId;

    /// Route prefix serving `kind` resources in `namespace`; selectors with
    /// equal prefixes are merged into one request.
    ///
    /// # Errors
    ///
    /// Returns `MetricError::UnsupportedResource` for kinds the backend does not know
    fn path(&self, kind: ResourceKind, namespace: &str) -> Result<String, MetricError>;

    /// Request for several resources at once.
    fn bulk_request(&self, path: &str, resources: &[String], metric_name: &str) -> String {
        format!("{path}{}/metrics/{metric_name}", resources.join(","))
    }

    /// Request for one resource.
    fn single_request(&self, path: &str, resource: &str, metric_name: &str) -> String {
        format!("{path}{resource}/metrics/{metric_name}")
    }

    /// Splits a bulk response into one result per entry of `group.resources`,
    /// in that order. Resources missing from the response get
    /// `MetricError::MissingMetrics`.
    ///
    /// # Errors
    ///
    /// Returns `MetricError::Decode` when the body is malformed.
    fn decode_bulk(
        &self,
        body: &[u8],
        group: &CompressedSelector,
        metric_name: &str,
    ) -> Result<Vec<MetricResult>, MetricError>;

    /// Decodes the response for `group.resources[index]`.
    ///
    /// # Errors
    ///
    /// Returns `MetricError::Decode` when the body is malformed.
    fn decode_single(
        &self,
        body: &[u8],
        group: &CompressedSelector,
        index: usize,
        metric_name: &str,
    ) -> MetricResult;
}

/// `MetricClient` for any `WireFormat`.
pub struct PipelineClient<W: WireFormat> {
    raw: Arc<dyn RawClient>,
    wire: Arc<W>,
    policy: DownloadPolicy,
    derivations: DerivationTable,
    health_path: String,
}

impl<W: WireFormat> PipelineClient<W> {
    #[must_use]
    pub fn new(raw: Arc<dyn RawClient>, wire: W, config: &MetricsConfig) -> Self {
        Self {
            raw,
            wire: Arc::new(wire),
            policy: config.download_policy.clone(),
            derivations: config.derivations.clone(),
            health_path: config.health_path.clone(),
        }
    }

    fn route(
        &self,
        selector: &ResourceSelector,
        cache: &CachedResources,
    ) -> Result<NativeSelector, MetricError> {
        let resolved = resolve(selector, cache, &self.derivations)?;
        let path = self.wire.path(resolved.target, &resolved.namespace)?;
        Ok(resolved.route(path))
    }
}

#[async_trait]
impl<W: WireFormat> MetricClient for PipelineClient<W> {
    fn id(&self) -> ProviderId {
        self.wire.id()
    }

    async fn health_check(&self) -> Result<(), MetricError> {
        self.raw.get(&self.health_path).await.map(|_| ())
    }

    fn download_metric(
        &self,
        selectors: &[ResourceSelector],
        metric_name: &str,
        cache: &CachedResources,
    ) -> MetricPromises {
        let (promises, resolvers) = MetricPromises::pending(selectors.len());

        let mut routed = Vec::with_capacity(selectors.len());
        let mut routed_resolvers = Vec::with_capacity(selectors.len());
        for (selector, resolver) in selectors.iter().zip(resolvers) {
            match self.route(selector, cache) {
                Ok(native) => {
                    routed.push(native);
                    routed_resolvers.push(resolver);
                }
                Err(e) => {
                    warn!(
                        "Skipping {} {}/{}: {}",
                        selector.kind(),
                        selector.namespace,
                        selector.resource_name,
                        e
                    );
                    resolver.resolve(Err(e));
                }
            }
        }

        let download = Download {
            raw: self.raw.clone(),
            wire: self.wire.clone(),
            policy: self.policy.clone(),
            metric_name: metric_name.to_string(),
        };
        tokio::spawn(download.run(routed, routed_resolvers));

        promises
    }
}

/// State moved into the background task of one `download_metric` call.
struct Download<W: WireFormat> {
    raw: Arc<dyn RawClient>,
    wire: Arc<W>,
    policy: DownloadPolicy,
    metric_name: String,
}

impl<W: WireFormat> Download<W> {
    async fn run(self, selectors: Vec<NativeSelector>, resolvers: Vec<PromiseResolver>) {
        let (compressed, reverse) = compress(&selectors);
        debug!(
            "Downloading {} for {} selectors in {} groups",
            self.metric_name,
            selectors.len(),
            compressed.len()
        );

        let results = join_all(compressed.iter().map(|group| self.fetch_group(group))).await;

        let mut resolvers: Vec<Option<PromiseResolver>> = resolvers.into_iter().map(Some).collect();
        for (group, result) in compressed.iter().zip(results) {
            let Some(positions) = reverse.get(&group.path) else {
                continue;
            };
            for &position in positions {
                let Some(resolver) = resolvers[position].take() else {
                    continue;
                };
                let outcome = match &result {
                    Ok(components) => self.assemble(&selectors[position], group, components),
                    Err(e) => Err(e.clone()),
                };
                resolver.resolve(outcome);
            }
        }
    }

    /// Per-resource results for `group.resources`, or the error of the single
    /// request serving the whole group.
    async fn fetch_group(&self, group: &CompressedSelector) -> Result<Vec<MetricResult>, MetricError> {
        if group.resources.is_empty() {
            return Ok(Vec::new());
        }

        if self.policy.supports_all_in_one(group.target) {
            let path = self
                .wire
                .bulk_request(&group.path, &group.resources, &self.metric_name);
            let body = self.raw.get(&path).await.inspect_err(|e| {
                warn!("Request for {} resources failed: {}", group.resources.len(), e);
            })?;
            return self.wire.decode_bulk(&body, group, &self.metric_name);
        }

        let requests = group.resources.iter().enumerate().map(|(index, resource)| {
            let path = self
                .wire
                .single_request(&group.path, resource, &self.metric_name);
            async move {
                match self.raw.get(&path).await {
                    Ok(body) => self.wire.decode_single(&body, group, index, &self.metric_name),
                    Err(e) => {
                        warn!("Request for {} {} failed: {}", group.target, resource, e);
                        Err(e)
                    }
                }
            }
        });
        Ok(join_all(requests).await)
    }

    /// Sums the group results belonging to `selector`. Failed components are
    /// left out; the selector only fails when nothing succeeded.
    ///
    /// Components are matched by resource name, which is unique within a
    /// group, and relabeled with the uids `selector` itself knows.
    fn assemble(
        &self,
        selector: &NativeSelector,
        group: &CompressedSelector,
        components: &[MetricResult],
    ) -> MetricResult {
        let wanted: HashMap<&str, &str> = selector.identities().collect();

        let mut metrics: Vec<Metric> = Vec::new();
        let mut first_error = None;
        for (name, component) in group.resources.iter().zip(components) {
            let Some(uid) = wanted.get(name.as_str()) else {
                continue;
            };
            match component {
                Ok(metric) => {
                    let mut metric = metric.clone();
                    metric.label = Label::single(group.target, uid);
                    metrics.push(metric);
                }
                Err(e) => {
                    first_error.get_or_insert_with(|| e.clone());
                }
            }
        }

        match first_error {
            Some(e) if metrics.is_empty() => Err(e),
            _ => Ok(aggregate_data(&metrics, &self.metric_name, AggregationMode::Sum)),
        }
    }
}
