use anyhow::Context;
use clap::Parser;
use k8s_openapi::serde_json;
use kubemetrics::k8s::metrics::config::DEFAULT_METRIC_NAMES;
use kubemetrics::k8s::metrics::{
    AggregationMode, Endpoint, MetricsConfig, ProviderId, ResourceKind, connect,
};
use kubemetrics::k8s::utils::parse_label_selector;
use kubemetrics::k8s::{USER_AGENT, client, pods, workloads};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Metrics backend: heapster or sidecar
    #[arg(short, long, default_value = "sidecar")]
    provider: ProviderId,

    /// Talk to the backend directly instead of through the service proxy
    #[arg(long)]
    metrics_url: Option<String>,

    /// Namespace of the selected resources
    #[arg(short, long, default_value = "default")]
    namespace: String,

    /// Kind of the selected resources
    #[arg(short, long, default_value = "pod")]
    kind: ResourceKind,

    /// Resource names; every pod of the namespace when omitted
    #[arg(long = "name")]
    names: Vec<String>,

    /// Label selector narrowing the cached pods, e.g. app=web,tier=frontend
    #[arg(short = 'l', long, value_parser = parse_label_selector)]
    selector: Option<std::collections::BTreeMap<String, String>>,

    /// Metric names to download
    #[arg(short, long = "metric")]
    metrics: Vec<String>,

    /// Aggregations across the selected resources (sum, min, max)
    #[arg(short, long = "aggregation")]
    aggregations: Vec<String>,

    /// Only probe the backend's health endpoint
    #[arg(long)]
    health: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    metric_name: String,
    resources: Vec<ResourceReport>,
    aggregated: Vec<kubemetrics::k8s::metrics::Metric>,
}

#[derive(Serialize)]
struct ResourceReport {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metric: Option<kubemetrics::k8s::metrics::Metric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let args = Args::parse();
    let kube = client::new(Some(USER_AGENT))
        .await
        .context("cannot create kubernetes client")?;

    let endpoint = args.metrics_url.clone().map_or_else(
        || Endpoint::in_cluster(args.provider),
        |base_url| Endpoint::Remote { base_url },
    );
    let config = MetricsConfig::new(args.provider, endpoint);
    let metric_client = connect(&config, Some(kube.clone()))?;

    if args.health {
        metric_client
            .health_check()
            .await
            .with_context(|| format!("{} is not healthy", metric_client.id()))?;
        info!("{} is healthy", metric_client.id());
        return Ok(());
    }

    let labels = args.selector.clone().unwrap_or_default();
    let cache = pods::cache_pods(kube.clone(), &args.namespace, &labels).await?;

    let selectors = if args.names.is_empty() && args.kind == ResourceKind::Pod {
        workloads::pod_selectors(cache.pods.as_deref().unwrap_or_default())
    } else {
        let mut selectors = Vec::with_capacity(args.names.len());
        for name in &args.names {
            selectors.push(
                workloads::selector_for(kube.clone(), args.kind, &args.namespace, name).await?,
            );
        }
        selectors
    };
    if selectors.is_empty() {
        warn!("Nothing selected in namespace {}", args.namespace);
    }

    let metric_names: Vec<&str> = if args.metrics.is_empty() {
        DEFAULT_METRIC_NAMES.to_vec()
    } else {
        args.metrics.iter().map(String::as_str).collect()
    };
    let modes: Vec<AggregationMode> = args
        .aggregations
        .iter()
        .map(|mode| AggregationMode::parse_lenient(mode))
        .collect();

    let mut reports = Vec::with_capacity(metric_names.len());
    for metric_name in metric_names {
        let promises = metric_client.download_metric(&selectors, metric_name, &cache);
        let aggregated = metric_client.aggregate_metrics(promises.clone(), metric_name, &modes);

        let resources = selectors
            .iter()
            .zip(promises.get_results().await)
            .map(|(selector, result)| match result {
                Ok(metric) => ResourceReport {
                    name: selector.resource_name.clone(),
                    metric: Some(metric),
                    error: None,
                },
                Err(e) => ResourceReport {
                    name: selector.resource_name.clone(),
                    metric: None,
                    error: Some(e.to_string()),
                },
            })
            .collect();

        let aggregated = match aggregated.get_metrics().await {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!("Cannot aggregate {}: {}", metric_name, e);
                Vec::new()
            }
        };

        reports.push(Report {
            metric_name: metric_name.to_string(),
            resources,
            aggregated,
        });
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}
