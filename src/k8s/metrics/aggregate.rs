//! Summary statistics across the series of several resources.
use super::promise::MetricPromises;
use super::types::{AggregationMode, DataPoint, Label, Metric};
use std::collections::BTreeMap;
use tracing::debug;

/// Reduces every `metric_name` series in `metrics` into one, aligned on
/// timestamps. Metrics with another name are ignored.
#[must_use]
pub fn aggregate_data(metrics: &[Metric], metric_name: &str, mode: AggregationMode) -> Metric {
    let reduce = mode.reducer();
    let mut by_timestamp: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    let mut label = Label::new();
    let contributors: Vec<&Metric> = metrics
        .iter()
        .filter(|metric| metric.metric_name == metric_name)
        .collect();

    for metric in &contributors {
        label.merge(&metric.label);
        for point in &metric.data_points {
            by_timestamp.entry(point.x).or_default().push(point.y);
        }
    }

    let data_points = by_timestamp
        .into_iter()
        .map(|(x, ys)| DataPoint { x, y: reduce(&ys) })
        .collect();

    // raw points only make sense for a single resource
    let metric_points = match contributors.as_slice() {
        [metric] => metric.metric_points.clone(),
        _ => Vec::new(),
    };

    Metric {
        data_points,
        metric_points,
        metric_name: metric_name.to_string(),
        label,
        aggregate: Some(mode),
    }
}

/// Aggregates `promises` once they resolve, one output promise per mode in
/// `modes` (just `Sum` when empty).
///
/// An error in any input resolves every output with that error. `force_label`
/// replaces the merged label of each result when given.
#[must_use]
pub fn aggregate_metric_promises(
    promises: MetricPromises,
    metric_name: &str,
    modes: &[AggregationMode],
    force_label: Option<Label>,
) -> MetricPromises {
    let modes = if modes.is_empty() {
        vec![AggregationMode::default()]
    } else {
        modes.to_vec()
    };
    let (result, resolvers) = MetricPromises::pending(modes.len());
    let metric_name = metric_name.to_string();

    tokio::spawn(async move {
        match promises.get_metrics().await {
            Ok(metrics) => {
                debug!(
                    "Aggregating {} {} series with {:?}",
                    metrics.len(),
                    metric_name,
                    modes
                );
                for (mode, resolver) in modes.into_iter().zip(resolvers) {
                    let mut aggregated = aggregate_data(&metrics, &metric_name, mode);
                    if let Some(label) = &force_label {
                        aggregated.label = label.clone();
                    }
                    resolver.resolve(Ok(aggregated));
                }
            }
            Err(e) => {
                for resolver in resolvers {
                    resolver.resolve(Err(e.clone()));
                }
            }
        }
    });

    result
}
