use super::types::{DataPoint, Label, Metric, MetricPoint};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Sample as it appears on the wire, before clamping.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPoint {
    pub timestamp: DateTime<Utc>,
    pub value: i64,
}

/// Converts backend samples into the raw sparkline series, negative values
/// clamped to zero.
#[must_use]
pub fn to_metric_points(raw: &[RawPoint]) -> Vec<MetricPoint> {
    raw.iter()
        .map(|point| MetricPoint {
            timestamp: point.timestamp,
            value: u64::try_from(point.value).unwrap_or(0),
        })
        .collect()
}

/// Converts raw samples into `(epoch seconds, value)` pairs.
#[must_use]
pub fn to_data_points(raw: &[MetricPoint]) -> Vec<DataPoint> {
    raw.iter()
        .map(|point| DataPoint {
            x: point.timestamp.timestamp(),
            y: i64::try_from(point.value).unwrap_or(i64::MAX),
        })
        .collect()
}

/// A single-resource metric built from wire samples.
#[must_use]
pub fn to_metric(raw: &[RawPoint], metric_name: &str, label: Label) -> Metric {
    let metric_points = to_metric_points(raw);
    Metric {
        data_points: to_data_points(&metric_points),
        metric_points,
        metric_name: metric_name.to_string(),
        label,
        aggregate: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(secs: i64, value: i64) -> RawPoint {
        RawPoint {
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            value,
        }
    }

    #[test]
    fn test_negative_values_clamp_to_zero() {
        let points = to_data_points(&to_metric_points(&[raw(60, -5), raw(120, 7)]));
        assert_eq!(points, vec![DataPoint { x: 60, y: 0 }, DataPoint { x: 120, y: 7 }]);
    }

    #[test]
    fn test_raw_points_keep_timestamps() {
        let metric_points = to_metric_points(&[raw(1_500_000_000, 42)]);
        assert_eq!(metric_points.len(), 1);
        assert_eq!(metric_points[0].value, 42);
        assert_eq!(metric_points[0].timestamp.timestamp(), 1_500_000_000);
    }

    #[test]
    fn test_raw_point_deserializes_rfc3339() {
        let point: RawPoint = k8s_openapi::serde_json::from_str(
            r#"{"timestamp":"2017-03-01T10:00:00Z","value":-3}"#,
        )
        .unwrap();
        assert_eq!(point.value, -3);
        assert_eq!(point.timestamp.timestamp(), 1_488_362_400);
    }
}
