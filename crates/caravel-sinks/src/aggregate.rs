//! Metric aggregation for reliable metrics sinks.
//!
//! Before uploading, a metrics sink pulls current metrics from its
//! registered data sources and collapses them to one aggregate per metric
//! name. Dimensions are discarded by the grouping; an aggregator that
//! needs them must fold them into the name upstream.

use std::collections::BTreeMap;

use caravel_core::metrics::{CounterType, Metric, MetricValue};

/// Groups metrics by name and applies `aggregator` to each group's
/// values. Group order is deterministic (sorted by name).
pub fn aggregate_by_name<F>(metrics: &[Metric], aggregator: F) -> BTreeMap<String, MetricValue>
where
    F: Fn(&[MetricValue]) -> MetricValue,
{
    let mut groups: BTreeMap<String, Vec<MetricValue>> = BTreeMap::new();
    for metric in metrics {
        groups
            .entry(metric.key.name.clone())
            .or_default()
            .push(metric.value);
    }

    groups
        .into_iter()
        .map(|(name, values)| (name, aggregator(&values)))
        .collect()
}

/// Counter-type-aware default aggregator.
///
/// Increments sum, current values keep the latest, averages take the
/// mean. The group's counter type and unit follow its first value.
pub fn default_aggregator(values: &[MetricValue]) -> MetricValue {
    let first = values.first().copied().unwrap_or(MetricValue {
        value: 0.0,
        unit: Default::default(),
        counter_type: CounterType::CurrentValue,
    });

    let value = match first.counter_type {
        CounterType::Increment => values.iter().map(|v| v.value).sum(),
        CounterType::CurrentValue => values.last().map(|v| v.value).unwrap_or(0.0),
        CounterType::Average => {
            values.iter().map(|v| v.value).sum::<f64>() / values.len() as f64
        }
    };

    MetricValue { value, ..first }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravel_core::metrics::{MetricKey, MetricUnit};

    fn metric(name: &str, id: &str, value: f64, counter_type: CounterType) -> Metric {
        Metric {
            key: MetricKey::new(name, "Sinks").with_dimension("id", id),
            value: MetricValue {
                value,
                unit: MetricUnit::Count,
                counter_type,
            },
        }
    }

    #[test]
    fn test_increments_sum_across_dimensions() {
        let metrics = vec![
            metric("ServiceSuccess", "k1", 3.0, CounterType::Increment),
            metric("ServiceSuccess", "k2", 4.0, CounterType::Increment),
            metric("RecoverableServiceErrors", "k1", 1.0, CounterType::Increment),
        ];

        let aggregated = aggregate_by_name(&metrics, default_aggregator);
        assert_eq!(aggregated["ServiceSuccess"].value, 7.0);
        assert_eq!(aggregated["RecoverableServiceErrors"].value, 1.0);
        assert_eq!(aggregated.len(), 2);
    }

    #[test]
    fn test_averages_take_the_mean() {
        let metrics = vec![
            metric("Latency", "k1", 10.0, CounterType::Average),
            metric("Latency", "k2", 30.0, CounterType::Average),
        ];

        let aggregated = aggregate_by_name(&metrics, default_aggregator);
        assert_eq!(aggregated["Latency"].value, 20.0);
    }

    #[test]
    fn test_custom_aggregator_wins() {
        let metrics = vec![
            metric("QueueDepth", "k1", 5.0, CounterType::CurrentValue),
            metric("QueueDepth", "k2", 9.0, CounterType::CurrentValue),
        ];

        let max = aggregate_by_name(&metrics, |values| MetricValue {
            value: values.iter().map(|v| v.value).fold(f64::MIN, f64::max),
            ..values[0]
        });
        assert_eq!(max["QueueDepth"].value, 9.0);
    }
}
