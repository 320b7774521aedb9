use crate::{CloudMetricsProvider, Datapoint, Dimension, StatisticsQuery};
use chrono::{Duration, Utc};
use cwmon_common::catalog::Catalog;
use cwmon_common::types::{MetricValue, Resource, Statistic};
use std::sync::Arc;

/// Trailing window used for every statistics query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub width_secs: u32,
    pub period_secs: u32,
}

impl Default for QueryWindow {
    fn default() -> Self {
        Self {
            width_secs: 120,
            period_secs: 60,
        }
    }
}

/// Queries the latest value of every catalog metric for a resource.
#[derive(Clone)]
pub struct MetricFetcher {
    provider: Arc<dyn CloudMetricsProvider>,
    window: QueryWindow,
}

impl MetricFetcher {
    pub fn new(provider: Arc<dyn CloudMetricsProvider>, window: QueryWindow) -> Self {
        Self { provider, window }
    }

    /// Fetch one value per catalog metric that has data in the window.
    ///
    /// A provider error stops the fetch: the values collected before the
    /// failing query are returned and the rest of the catalog is skipped.
    pub async fn fetch(&self, resource: &Resource, catalog: &Catalog) -> Vec<MetricValue> {
        let mut values = Vec::new();
        let end_time = Utc::now();
        let start_time = end_time - Duration::seconds(i64::from(self.window.width_secs));

        for graph in catalog.iter() {
            for metric in &graph.metrics {
                let query = StatisticsQuery {
                    namespace: resource.kind.namespace().to_string(),
                    metric_name: metric.name.clone(),
                    dimension: Dimension {
                        name: resource.kind.dimension_name().to_string(),
                        value: resource.name.clone(),
                    },
                    start_time,
                    end_time,
                    period_secs: self.window.period_secs,
                    statistic: metric.statistic,
                };

                let datapoints = match self.provider.query_statistics(&query).await {
                    Ok(datapoints) => datapoints,
                    Err(e) => {
                        tracing::error!(
                            resource = %resource.name,
                            graph = %graph.key,
                            metric = %metric.name,
                            error = %e,
                            "Statistics query failed, returning partial result"
                        );
                        return values;
                    }
                };

                match select_latest(&datapoints, metric.statistic) {
                    Some((timestamp, value)) => values.push(MetricValue {
                        name: graph.metric_name(metric),
                        value,
                        timestamp,
                    }),
                    None => tracing::debug!(
                        resource = %resource.name,
                        metric = %metric.name,
                        "No data points in window"
                    ),
                }
            }
        }

        values
    }
}

/// Pick the data point with the greatest timestamp and read `statistic` from it.
///
/// On equal timestamps the first scanned data point is kept. Data points that
/// lack the requested statistic are ignored.
pub fn select_latest(datapoints: &[Datapoint], statistic: Statistic) -> Option<(i64, f64)> {
    let mut latest: Option<(i64, f64)> = None;
    for dp in datapoints {
        let Some(value) = dp.value_for(statistic) else {
            continue;
        };
        match latest {
            Some((timestamp, _)) if timestamp >= dp.timestamp => {}
            _ => latest = Some((dp.timestamp, value)),
        }
    }
    latest
}
