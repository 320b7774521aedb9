pub mod aws;
pub mod discovery;
pub mod error;
pub mod fetcher;

use chrono::{DateTime, Utc};
use cwmon_common::types::{ResourceKind, Statistic};

/// A resource as listed by the provider, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredResource {
    pub name: String,
    /// DNS name or endpoint address.
    pub address: String,
}

/// Name/value filter narrowing a statistics query to one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

/// Time-series query for a single metric over a window.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsQuery {
    pub namespace: String,
    pub metric_name: String,
    pub dimension: Dimension,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub period_secs: u32,
    pub statistic: Statistic,
}

/// One aggregated data point returned by the provider.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Datapoint {
    /// Unix seconds.
    pub timestamp: i64,
    pub sum: Option<f64>,
    pub average: Option<f64>,
}

impl Datapoint {
    /// The value of `statistic`, if the provider returned it.
    pub fn value_for(&self, statistic: Statistic) -> Option<f64> {
        match statistic {
            Statistic::Sum => self.sum,
            Statistic::Average => self.average,
        }
    }
}

/// Cloud monitoring API seen by the relay.
///
/// Every error is treated as non-fatal by callers: they log it and degrade.
#[async_trait::async_trait]
pub trait CloudMetricsProvider: Send + Sync {
    /// Provider name used in logs (e.g. `"aws:ap-northeast-1"`).
    fn name(&self) -> &str;

    /// List all resources of `kind`.
    async fn list_resources(&self, kind: ResourceKind) -> error::Result<Vec<DiscoveredResource>>;

    /// Run one statistics query. An empty vector means no data in the window.
    async fn query_statistics(&self, query: &StatisticsQuery) -> error::Result<Vec<Datapoint>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datapoint_reads_requested_statistic() {
        let dp = Datapoint {
            timestamp: 100,
            sum: Some(57.0),
            average: None,
        };
        assert_eq!(dp.value_for(Statistic::Sum), Some(57.0));
        assert_eq!(dp.value_for(Statistic::Average), None);
    }
}
