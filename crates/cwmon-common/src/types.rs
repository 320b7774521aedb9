use serde::{Deserialize, Serialize};

/// Kind of cloud resource whose counters are relayed.
///
/// # Examples
///
/// ```
/// use cwmon_common::types::ResourceKind;
///
/// let kind: ResourceKind = "load-balancer".parse().unwrap();
/// assert_eq!(kind, ResourceKind::LoadBalancer);
/// assert_eq!(kind.namespace(), "AWS/ELB");
/// assert_eq!(kind.to_string(), "load-balancer");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    #[serde(alias = "elb")]
    LoadBalancer,
    #[serde(alias = "rds")]
    ManagedDatabase,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::LoadBalancer, ResourceKind::ManagedDatabase];

    /// CloudWatch namespace holding this kind's counters.
    pub fn namespace(&self) -> &'static str {
        match self {
            ResourceKind::LoadBalancer => "AWS/ELB",
            ResourceKind::ManagedDatabase => "AWS/RDS",
        }
    }

    /// Dimension name that filters a statistics query down to one resource.
    pub fn dimension_name(&self) -> &'static str {
        match self {
            ResourceKind::LoadBalancer => "LoadBalancerName",
            ResourceKind::ManagedDatabase => "DBInstanceIdentifier",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::LoadBalancer => write!(f, "load-balancer"),
            ResourceKind::ManagedDatabase => write!(f, "managed-database"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "load-balancer" | "elb" => Ok(ResourceKind::LoadBalancer),
            "managed-database" | "rds" => Ok(ResourceKind::ManagedDatabase),
            _ => Err(format!("unknown resource kind: {s}")),
        }
    }
}

/// A monitored cloud object and the backend host it is bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub kind: ResourceKind,
    /// Provider-side name, also the dimension value of statistics queries.
    pub name: String,
    /// Stable identifier used to find or create the backend host (DNS name, endpoint).
    pub address: String,
    /// Backend host id; `None` until reconciliation succeeds.
    pub host_id: Option<String>,
}

impl Resource {
    pub fn new(kind: ResourceKind, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            address: address.into(),
            host_id: None,
        }
    }

    /// Bind the backend host id. A resource that is already bound keeps its id.
    ///
    /// Returns `true` when the binding was applied.
    pub fn bind_host(&mut self, host_id: impl Into<String>) -> bool {
        if self.host_id.is_some() {
            return false;
        }
        let host_id = host_id.into();
        if host_id.is_empty() {
            return false;
        }
        self.host_id = Some(host_id);
        true
    }

    pub fn is_bound(&self) -> bool {
        self.host_id.is_some()
    }
}

/// Aggregation applied by the provider to raw counters over one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Statistic {
    #[default]
    Average,
    Sum,
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Average => "Average",
            Statistic::Sum => "Sum",
        }
    }
}

impl std::fmt::Display for Statistic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display unit of a graph, spelled the way the backend expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphUnit {
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "percentage")]
    Percentage,
    #[serde(rename = "bytes")]
    Bytes,
    #[serde(rename = "bytes/sec")]
    BytesPerSec,
    #[serde(rename = "iops")]
    Iops,
}

impl GraphUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphUnit::Integer => "integer",
            GraphUnit::Float => "float",
            GraphUnit::Percentage => "percentage",
            GraphUnit::Bytes => "bytes",
            GraphUnit::BytesPerSec => "bytes/sec",
            GraphUnit::Iops => "iops",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Provider metric name, e.g. `RequestCount`.
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub statistic: Statistic,
}

impl MetricDefinition {
    /// A metric fetched with the default statistic (`Average`).
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            statistic: Statistic::default(),
        }
    }

    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = statistic;
        self
    }
}

/// A named group of related metrics sharing a unit and label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    /// Globally unique key, used as the namespace of emitted metric names.
    pub key: String,
    pub label: String,
    pub unit: GraphUnit,
    pub metrics: Vec<MetricDefinition>,
}

impl GraphDefinition {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        unit: GraphUnit,
        metrics: Vec<MetricDefinition>,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            unit,
            metrics,
        }
    }

    /// Backend metric name for one of this graph's metrics: `custom.<key>.<metric>`.
    pub fn metric_name(&self, metric: &MetricDefinition) -> String {
        format!("custom.{}.{}", self.key, metric.name)
    }
}

/// Latest value of one metric, ready to be posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub name: String,
    pub value: f64,
    /// Unix seconds of the selected data point.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_host_is_idempotent() {
        let mut resource = Resource::new(ResourceKind::LoadBalancer, "lb-1", "lb-1.example.com");
        assert!(!resource.is_bound());

        assert!(resource.bind_host("h-1"));
        assert!(!resource.bind_host("h-2"));
        assert_eq!(resource.host_id.as_deref(), Some("h-1"));
    }

    #[test]
    fn bind_host_rejects_empty_id() {
        let mut resource = Resource::new(ResourceKind::ManagedDatabase, "db-1", "db-1.rds.local");
        assert!(!resource.bind_host(""));
        assert!(resource.host_id.is_none());
    }

    #[test]
    fn statistic_defaults_to_average() {
        let metric = MetricDefinition::new("Latency", "Latency");
        assert_eq!(metric.statistic, Statistic::Average);

        let parsed: MetricDefinition =
            serde_json::from_value(serde_json::json!({"name": "CPUUtilization", "label": "CPU"}))
                .unwrap();
        assert_eq!(parsed.statistic, Statistic::Average);
    }

    #[test]
    fn metric_name_is_namespaced_by_graph_key() {
        let metric = MetricDefinition::new("RequestCount", "Request Count").with_statistic(Statistic::Sum);
        let graph = GraphDefinition::new("elb.requestcount", "Request Count", GraphUnit::Integer, vec![metric.clone()]);
        assert_eq!(graph.metric_name(&metric), "custom.elb.requestcount.RequestCount");
    }

    #[test]
    fn resource_kind_parses_aliases() {
        assert_eq!("elb".parse::<ResourceKind>().unwrap(), ResourceKind::LoadBalancer);
        assert_eq!("RDS".parse::<ResourceKind>().unwrap(), ResourceKind::ManagedDatabase);
        assert!("s3".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn graph_unit_serializes_backend_spelling() {
        assert_eq!(serde_json::to_value(GraphUnit::BytesPerSec).unwrap(), "bytes/sec");
        assert_eq!(GraphUnit::Integer.as_str(), "integer");
    }
}
