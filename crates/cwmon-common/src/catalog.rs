//! Static metric catalogs, one per [`ResourceKind`].
//!
//! Each catalog lists the graphs relayed for a kind of resource, in a fixed
//! order. Catalogs are built once on first use and only handed out by shared
//! reference.
//!
//! Metric references:
//! - <http://docs.aws.amazon.com/AmazonCloudWatch/latest/DeveloperGuide/elb-metricscollected.html>
//! - <http://docs.aws.amazon.com/AmazonCloudWatch/latest/DeveloperGuide/rds-metricscollected.html>

use crate::types::{GraphDefinition, GraphUnit, MetricDefinition, ResourceKind, Statistic};
use std::sync::LazyLock;

/// Ordered, immutable set of graph definitions for one resource kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    graphs: Vec<GraphDefinition>,
}

impl Catalog {
    pub fn new(graphs: Vec<GraphDefinition>) -> Self {
        Self { graphs }
    }

    pub fn get(&self, key: &str) -> Option<&GraphDefinition> {
        self.graphs.iter().find(|g| g.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GraphDefinition> {
        self.graphs.iter()
    }

    /// Number of graphs.
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Total number of metrics across all graphs, i.e. queries per resource per pass.
    pub fn metric_count(&self) -> usize {
        self.graphs.iter().map(|g| g.metrics.len()).sum()
    }
}

fn graph(
    key: &str,
    label: &str,
    unit: GraphUnit,
    statistic: Statistic,
    metrics: &[(&str, &str)],
) -> GraphDefinition {
    GraphDefinition::new(
        key,
        label,
        unit,
        metrics
            .iter()
            .map(|(name, label)| MetricDefinition::new(*name, *label).with_statistic(statistic))
            .collect(),
    )
}

static LOAD_BALANCER_CATALOG: LazyLock<Catalog> = LazyLock::new(|| {
    use Statistic::{Average, Sum};
    Catalog::new(vec![
        graph(
            "elb.hostcount",
            "Host Count",
            GraphUnit::Integer,
            Average,
            &[("HealthyHostCount", "Healthy Host Count"), ("UnHealthyHostCount", "UnHealthy Host Count")],
        ),
        graph(
            "elb.httpcode",
            "HTTP Code Count",
            GraphUnit::Integer,
            Sum,
            &[
                ("HTTPCode_Backend_2XX", "Backend 2XX"),
                ("HTTPCode_Backend_3XX", "Backend 3XX"),
                ("HTTPCode_Backend_4XX", "Backend 4XX"),
                ("HTTPCode_Backend_5XX", "Backend 5XX"),
                ("HTTPCode_ELB_4XX", "ELB 4XX"),
                ("HTTPCode_ELB_5XX", "ELB 5XX"),
            ],
        ),
        graph("elb.latency", "Latency", GraphUnit::Float, Average, &[("Latency", "Latency")]),
        graph("elb.requestcount", "Request Count", GraphUnit::Integer, Sum, &[("RequestCount", "Request Count")]),
    ])
});

static MANAGED_DATABASE_CATALOG: LazyLock<Catalog> = LazyLock::new(|| {
    use Statistic::Average;
    Catalog::new(vec![
        graph("rds.cpu", "RDS CPU Utilization", GraphUnit::Percentage, Average, &[("CPUUtilization", "CPU Utilization")]),
        graph(
            "rds.cpucredit",
            "RDS CPU Credit",
            GraphUnit::Float,
            Average,
            &[("CPUCreditUsage", "Usage"), ("CPUCreditBalance", "Balance")],
        ),
        graph(
            "rds.memory",
            "RDS Memory",
            GraphUnit::Bytes,
            Average,
            &[("FreeableMemory", "Free"), ("SwapUsage", "Swap Usage")],
        ),
        graph(
            "rds.network",
            "RDS Network",
            GraphUnit::BytesPerSec,
            Average,
            &[("NetworkReceiveThroughput", "Receive"), ("NetworkTransmitThroughput", "Transmit")],
        ),
        graph("rds.binlogdiskusage", "RDS BinLog Disk Usage", GraphUnit::Bytes, Average, &[("BinLogDiskUsage", "Usage")]),
        graph(
            "rds.databaseconnections",
            "RDS Connections",
            GraphUnit::Integer,
            Average,
            &[("DatabaseConnections", "Connections")],
        ),
        graph("rds.diskiops", "RDS Disk IOPS", GraphUnit::Iops, Average, &[("ReadIOPS", "Read"), ("WriteIOPS", "Write")]),
        graph("rds.diskqueue", "RDS Disk Queue", GraphUnit::Float, Average, &[("DiskQueueDepth", "Depth")]),
        graph("rds.disk", "RDS Free Storage Space", GraphUnit::Bytes, Average, &[("FreeStorageSpace", "Free Space")]),
        graph("rds.replicalag", "RDS Replica Lag", GraphUnit::Float, Average, &[("ReplicaLag", "Lag")]),
        graph(
            "rds.disklatency",
            "RDS Disk Latency",
            GraphUnit::Float,
            Average,
            &[("ReadLatency", "Read"), ("WriteLatency", "Write")],
        ),
        graph(
            "rds.diskthroughput",
            "RDS Disk Throughput",
            GraphUnit::BytesPerSec,
            Average,
            &[("ReadThroughput", "Read"), ("WriteThroughput", "Write")],
        ),
    ])
});

/// Catalog of graphs relayed for `kind`.
pub fn catalog_for(kind: ResourceKind) -> &'static Catalog {
    match kind {
        ResourceKind::LoadBalancer => &LOAD_BALANCER_CATALOG,
        ResourceKind::ManagedDatabase => &MANAGED_DATABASE_CATALOG,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn graph_keys_are_unique_across_catalogs() {
        let mut keys = HashSet::new();
        for kind in ResourceKind::ALL {
            for graph in catalog_for(kind).iter() {
                assert!(keys.insert(graph.key.clone()), "duplicate graph key {}", graph.key);
            }
        }
    }

    #[test]
    fn graph_keys_carry_kind_prefix() {
        for graph in catalog_for(ResourceKind::LoadBalancer).iter() {
            assert!(graph.key.starts_with("elb."));
        }
        for graph in catalog_for(ResourceKind::ManagedDatabase).iter() {
            assert!(graph.key.starts_with("rds."));
        }
    }

    #[test]
    fn load_balancer_counts_are_summed() {
        let catalog = catalog_for(ResourceKind::LoadBalancer);
        let requests = catalog.get("elb.requestcount").unwrap();
        assert_eq!(requests.metrics[0].name, "RequestCount");
        assert_eq!(requests.metrics[0].statistic, Statistic::Sum);

        let httpcode = catalog.get("elb.httpcode").unwrap();
        assert_eq!(httpcode.metrics.len(), 6);
        assert!(httpcode.metrics.iter().all(|m| m.statistic == Statistic::Sum));

        let hosts = catalog.get("elb.hostcount").unwrap();
        assert_eq!(hosts.metrics.len(), 2);
        assert!(hosts.metrics.iter().all(|m| m.statistic == Statistic::Average));
        assert_eq!(hosts.metrics[1].label, "UnHealthy Host Count");

        let latency = catalog.get("elb.latency").unwrap();
        assert_eq!(latency.metrics[0].statistic, Statistic::Average);
        assert_eq!(latency.unit, GraphUnit::Float);
    }

    #[test]
    fn database_catalog_uses_average() {
        let catalog = catalog_for(ResourceKind::ManagedDatabase);
        assert_eq!(catalog.len(), 12);
        assert_eq!(catalog.metric_count(), 18);
        assert!(catalog
            .iter()
            .flat_map(|g| g.metrics.iter())
            .all(|m| m.statistic == Statistic::Average));
        assert!(catalog.get("rds.replicalag").is_some());
        assert!(catalog.get("elb.latency").is_none());
    }

    #[test]
    fn catalog_order_is_declaration_order() {
        let keys: Vec<_> = catalog_for(ResourceKind::LoadBalancer)
            .iter()
            .map(|g| g.key.as_str())
            .collect();
        assert_eq!(keys, ["elb.hostcount", "elb.httpcode", "elb.latency", "elb.requestcount"]);
    }
}
