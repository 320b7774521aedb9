use crate::{GraphDefMetric, GraphDefPayload, MetricsBackend};
use cwmon_common::catalog::Catalog;

/// Convert a catalog into backend graph definitions, one per graph.
pub fn graph_defs(catalog: &Catalog) -> Vec<GraphDefPayload> {
    catalog
        .iter()
        .map(|graph| GraphDefPayload {
            name: format!("custom.{}", graph.key),
            display_name: graph.label.clone(),
            unit: graph.unit.as_str().to_string(),
            metrics: graph
                .metrics
                .iter()
                .map(|metric| GraphDefMetric {
                    name: graph.metric_name(metric),
                    display_name: metric.label.clone(),
                    is_stacked: false,
                })
                .collect(),
        })
        .collect()
}

/// Register the catalog's graph definitions. Errors are logged, not returned.
///
/// Returns `true` when the backend accepted the definitions.
pub async fn register(catalog: &Catalog, backend: &dyn MetricsBackend) -> bool {
    let defs = graph_defs(catalog);
    if defs.is_empty() {
        return true;
    }
    match backend.create_graph_defs(&defs).await {
        Ok(()) => {
            tracing::info!(graphs = defs.len(), "Graph definitions registered");
            true
        }
        Err(e) => {
            tracing::error!(graphs = defs.len(), error = %e, "Failed to register graph definitions");
            false
        }
    }
}
