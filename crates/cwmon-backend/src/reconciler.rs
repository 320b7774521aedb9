use crate::{HostSummary, MetricsBackend};
use cwmon_common::types::Resource;
use std::collections::HashMap;

/// Outcome counters of one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Bound to an existing host.
    pub found: usize,
    /// Bound to a newly created host.
    pub created: usize,
    /// Already bound before this run.
    pub unchanged: usize,
    /// Left unbound because a backend call failed.
    pub failed: usize,
}

/// Bind every unbound resource to a backend host, creating hosts as needed.
///
/// Lookup always precedes creation. Within one call, an address that was
/// already resolved is reused, so duplicate addresses never create two hosts.
/// Failures are logged per resource; the affected resource stays unbound.
pub async fn reconcile(resources: &mut [Resource], backend: &dyn MetricsBackend) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();
    let mut resolved: HashMap<String, String> = resources
        .iter()
        .filter_map(|r| r.host_id.clone().map(|id| (r.address.clone(), id)))
        .collect();

    for resource in resources.iter_mut() {
        if resource.is_bound() {
            summary.unchanged += 1;
            continue;
        }

        if let Some(host_id) = resolved.get(&resource.address) {
            resource.bind_host(host_id.clone());
            summary.found += 1;
            continue;
        }

        let hosts = match backend.find_hosts_by_name(&resource.address).await {
            Ok(hosts) => hosts,
            Err(e) => {
                tracing::error!(
                    resource = %resource.name,
                    address = %resource.address,
                    error = %e,
                    "Host lookup failed"
                );
                summary.failed += 1;
                continue;
            }
        };

        let host_id = match hosts.as_slice() {
            [] => match backend.create_host(&resource.address).await {
                Ok(id) => {
                    tracing::info!(resource = %resource.name, host_id = %id, "Host created");
                    summary.created += 1;
                    id
                }
                Err(e) => {
                    tracing::error!(
                        resource = %resource.name,
                        address = %resource.address,
                        error = %e,
                        "Host creation failed"
                    );
                    summary.failed += 1;
                    continue;
                }
            },
            [host] => {
                tracing::info!(resource = %resource.name, host_id = %host.id, host = %host.name, "Host found");
                summary.found += 1;
                host.id.clone()
            }
            many => {
                let chosen = newest_host(many);
                let candidates: Vec<&str> = many.iter().map(|h| h.id.as_str()).collect();
                tracing::warn!(
                    resource = %resource.name,
                    address = %resource.address,
                    candidates = ?candidates,
                    host_id = %chosen.id,
                    "Multiple hosts match address, binding the most recently created"
                );
                summary.found += 1;
                chosen.id.clone()
            }
        };

        if resource.bind_host(host_id.clone()) {
            resolved.insert(resource.address.clone(), host_id);
        } else {
            tracing::error!(resource = %resource.name, "Backend returned an empty host id");
            summary.failed += 1;
        }
    }

    tracing::info!(
        found = summary.found,
        created = summary.created,
        unchanged = summary.unchanged,
        failed = summary.failed,
        "Host reconciliation finished"
    );
    summary
}

/// Host with the greatest `created_at`; ties and missing timestamps keep backend order.
fn newest_host(hosts: &[HostSummary]) -> &HostSummary {
    let mut chosen = &hosts[0];
    for host in &hosts[1..] {
        if host.created_at.unwrap_or(i64::MIN) > chosen.created_at.unwrap_or(i64::MIN) {
            chosen = host;
        }
    }
    chosen
}
