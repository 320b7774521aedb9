use crate::CloudMetricsProvider;
use cwmon_common::types::{Resource, ResourceKind};
use std::collections::HashSet;

/// List the resources of `kind` and normalize them into unbound [`Resource`]s.
///
/// Provider errors are logged and yield an empty list: an empty result means
/// "nothing discovered this round", not that no resources exist. Resources are
/// deduplicated by address, the first occurrence wins.
pub async fn discover(provider: &dyn CloudMetricsProvider, kind: ResourceKind) -> Vec<Resource> {
    let listed = match provider.list_resources(kind).await {
        Ok(listed) => listed,
        Err(e) => {
            tracing::error!(
                provider = provider.name(),
                kind = %kind,
                error = %e,
                "Failed to list resources"
            );
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut resources = Vec::with_capacity(listed.len());
    for item in listed {
        if item.address.is_empty() {
            tracing::warn!(kind = %kind, resource = %item.name, "Resource has no address, skipping");
            continue;
        }
        if !seen.insert(item.address.clone()) {
            tracing::warn!(
                kind = %kind,
                resource = %item.name,
                address = %item.address,
                "Duplicate resource address, keeping first"
            );
            continue;
        }
        resources.push(Resource::new(kind, item.name, item.address));
    }

    tracing::info!(
        provider = provider.name(),
        kind = %kind,
        count = resources.len(),
        "Discovered resources"
    );
    resources
}

/// Merge a fresh discovery result into `known`.
///
/// Entries already present (by address) are left untouched so their host
/// bindings survive; new addresses are appended. Returns the number added.
pub fn merge_discovered(known: &mut Vec<Resource>, discovered: Vec<Resource>) -> usize {
    let mut seen: HashSet<String> = known.iter().map(|r| r.address.clone()).collect();
    let before = known.len();
    for resource in discovered {
        if seen.insert(resource.address.clone()) {
            known.push(resource);
        }
    }
    known.len() - before
}
