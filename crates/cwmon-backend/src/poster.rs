use crate::MetricsBackend;
use cwmon_common::types::{MetricValue, Resource};

/// Log target of the per-value audit trail.
pub const AUDIT_TARGET: &str = "cwmon::audit";

/// What happened to one resource's batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// Resource has no host id; nothing was sent.
    SkippedUnbound,
    /// No values to send.
    SkippedEmpty,
    /// Batch accepted; carries the number of values.
    Posted(usize),
    /// Backend rejected the batch or was unreachable; the batch is dropped.
    Failed,
}

/// Submit `values` for the resource's host as a single batch.
///
/// Never retries and never buffers: a failed batch is logged and dropped.
pub async fn post(resource: &Resource, values: &[MetricValue], backend: &dyn MetricsBackend) -> PostOutcome {
    let Some(host_id) = resource.host_id.as_deref() else {
        tracing::warn!(
            resource = %resource.name,
            address = %resource.address,
            dropped = values.len(),
            "Resource is not bound to a host, skipping post"
        );
        return PostOutcome::SkippedUnbound;
    };

    if values.is_empty() {
        tracing::debug!(resource = %resource.name, host_id, "No metric values to post");
        return PostOutcome::SkippedEmpty;
    }

    match backend.post_metric_values(host_id, values).await {
        Ok(()) => {
            for value in values {
                tracing::info!(
                    target: AUDIT_TARGET,
                    host_id,
                    metric = %value.name,
                    value = value.value,
                    timestamp = value.timestamp,
                    "Metric value posted"
                );
            }
            tracing::info!(
                resource = %resource.name,
                host_id,
                count = values.len(),
                "Metric batch posted"
            );
            PostOutcome::Posted(values.len())
        }
        Err(e) => {
            tracing::error!(
                resource = %resource.name,
                host_id,
                count = values.len(),
                error = %e,
                "Failed to post metric batch, dropping"
            );
            PostOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, Result};
    use crate::{GraphDefPayload, HostSummary};
    use async_trait::async_trait;
    use cwmon_common::types::ResourceKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        posts: Mutex<Vec<(String, Vec<MetricValue>)>>,
        fail: bool,
    }

    #[async_trait]
    impl MetricsBackend for RecordingBackend {
        async fn find_hosts_by_name(&self, _name: &str) -> Result<Vec<HostSummary>> {
            Ok(Vec::new())
        }

        async fn create_host(&self, _name: &str) -> Result<String> {
            Ok("h-1".to_string())
        }

        async fn post_metric_values(&self, host_id: &str, values: &[MetricValue]) -> Result<()> {
            if self.fail {
                return Err(BackendError::HttpError {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            self.posts
                .lock()
                .unwrap()
                .push((host_id.to_string(), values.to_vec()));
            Ok(())
        }

        async fn create_graph_defs(&self, _defs: &[GraphDefPayload]) -> Result<()> {
            Ok(())
        }
    }

    fn value() -> MetricValue {
        MetricValue {
            name: "custom.elb.requestcount.RequestCount".to_string(),
            value: 57.0,
            timestamp: 1_700_000_000,
        }
    }

    fn bound() -> Resource {
        let mut resource = Resource::new(ResourceKind::LoadBalancer, "lb-1", "lb-1.example.com");
        resource.bind_host("h-42");
        resource
    }

    #[tokio::test]
    async fn posts_single_batch_to_bound_host() {
        let backend = RecordingBackend::default();

        let outcome = post(&bound(), &[value()], &backend).await;

        assert_eq!(outcome, PostOutcome::Posted(1));
        let posts = backend.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "h-42");
        assert_eq!(posts[0].1, vec![value()]);
    }

    #[tokio::test]
    async fn unbound_resource_is_never_posted() {
        let backend = RecordingBackend::default();
        let resource = Resource::new(ResourceKind::LoadBalancer, "lb-1", "lb-1.example.com");

        let outcome = post(&resource, &[value()], &backend).await;

        assert_eq!(outcome, PostOutcome::SkippedUnbound);
        assert!(backend.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_batch_is_not_sent() {
        let backend = RecordingBackend::default();
        assert_eq!(post(&bound(), &[], &backend).await, PostOutcome::SkippedEmpty);
        assert!(backend.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn backend_error_drops_batch() {
        let backend = RecordingBackend {
            fail: true,
            ..Default::default()
        };
        assert_eq!(post(&bound(), &[value()], &backend).await, PostOutcome::Failed);
    }
}
