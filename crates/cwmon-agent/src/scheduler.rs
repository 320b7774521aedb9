use cwmon_backend::poster::{self, PostOutcome};
use cwmon_backend::{graphdefs, reconciler, MetricsBackend};
use cwmon_cloud::discovery;
use cwmon_cloud::fetcher::{MetricFetcher, QueryWindow};
use cwmon_cloud::CloudMetricsProvider;
use cwmon_common::catalog::catalog_for;
use cwmon_common::types::{Resource, ResourceKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub interval: Duration,
    /// `None` keeps the resource list fixed after startup.
    pub rediscovery_interval: Option<Duration>,
    pub max_concurrent: usize,
    pub register_graph_defs: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            rediscovery_interval: None,
            max_concurrent: 1,
            register_graph_defs: true,
        }
    }
}

/// Per-pass counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub resources: usize,
    pub posted_batches: usize,
    pub posted_values: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: PostOutcome) {
        self.resources += 1;
        match outcome {
            PostOutcome::Posted(count) => {
                self.posted_batches += 1;
                self.posted_values += count;
            }
            PostOutcome::SkippedUnbound | PostOutcome::SkippedEmpty => self.skipped += 1,
            PostOutcome::Failed => self.failed += 1,
        }
    }
}

/// Drives discovery, reconciliation and the periodic fetch-and-post passes.
///
/// Passes run inline in the timer loop, so two passes never overlap. A tick
/// that falls due while a pass is still running is skipped rather than queued.
pub struct Scheduler {
    provider: Arc<dyn CloudMetricsProvider>,
    backend: Arc<dyn MetricsBackend>,
    fetcher: MetricFetcher,
    kinds: Vec<ResourceKind>,
    options: SchedulerOptions,
    resources: Vec<Resource>,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(
        provider: Arc<dyn CloudMetricsProvider>,
        backend: Arc<dyn MetricsBackend>,
        kinds: Vec<ResourceKind>,
        window: QueryWindow,
        options: SchedulerOptions,
    ) -> Self {
        let fetcher = MetricFetcher::new(Arc::clone(&provider), window);
        Self {
            provider,
            backend,
            fetcher,
            kinds,
            options,
            resources: Vec::new(),
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Register graph definitions, discover every configured kind and bind
    /// hosts. Completes before the first tick is armed.
    pub async fn start(&mut self) {
        if self.state != SchedulerState::Idle {
            return;
        }

        if self.options.register_graph_defs {
            for kind in &self.kinds {
                graphdefs::register(catalog_for(*kind), self.backend.as_ref()).await;
            }
        }

        let mut resources = Vec::new();
        for kind in &self.kinds {
            let found = discovery::discover(self.provider.as_ref(), *kind).await;
            discovery::merge_discovered(&mut resources, found);
        }
        reconciler::reconcile(&mut resources, self.backend.as_ref()).await;

        let bound = resources.iter().filter(|r| r.is_bound()).count();
        tracing::info!(
            provider = self.provider.name(),
            resources = resources.len(),
            bound,
            "Startup discovery finished"
        );
        self.resources = resources;
        self.state = SchedulerState::Running;
    }

    /// One fetch-and-post sweep over every known resource, kind by kind.
    pub async fn run_pass(&self) -> PassSummary {
        let order = self.pass_order();
        let mut summary = PassSummary::default();

        if self.options.max_concurrent <= 1 {
            for resource in order {
                summary.record(process_resource(&self.fetcher, self.backend.as_ref(), resource).await);
            }
            return summary;
        }

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent));
        let mut tasks = JoinSet::new();
        for resource in order {
            let sem = Arc::clone(&semaphore);
            let fetcher = self.fetcher.clone();
            let backend = Arc::clone(&self.backend);
            let resource = resource.clone();
            tasks.spawn(async move {
                let _permit = match sem.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return PostOutcome::Failed,
                };
                process_resource(&fetcher, backend.as_ref(), &resource).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    tracing::error!(error = %e, "Resource task failed");
                    summary.resources += 1;
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// Discover again and bind newcomers. Existing bindings are never touched,
    /// and resources whose reconciliation failed earlier are retried.
    ///
    /// Returns the number of resources added.
    pub async fn rediscover(&mut self) -> usize {
        let mut added = 0;
        for kind in &self.kinds {
            let found = discovery::discover(self.provider.as_ref(), *kind).await;
            added += discovery::merge_discovered(&mut self.resources, found);
        }
        if self.resources.iter().any(|r| !r.is_bound()) {
            reconciler::reconcile(&mut self.resources, self.backend.as_ref()).await;
        }
        tracing::info!(added, total = self.resources.len(), "Re-discovery finished");
        added
    }

    /// Run until `token` is cancelled. Cancellation is observed between
    /// passes; a pass in progress always finishes.
    pub async fn run(&mut self, token: CancellationToken) {
        if token.is_cancelled() {
            self.state = SchedulerState::Stopped;
            return;
        }
        self.start().await;

        tracing::info!(
            interval_secs = self.options.interval.as_secs(),
            rediscovery_interval_secs = self.options.rediscovery_interval.map(|d| d.as_secs()),
            max_concurrent = self.options.max_concurrent,
            "Scheduler started"
        );

        let mut tick = ticker(self.options.interval);
        let mut rediscovery = self.options.rediscovery_interval.map(ticker);

        // Re-discovery is polled before the pass ticker so overrunning passes
        // cannot starve it; its ticker then idles for a full period.
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = next_tick(&mut rediscovery) => {
                    self.rediscover().await;
                }
                _ = tick.tick() => {
                    let summary = self.run_pass().await;
                    tracing::info!(
                        resources = summary.resources,
                        posted_batches = summary.posted_batches,
                        posted_values = summary.posted_values,
                        skipped = summary.skipped,
                        failed = summary.failed,
                        "Pass finished"
                    );
                }
            }
        }

        self.state = SchedulerState::Stopped;
        tracing::info!("Scheduler stopped");
    }

    fn pass_order(&self) -> Vec<&Resource> {
        self.kinds
            .iter()
            .flat_map(|kind| self.resources.iter().filter(move |r| r.kind == *kind))
            .collect()
    }
}

/// First tick one period from now; late ticks are dropped.
fn ticker(period: Duration) -> Interval {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick
}

async fn next_tick(tick: &mut Option<Interval>) {
    match tick {
        Some(tick) => {
            tick.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn process_resource(fetcher: &MetricFetcher, backend: &dyn MetricsBackend, resource: &Resource) -> PostOutcome {
    if !resource.is_bound() {
        return poster::post(resource, &[], backend).await;
    }
    let values = fetcher.fetch(resource, catalog_for(resource.kind)).await;
    poster::post(resource, &values, backend).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cwmon_backend::error::{BackendError, Result as BackendResult};
    use cwmon_backend::{GraphDefPayload, HostSummary};
    use cwmon_cloud::error::{CloudProviderError, Result as CloudResult};
    use cwmon_cloud::{Datapoint, DiscoveredResource, StatisticsQuery};
    use cwmon_common::types::MetricValue;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct StaticProvider {
        lbs: Vec<DiscoveredResource>,
        dbs: Vec<DiscoveredResource>,
    }

    #[async_trait]
    impl CloudMetricsProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn list_resources(&self, kind: ResourceKind) -> CloudResult<Vec<DiscoveredResource>> {
            match kind {
                ResourceKind::LoadBalancer => Ok(self.lbs.clone()),
                ResourceKind::ManagedDatabase if self.dbs.is_empty() => Err(CloudProviderError::RateLimited {
                    service: "rds".to_string(),
                    message: "slow down".to_string(),
                }),
                ResourceKind::ManagedDatabase => Ok(self.dbs.clone()),
            }
        }

        async fn query_statistics(&self, query: &StatisticsQuery) -> CloudResult<Vec<Datapoint>> {
            if query.metric_name == "RequestCount" {
                return Ok(vec![Datapoint {
                    timestamp: 1_700_000_000,
                    sum: Some(57.0),
                    average: None,
                }]);
            }
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct MemoryBackend {
        posts: Mutex<Vec<(String, Vec<MetricValue>)>>,
        graph_defs: Mutex<usize>,
        reject_hosts: AtomicBool,
    }

    #[async_trait]
    impl MetricsBackend for MemoryBackend {
        async fn find_hosts_by_name(&self, _name: &str) -> BackendResult<Vec<HostSummary>> {
            Ok(Vec::new())
        }

        async fn create_host(&self, name: &str) -> BackendResult<String> {
            if self.reject_hosts.load(Ordering::SeqCst) {
                return Err(BackendError::Rejected("quota".to_string()));
            }
            Ok(format!("h-{}", name))
        }

        async fn post_metric_values(&self, host_id: &str, values: &[MetricValue]) -> BackendResult<()> {
            self.posts
                .lock()
                .unwrap()
                .push((host_id.to_string(), values.to_vec()));
            Ok(())
        }

        async fn create_graph_defs(&self, defs: &[GraphDefPayload]) -> BackendResult<()> {
            *self.graph_defs.lock().unwrap() += defs.len();
            Ok(())
        }
    }

    fn discovered(name: &str) -> DiscoveredResource {
        DiscoveredResource {
            name: name.to_string(),
            address: format!("{}.example.com", name),
        }
    }

    fn scheduler(provider: StaticProvider, backend: Arc<MemoryBackend>, options: SchedulerOptions) -> Scheduler {
        Scheduler::new(
            Arc::new(provider),
            backend,
            ResourceKind::ALL.to_vec(),
            QueryWindow::default(),
            options,
        )
    }

    #[tokio::test]
    async fn start_discovers_binds_and_registers_graphs() {
        let backend = Arc::new(MemoryBackend::default());
        let provider = StaticProvider {
            lbs: vec![discovered("lb-1")],
            dbs: Vec::new(),
        };
        let mut scheduler = scheduler(provider, Arc::clone(&backend), SchedulerOptions::default());
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        scheduler.start().await;

        assert_eq!(scheduler.state(), SchedulerState::Running);
        // RDS listing failed; the load balancer survives
        assert_eq!(scheduler.resources().len(), 1);
        assert_eq!(scheduler.resources()[0].host_id.as_deref(), Some("h-lb-1.example.com"));
        assert_eq!(*backend.graph_defs.lock().unwrap(), 16);
    }

    #[tokio::test]
    async fn pass_posts_bound_resources() {
        let backend = Arc::new(MemoryBackend::default());
        let provider = StaticProvider {
            lbs: vec![discovered("lb-1")],
            dbs: Vec::new(),
        };
        let options = SchedulerOptions {
            register_graph_defs: false,
            ..Default::default()
        };
        let mut scheduler = scheduler(provider, Arc::clone(&backend), options);
        scheduler.start().await;

        let summary = scheduler.run_pass().await;

        assert_eq!(summary.posted_batches, 1);
        assert_eq!(summary.posted_values, 1);
        let posts = backend.posts.lock().unwrap();
        assert_eq!(posts[0].0, "h-lb-1.example.com");
        assert_eq!(posts[0].1[0].name, "custom.elb.requestcount.RequestCount");
        assert_eq!(posts[0].1[0].value, 57.0);
        assert_eq!(*backend.graph_defs.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn unbound_resources_are_skipped() {
        let backend = Arc::new(MemoryBackend {
            reject_hosts: AtomicBool::new(true),
            ..Default::default()
        });
        let provider = StaticProvider {
            lbs: vec![discovered("lb-1")],
            dbs: Vec::new(),
        };
        let mut scheduler = scheduler(provider, Arc::clone(&backend), SchedulerOptions::default());
        scheduler.start().await;

        let summary = scheduler.run_pass().await;

        assert_eq!(summary.skipped, 1);
        assert!(backend.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rediscover_retries_failed_reconciliation() {
        let backend = Arc::new(MemoryBackend {
            reject_hosts: AtomicBool::new(true),
            ..Default::default()
        });
        let provider = StaticProvider {
            lbs: vec![discovered("lb-1")],
            dbs: Vec::new(),
        };
        let mut scheduler = scheduler(provider, Arc::clone(&backend), SchedulerOptions::default());
        scheduler.start().await;
        assert!(!scheduler.resources()[0].is_bound());

        backend.reject_hosts.store(false, Ordering::SeqCst);
        let added = scheduler.rediscover().await;

        assert_eq!(added, 0);
        assert_eq!(scheduler.resources()[0].host_id.as_deref(), Some("h-lb-1.example.com"));
    }

    #[tokio::test]
    async fn concurrent_pass_covers_every_resource() {
        let backend = Arc::new(MemoryBackend::default());
        let provider = StaticProvider {
            lbs: (1..=5).map(|i| discovered(&format!("lb-{}", i))).collect(),
            dbs: vec![discovered("db-1")],
        };
        let options = SchedulerOptions {
            max_concurrent: 3,
            register_graph_defs: false,
            ..Default::default()
        };
        let mut scheduler = scheduler(provider, Arc::clone(&backend), options);
        scheduler.start().await;

        let summary = scheduler.run_pass().await;

        assert_eq!(summary.resources, 6);
        // Only load balancers report RequestCount
        assert_eq!(summary.posted_batches, 5);
        assert_eq!(summary.skipped, 1);
        assert_eq!(backend.posts.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn pass_order_groups_by_kind() {
        let backend = Arc::new(MemoryBackend::default());
        let provider = StaticProvider {
            lbs: vec![discovered("lb-1")],
            dbs: vec![discovered("db-1")],
        };
        let mut scheduler = scheduler(provider, backend, SchedulerOptions::default());
        scheduler.start().await;
        scheduler
            .resources
            .push(Resource::new(ResourceKind::LoadBalancer, "lb-2", "lb-2.example.com"));

        let names: Vec<&str> = scheduler.pass_order().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["lb-1", "lb-2", "db-1"]);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_startup() {
        let backend = Arc::new(MemoryBackend::default());
        let provider = StaticProvider {
            lbs: vec![discovered("lb-1")],
            dbs: Vec::new(),
        };
        let mut scheduler = scheduler(provider, Arc::clone(&backend), SchedulerOptions::default());
        let token = CancellationToken::new();
        token.cancel();

        scheduler.run(token).await;

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(scheduler.resources().is_empty());
        assert_eq!(*backend.graph_defs.lock().unwrap(), 0);
    }
}
