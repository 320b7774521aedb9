use anyhow::{bail, Context};
use cwmon_backend::mackerel::DEFAULT_BASE_URL;
use cwmon_cloud::fetcher::QueryWindow;
use cwmon_common::types::ResourceKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Agent settings. Every field has a default, so the file is optional.
///
/// Credentials are not part of this file; they come from flags or the
/// environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Seconds between two passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Seconds between two re-discoveries; 0 disables re-discovery.
    #[serde(default)]
    pub rediscovery_interval_secs: u64,
    /// Resources processed at once within a pass; 1 is strictly sequential.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_resource_kinds")]
    pub resource_kinds: Vec<ResourceKind>,
    #[serde(default = "default_register_graph_defs")]
    pub register_graph_defs: bool,
    #[serde(default = "default_backend_base_url")]
    pub backend_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Width of the trailing query window.
    #[serde(default = "default_window_secs")]
    pub window_secs: u32,
    #[serde(default = "default_period_secs")]
    pub period_secs: u32,
}

fn default_region() -> String {
    "ap-northeast-1".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    1
}

fn default_resource_kinds() -> Vec<ResourceKind> {
    ResourceKind::ALL.to_vec()
}

fn default_register_graph_defs() -> bool {
    true
}

fn default_backend_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_window_secs() -> u32 {
    120
}

fn default_period_secs() -> u32 {
    60
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            interval_secs: default_interval_secs(),
            rediscovery_interval_secs: 0,
            max_concurrent: default_max_concurrent(),
            resource_kinds: default_resource_kinds(),
            register_graph_defs: default_register_graph_defs(),
            backend_base_url: default_backend_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            window_secs: default_window_secs(),
            period_secs: default_period_secs(),
        }
    }
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path))?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.region.trim().is_empty() {
            bail!("region must not be empty");
        }
        if self.interval_secs == 0 {
            bail!("interval_secs must be greater than 0");
        }
        if self.max_concurrent == 0 {
            bail!("max_concurrent must be greater than 0");
        }
        if self.resource_kinds.is_empty() {
            bail!("resource_kinds must list at least one kind");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than 0");
        }
        if self.period_secs == 0 || self.period_secs > self.window_secs {
            bail!(
                "period_secs ({}) must be between 1 and window_secs ({})",
                self.period_secs,
                self.window_secs
            );
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn rediscovery_interval(&self) -> Option<Duration> {
        (self.rediscovery_interval_secs > 0).then(|| Duration::from_secs(self.rediscovery_interval_secs))
    }

    pub fn query_window(&self) -> QueryWindow {
        QueryWindow {
            width_secs: self.window_secs,
            period_secs: self.period_secs,
        }
    }

    /// Resource kinds in configured order, without repeats.
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds = Vec::with_capacity(self.resource_kinds.len());
        for kind in &self.resource_kinds {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }
}
