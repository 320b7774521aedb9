use anyhow::{Context, Result};
use clap::Parser;
use cwmon_agent::config::AgentConfig;
use cwmon_agent::scheduler::{Scheduler, SchedulerOptions};
use cwmon_backend::mackerel::MackerelClient;
use cwmon_cloud::aws::{AwsConfig, AwsProvider};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Relay CloudWatch metrics of load balancers and databases to Mackerel.
#[derive(Parser, Debug)]
#[command(name = "cwmon-agent", version, about)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// AWS region, overrides the configuration file
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    aws_key_id: String,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    aws_secret_key: String,

    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    aws_session_token: Option<String>,

    #[arg(long, env = "MACKEREL_APIKEY", hide_env_values = true)]
    mackerel_api_key: String,

    /// Log AWS request and response bodies
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut filter = EnvFilter::from_default_env().add_directive("cwmon=info".parse()?);
    if cli.debug {
        filter = filter.add_directive("cwmon_cloud=debug".parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };
    if let Some(region) = cli.region {
        config.region = region;
    }
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        region = %config.region,
        interval_secs = config.interval_secs,
        kinds = ?config.kinds(),
        "cwmon-agent starting"
    );

    let provider = AwsProvider::new(AwsConfig {
        access_key_id: cli.aws_key_id,
        secret_access_key: cli.aws_secret_key,
        session_token: cli.aws_session_token.filter(|t| !t.is_empty()),
        region: config.region.clone(),
        request_timeout_secs: config.request_timeout_secs,
    })
    .context("Failed to build AWS provider")?;
    let backend = MackerelClient::new(
        &config.backend_base_url,
        &cli.mackerel_api_key,
        config.request_timeout_secs,
    )
    .context("Failed to build Mackerel client")?;

    let mut scheduler = Scheduler::new(
        Arc::new(provider),
        Arc::new(backend),
        config.kinds(),
        config.query_window(),
        SchedulerOptions {
            interval: config.interval(),
            rediscovery_interval: config.rediscovery_interval(),
            max_concurrent: config.max_concurrent,
            register_graph_defs: config.register_graph_defs,
        },
    );

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, stopping after the current pass");
        shutdown.cancel();
    });

    scheduler.run(token).await;
    tracing::info!("cwmon-agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
