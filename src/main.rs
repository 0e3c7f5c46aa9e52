//! pipeline-monitor - observability and alerting daemon
//!
//! Loads the pipeline configuration, runs the background tasks and waits for
//! Ctrl-C, then stops with a final event flush.

#![allow(missing_docs)]

use anyhow::Context;
use clap::Parser;
use pipeline_monitor::monitoring::events::Event;
use pipeline_monitor::monitoring::metrics::ResourceSampler;
use pipeline_monitor::utils::logging::{LogFormat, init_tracing};
use pipeline_monitor::{ObservabilityConfig, ObservabilityService};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "pipeline-monitor", version, about)]
struct Args {
    /// YAML configuration file; defaults plus environment overrides when omitted
    #[arg(short, long, env = "PIPELINE_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Process log format (text or json)
    #[arg(long, default_value = "text", env = "PIPELINE_MONITOR_LOG_FORMAT")]
    log_format: LogFormat,

    /// Default tracing directive when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.log_format, &args.log_level);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_ref()).await?;
    if args.check {
        println!("configuration is valid");
        return Ok(());
    }

    let service_name = config.service_name.clone();
    let service = ObservabilityService::new(config, sampler())
        .await
        .context("failed to initialize observability service")?;
    service.start().context("failed to start background tasks")?;
    service.emit(Event::info(&service_name, "pipeline monitor started"));
    let build = pipeline_monitor::build_info();
    info!(
        version = build.version,
        git_hash = build.git_hash,
        rustc = build.rust_version,
        "pipeline-monitor running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    service.emit(Event::info(&service_name, "pipeline monitor stopping"));
    service.stop().await.context("final event flush failed")?;
    Ok(())
}

async fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ObservabilityConfig> {
    let config = match path {
        Some(path) => ObservabilityConfig::from_file(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))?
            .with_env_overrides()?,
        None => ObservabilityConfig::from_env()?,
    };
    Ok(config)
}

#[cfg(feature = "metrics")]
fn sampler() -> Arc<dyn ResourceSampler> {
    Arc::new(pipeline_monitor::monitoring::metrics::SysinfoSampler::new())
}

#[cfg(not(feature = "metrics"))]
fn sampler() -> Arc<dyn ResourceSampler> {
    Arc::new(pipeline_monitor::monitoring::metrics::StaticSampler::default())
}
