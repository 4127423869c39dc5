use anyhow::Context;
use background_service::{HarvestPipeline, PublishPipeline, Scheduler, StageSelection};
use bluesky_client::BlueskyClient;
use clap::Parser;
use llm_interface::OpenAiProvider;
use media_fetcher::MediaDownloader;
use reddit_client::{RedditClient, RedditConfig};
use skyrelay_core::{prepare_output_dir, AppConfig, ConfigError, Credentials};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use unit_store::FsUnitStore;

const DEFAULT_LOG_FILTER: &str = "skyrelay=info,skyrelay_core=info,reddit_client=info,\
llm_interface=info,media_fetcher=info,unit_store=info,bluesky_client=info,background_service=info";

/// Relays Reddit posts to Bluesky.
#[derive(Debug, Parser)]
#[command(name = "skyrelay", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "skyrelay.toml")]
    config: PathBuf,

    /// Run one harvest pass and one publish pass, then exit
    #[arg(long)]
    once: bool,

    /// Only harvest; never publish
    #[arg(long, conflicts_with = "publish_only")]
    harvest_only: bool,

    /// Only publish units already on disk
    #[arg(long)]
    publish_only: bool,
}

impl Cli {
    fn stages(&self) -> StageSelection {
        if self.harvest_only {
            StageSelection::HarvestOnly
        } else if self.publish_only {
            StageSelection::PublishOnly
        } else {
            StageSelection::Both
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    info!("Starting skyrelay with {}", cli.config.display());

    let (config, credentials) = match load_startup(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e.user_friendly_message());
            std::process::exit(1);
        }
    };
    let settings = &config.settings;

    let reddit = RedditClient::new(RedditConfig::from_credentials(&credentials))
        .context("building Reddit client")?;
    let media = MediaDownloader::from_config(settings).context("building media downloader")?;
    let summarizer =
        OpenAiProvider::from_credentials(&credentials).context("building OpenAI client")?;
    let bluesky =
        BlueskyClient::from_credentials(&credentials).context("building Bluesky client")?;
    let store = Arc::new(FsUnitStore::new(&settings.output_dir));

    let harvest = Arc::new(HarvestPipeline::from_config(
        Arc::new(reddit),
        Arc::new(media),
        Arc::new(summarizer),
        store.clone(),
        settings,
    ));
    let publish = Arc::new(PublishPipeline::from_config(
        Arc::new(bluesky),
        store,
        settings,
    ));
    let scheduler = Scheduler::new(
        harvest,
        publish,
        config.queries.clone(),
        settings.harvest_interval(),
        settings.publish_interval(),
    )
    .with_stages(cli.stages());

    if cli.once {
        let (harvested, published) = scheduler.run_once().await;
        if let Some(report) = harvested {
            info!(
                "Harvest: {} created, {} duplicates, {} skipped, {} failed",
                report.created, report.duplicates, report.skipped, report.failed
            );
        }
        if let Some(report) = published {
            info!(
                "Publish: {} published, {} failed, {} deferred",
                report.published, report.failed, report.deferred
            );
        }
        return Ok(());
    }

    let state = scheduler.run(shutdown_signal()).await;
    info!(
        "Stopped (last harvest: {:?}, last publish: {:?})",
        state.last_harvest_at, state.last_publish_at
    );
    Ok(())
}

fn load_startup(cli: &Cli) -> Result<(AppConfig, Credentials), ConfigError> {
    let config = AppConfig::load(&cli.config)?;
    prepare_output_dir(&config.settings.output_dir)?;
    let credentials = Credentials::from_env()?;
    info!(
        "Loaded {} sources, output in {}",
        config.queries.len(),
        config.settings.output_dir.display()
    );
    Ok((config, credentials))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down gracefully"),
        () = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}
