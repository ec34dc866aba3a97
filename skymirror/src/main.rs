//! skymirror - SkyPortal source watcher
//!
//! Long-running service that polls a SkyPortal instance for newly saved
//! sources and mirrors each one as a folder hierarchy on an ownCloud
//! share, alerting an operator Slack channel on warnings and errors.
//!
//! Exit code 0 on graceful shutdown; non-zero on unrecoverable
//! configuration or state-store errors at startup.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skymirror::clients::{OwnCloudClient, SkyPortalClient, SlackClient};
use skymirror::folder_path::FolderPathBuilder;
use skymirror::notify::{AlertClient, NotificationRouter};
use skymirror::resolver::TelescopeResolver;
use skymirror::scheduler::{Scheduler, SchedulerOptions};
use skymirror::state::StateStore;
use skymirror::upload::UploadOrchestrator;
use skymirror::WatcherConfig;

/// Command-line arguments for skymirror
#[derive(Parser, Debug)]
#[command(name = "skymirror")]
#[command(about = "Watch SkyPortal for new sources and mirror them as ownCloud folders")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "skymirror.toml", env = "SKYMIRROR_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skymirror=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting skymirror source watcher");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = WatcherConfig::load(&args.config).context("configuration error")?;
    info!("Catalog: {}", config.skyportal_url);
    info!("Groups: {:?}", config.group_ids);
    info!(
        "Resolution mode: {}",
        if config.use_telescope_list {
            "static list"
        } else {
            "dynamic lookup"
        }
    );

    let state = StateStore::open(&config.state_db)
        .await
        .context("state store error")?;

    let catalog = Arc::new(
        SkyPortalClient::new(
            config.skyportal_url.clone(),
            config.skyportal_token.clone(),
            config.group_ids.clone(),
            config.request_timeout,
        )
        .context("catalog client error")?,
    );

    let storage = Arc::new(
        OwnCloudClient::new(
            config.owncloud_base_url.clone(),
            config.owncloud_username.clone(),
            config.owncloud_token.clone(),
            config.owncloud_user_id.clone(),
            config.request_timeout,
        )
        .context("storage client error")?,
    );

    let alert: Option<Arc<dyn AlertClient>> = match &config.slack_token {
        Some(token) => {
            let channel = config.slack_channel();
            info!("Alert channel: {}", channel);
            Some(Arc::new(
                SlackClient::new(token.clone(), channel, config.request_timeout)
                    .context("alert client error")?,
            ))
        }
        None => {
            info!("No Slack token configured, alert notifications disabled");
            None
        }
    };
    let notifier = NotificationRouter::new(alert);

    let resolver = if config.use_telescope_list {
        TelescopeResolver::with_static_list(config.telescope_list.clone(), catalog.clone())
    } else {
        TelescopeResolver::dynamic(catalog.clone())
    };

    let paths = FolderPathBuilder::new(&config.save_path, config.source_tag.as_deref());
    let uploader = UploadOrchestrator::new(storage, config.backoff.clone());

    let start_time = config
        .start_time
        .unwrap_or_else(skymirror_common::time::default_start_time);

    let mut scheduler = Scheduler::new(
        catalog,
        resolver,
        paths,
        uploader,
        state,
        notifier,
        SchedulerOptions {
            poll_interval: config.poll_interval,
            start_time,
            retention: config.retention,
        },
    )
    .await
    .context("scheduler initialization error")?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    scheduler.run(cancel).await.context("watcher loop error")?;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
