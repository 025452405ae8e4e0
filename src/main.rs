//! substream - Certificate Transparency subdomain watcher
//!
//! Streams newly issued certificates from a certstream server and reports
//! subdomain labels as they appear.

use anyhow::Result;
use clap::{error::ErrorKind, CommandFactory, Parser};
use substream::{
    app::App,
    cli::Cli,
    config::{Config, StoreKind},
    internal_metrics,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configuration problems are reported like argument errors: usage
    // message on stderr and a non-zero exit.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        Cli::command()
            .error(ErrorKind::ValueValidation, format!("{:#}", err))
            .exit()
    });

    // RUST_LOG takes precedence over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("substream starting up...");
    log_config_summary(&config);

    if let Some(addr) = config.metrics.prometheus_addr {
        internal_metrics::install_prometheus(addr)?;
    }

    // =========================================================================
    // Shutdown Signal
    // =========================================================================
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Interrupt received. Shutting down gracefully...");
        let _ = shutdown_tx.send(true);
    });

    let app = match App::builder(config).build(shutdown_rx).await {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to start: {:#}", e);
            std::process::exit(1);
        }
    };

    app.run().await?;
    info!("All tasks shut down. Exiting.");
    Ok(())
}

fn log_config_summary(config: &Config) {
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("CertStream URL: {}", config.network.certstream_url);
    info!("Queue Capacity: {}", config.network.queue_capacity);

    let domain_count = config.filter.domains.len();
    match &config.filter.domains_file {
        Some(path) => info!(
            "Mode: targeted ({} domains + {})",
            domain_count,
            path.display()
        ),
        None if domain_count > 0 => info!("Mode: targeted ({} domains)", domain_count),
        None => info!("Mode: untargeted"),
    }

    info!(
        "Noise Rules: {} literals, {} patterns, www {}",
        config.noise.literals.len(),
        config.noise.patterns.len(),
        if config.noise.ignore_www { "ignored" } else { "kept" }
    );

    match config.deduplication.store {
        StoreKind::Memory => {
            info!("Label Store: memory (report once per run)");
            if config.realert_threshold_ignored() {
                warn!(
                    "realert_threshold = {} has no effect without a persistent store (--db)",
                    config.deduplication.realert_threshold
                );
            }
        }
        StoreKind::Sqlite => info!(
            "Label Store: sqlite at {} (re-alert every {} sightings)",
            config.deduplication.db_path.display(),
            config.deduplication.realert_threshold
        ),
    }

    info!("Output Format: {}", config.output.format);
    match &config.output.file {
        Some(path) => info!("Output File: {}", path.display()),
        None => info!("Output File: Disabled"),
    }
    info!(
        "Telegram: {}",
        if config.output.telegram.enabled {
            "Enabled"
        } else {
            "Disabled"
        }
    );
    if let Some(addr) = config.metrics.prometheus_addr {
        info!("Prometheus: {}", addr);
    }
    info!("-------------------------------------------------------");
}
