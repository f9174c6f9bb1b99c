//! cifra-api - chord sheet REST backend
//!
//! Startup: initialize logging, resolve configuration, open the database and
//! its schema, then serve the song API until Ctrl-C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cifra_common::config::{ConfigOverrides, ConfigResolver, Environment};
use cifra_common::db::{Gateway, LazyPool};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use cifra_api::{build_router, internal_base_path, AppState, RouterOptions};

/// Command-line arguments for cifra-api
#[derive(Parser, Debug)]
#[command(name = "cifra-api")]
#[command(about = "Chord sheet (song) REST backend")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// development, production or test
    #[arg(short, long)]
    env: Option<Environment>,

    /// Log filter, e.g. "info" or "cifra_api=debug"
    #[arg(long)]
    log_level: Option<String>,
}

impl From<Args> for ConfigOverrides {
    fn from(args: Args) -> Self {
        ConfigOverrides {
            config_file: args.config,
            database_path: args.database,
            host: args.host,
            port: args.port,
            environment: args.env,
            log_level: args.log_level,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let resolver = ConfigResolver::new(args.into());

    // RUST_LOG wins outright; otherwise a level found only in the config file
    // replaces the bootstrap filter once the file is read.
    let rust_log = EnvFilter::try_from_default_env().ok();
    let follow_config = rust_log.is_none();
    let bootstrap = rust_log.unwrap_or_else(|| {
        EnvFilter::new(resolver.log_level_override().as_deref().unwrap_or("info"))
    });
    let (filter, filter_handle) = reload::Layer::new(bootstrap);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = resolver.resolve().context("Failed to resolve configuration")?;
    if follow_config {
        if let Err(e) = filter_handle.reload(EnvFilter::new(&config.log_level)) {
            warn!("Keeping bootstrap log filter: {}", e);
        }
    }

    info!(
        "Starting cifra-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Environment: {}", config.environment);
    info!("Database path: {}", config.database_path.display());

    let pool = Arc::new(LazyPool::sqlite(
        config.database_path.clone(),
        config.database.clone(),
    ));

    // Schema initialization establishes the pool
    if let Err(e) = pool.get().await {
        error!("Failed to initialize database: {}", e);
        return Err(e).context("Database initialization failed");
    }
    info!("✓ Database ready");

    let state = AppState::new(Gateway::sqlite(pool.clone()), config.environment);
    let app = build_router(state, &RouterOptions::from(&config));

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("cifra-api listening on http://{}", bind_address);
    info!(
        "Song API: http://{}{}/song",
        bind_address,
        internal_base_path(&config.api_version)
    );
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    pool.close().await;
    info!("cifra-api stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
