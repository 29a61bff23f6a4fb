//! Matrix job server: entry point.
//!
//! # Usage
//!
//! ```text
//! matrix-server [OPTIONS]
//!
//! Options:
//!   --config           <PATH>  TOML configuration file [default: matrix-server.toml]
//!   --bind             <ADDR>  IP address to listen on
//!   --port             <PORT>  TCP port to listen on
//!   --max-connections  <N>     Concurrent connection limit
//!   --compute-threads  <N>     Threads in the shared compute pool
//! ```
//!
//! Values given on the command line (or through the matching environment
//! variable) override the configuration file.
//!
//! | Variable                 | Overrides                   |
//! |--------------------------|-----------------------------|
//! | `MATRIX_CONFIG`          | `--config`                  |
//! | `MATRIX_BIND`            | `server.bind_address`       |
//! | `MATRIX_PORT`            | `server.port`               |
//! | `MATRIX_MAX_CONNECTIONS` | `server.max_connections`    |
//! | `MATRIX_COMPUTE_THREADS` | `compute.threads`           |
//!
//! `RUST_LOG` takes precedence over `logging.level`.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use matrix_server::application::MatrixProcessor;
use matrix_server::infrastructure::run_server;
use matrix_server::infrastructure::storage::config::{load_config, AppConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// TCP server that computes column minima of uploaded matrices.
#[derive(Debug, Parser)]
#[command(
    name = "matrix-server",
    about = "Accepts matrix jobs over TCP and serves their results",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.  A missing file means defaults.
    #[arg(long, default_value = "matrix-server.toml", env = "MATRIX_CONFIG")]
    config: PathBuf,

    /// IP address to bind the listener to.
    #[arg(long, env = "MATRIX_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "MATRIX_PORT")]
    port: Option<u16>,

    /// Maximum number of connections served at once.
    #[arg(long, env = "MATRIX_MAX_CONNECTIONS")]
    max_connections: Option<usize>,

    /// Threads in the compute pool shared by all jobs.
    #[arg(long, env = "MATRIX_COMPUTE_THREADS")]
    compute_threads: Option<usize>,
}

impl Cli {
    /// Loads the configuration file and applies command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn into_app_config(self) -> anyhow::Result<AppConfig> {
        let mut config = load_config(&self.config)
            .with_context(|| format!("failed to load config '{}'", self.config.display()))?;
        self.apply_overrides(&mut config);
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(bind) = &self.bind {
            config.server.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(max_connections) = self.max_connections {
            config.server.max_connections = max_connections;
        }
        if let Some(threads) = self.compute_threads {
            config.compute.threads = threads;
        }
    }
}

fn build_compute_pool(threads: usize) -> anyhow::Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("matrix-compute-{i}"))
        .build()
        .context("failed to build compute pool")
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_app_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let pool = build_compute_pool(config.compute.threads)?;
    let processor = MatrixProcessor::new(Arc::new(pool));
    info!(
        "matrix server starting: addr={}:{}, max_connections={}, compute_threads={}",
        config.server.bind_address,
        config.server.port,
        config.server.max_connections,
        processor.threads()
    );

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(&config, processor, running).await?;

    info!("matrix server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
