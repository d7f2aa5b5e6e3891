//! # Playdar Daemon Binary
//!
//! Entry point: parse arguments, load and validate configuration, build the
//! resolution engine and its HTTP surface, then serve until interrupted.
//!
//! ```bash
//! # Basic usage with default configuration
//! playdar-daemon
//!
//! # Custom configuration file
//! playdar-daemon --config my-playdar.json
//!
//! # Custom host and port, overriding the config file
//! playdar-daemon --host 0.0.0.0 --port 8080
//! ```
//!
//! Concrete resolver plugins (local file indexer, peer-to-peer, remote
//! scripted resolvers) are out of scope (spec.md §1) — the pipeline here is
//! built with an empty plugin list, ready for a caller to register plugins
//! through [`playdar_resolver::PluginAdaptor`] before handing the pipeline
//! to [`playdar_daemon::create_server`].

use clap::Parser;
use playdar_daemon::{config::Config, create_server, InMemoryTokenStore};
use playdar_resolver::{QueryRegistry, RegistryConfig, ResolverPipeline};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about = "Playdar music content-resolver daemon", long_about = None)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "playdar.json")]
    config: String,

    /// Port to bind the HTTP server to, overriding the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Host address to bind to, overriding the config file.
    #[arg(long)]
    host: Option<String>,

    /// Logging level, overriding the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("could not load {}: {e}; starting with defaults", args.config);
            Config::default()
        }
    };

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(log_level) = args.log_level {
        config.log_level = log_level;
    }

    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    config.validate()?;

    let registry = Arc::new(QueryRegistry::new(RegistryConfig::new(
        config.registry.retention_window(),
    )));
    let pipeline = Arc::new(ResolverPipeline::new(
        registry,
        vec![],
        config.registry.plugin_queue_capacity,
    ));
    let token_store = Arc::new(InMemoryTokenStore::default());

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!(%addr, name = %config.name, "starting playdar daemon");

    let app = create_server(config, pipeline, token_store);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
