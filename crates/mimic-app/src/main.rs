//! Mimic - record-and-replay HTTP(S) proxy for service virtualization.
//!
//! This binary wires the pieces together:
//! - the capture store (single-file embedded database)
//! - the traffic engine with its processing mode
//! - the admin API server (record counts, state, wipe)
//! - the MITM proxy frontend

mod cli;

use std::sync::Arc;

use clap::Parser;

use mimic_core::{Cache, Settings};
use mimic_proxy::{ProxyConfig, ProxyServer, DEFAULT_PROXY_PORT};
use mimic_server::{Server, ServerConfig, DEFAULT_ADMIN_PORT};
use mimic_storage::CaptureStore;

use cli::Cli;

/// Environment overrides, checked when the matching flag is absent.
const ENV_PROXY_PORT: &str = "MIMIC_PROXY_PORT";
const ENV_ADMIN_PORT: &str = "MIMIC_ADMIN_PORT";
const ENV_DATABASE: &str = "MIMIC_DB";

fn env_port(name: &str) -> Option<u16> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose { "mimic=debug" } else { "mimic=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().expect("static directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Flags win over environment, environment over defaults.
    let proxy_port = cli
        .proxy_port
        .or_else(|| env_port(ENV_PROXY_PORT))
        .unwrap_or(DEFAULT_PROXY_PORT);
    let admin_port = cli
        .admin_port
        .or_else(|| env_port(ENV_ADMIN_PORT))
        .unwrap_or(DEFAULT_ADMIN_PORT);
    let database = cli
        .database
        .clone()
        .or_else(|| std::env::var(ENV_DATABASE).ok().map(Into::into));

    let settings = Arc::new(Settings::new(
        cli.mode(),
        &cli.destination,
        cli.middleware.clone(),
        cli.endpoint.clone(),
        cli.verbose,
    )?);

    let store = match &database {
        Some(path) => CaptureStore::with_path(path)?,
        None => CaptureStore::new()?,
    };
    let cache: Arc<dyn Cache> = Arc::new(store);

    tracing::info!(
        mode = %settings.mode,
        destination = %settings.destination,
        proxy_port,
        admin_port,
        "starting mimic"
    );

    // Admin surface runs out-of-band on its own port.
    let admin = Server::new(
        ServerConfig::default().with_port(admin_port),
        cache.clone(),
        settings.clone(),
    )?;
    tokio::spawn(async move {
        if let Err(err) = admin.run().await {
            tracing::error!(error = %err, "admin server error");
        }
    });

    let config = ProxyConfig::new(settings, cache)?.with_port(proxy_port);
    let proxy = ProxyServer::new(config)?;
    proxy.run().await?;

    Ok(())
}
