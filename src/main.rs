use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use merge_guard::aggregator::{AggregatorConfig, Dispatcher, GithubCheckRunApi};
use merge_guard::auth::{CredentialManager, JwtSigner, RestTokenExchanger};
use merge_guard::config::Settings;
use merge_guard::github::RestClient;
use merge_guard::server::{AppState, build_router};

/// How long in-flight workers get to finish and flush on shutdown.
const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

const DEFAULT_CONFIG_PATH: &str = "/config/config.yaml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config_path =
        std::env::var("MERGE_GUARD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let settings =
        Settings::load(Path::new(&config_path)).context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "merge_guard={level},tower_http={level}",
                    level = settings.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if settings.server.webhook_secret.is_none() {
        warn!("No webhook secret configured; webhook signature verification is DISABLED");
    }

    let pem = settings
        .read_private_key()
        .context("failed to read App private key")?;
    let signer = JwtSigner::from_rsa_pem(&settings.github.client_id, &pem)
        .context("failed to load App private key")?;
    let rest = RestClient::new(&settings.github.api).context("failed to build GitHub client")?;

    let credentials = Arc::new(CredentialManager::new(RestTokenExchanger::new(
        signer,
        rest.clone(),
    )));
    let api = Arc::new(GithubCheckRunApi::new(credentials, rest));

    let aggregator_config = AggregatorConfig::new(&settings.guard.check_name)
        .with_refresh_interval(settings.guard.refresh_interval())
        .with_idle_retention(settings.guard.idle_retention());
    let dispatcher = Dispatcher::new(api, aggregator_config);

    let state = AppState::new(
        dispatcher,
        settings.server.webhook_secret.map(String::into_bytes),
    );
    let router = build_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0, 0, 0, 0, 0], settings.server.port));
    info!(%addr, guard = %settings.guard.check_name, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    // TODO: terminate TLS in-process when server.tls.enabled is set
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Drain: let workers finish in-flight calls and flush dirty entries.
    state.dispatcher().shutdown(DRAIN_DEADLINE).await;
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
