//! lxcfs-admission-webhook - mounts lxcfs `/proc` files into new pods.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Reads the configuration from the environment
//! - Starts the health server and the TLS webhook server

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use lxcfs_admission_webhook::{
    HealthState, WebhookConfig, WebhookState, run_health_server, run_webhook_server,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lxcfs_admission_webhook=info".parse()?),
        )
        .json()
        .init();

    let config = WebhookConfig::from_env();
    info!(
        list_mode = %config.list_mode,
        ignored_namespaces = ?config.ignored_namespaces,
        webhook_port = config.webhook_port,
        health_port = config.health_port,
        "Starting lxcfs-admission-webhook"
    );

    let health_state = Arc::new(HealthState::new());

    // Probes should answer while the webhook is still loading certificates
    let health_handle = {
        let health_state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let webhook_handle = {
        let state = Arc::new(WebhookState::new(config, Some(health_state.clone())));
        tokio::spawn(async move { run_webhook_server(state).await })
    };

    tokio::select! {
        result = webhook_handle => {
            match result {
                Ok(Ok(())) => info!("Webhook server stopped"),
                Ok(Err(e)) => {
                    error!("Webhook server error: {}", e);
                    return Err(e.into());
                }
                Err(e) => error!("Webhook server task panicked: {}", e),
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, shutting down");
            health_state.set_ready(false).await;
        }
    }

    info!("Webhook stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
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
