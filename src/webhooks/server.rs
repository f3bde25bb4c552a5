//! Admission webhook server.
//!
//! Serves `POST /mutate` over TLS for a MutatingWebhookConfiguration.
//!
//! To enable the webhook:
//! 1. Issue a serving certificate for the webhook Service (e.g. cert-manager)
//! 2. Mount the TLS secret at /etc/webhook/certs/ (or set WEBHOOK_CERT_PATH / WEBHOOK_KEY_PATH)
//! 3. Register a MutatingWebhookConfiguration for pod CREATE pointing at `/mutate`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::post,
};
use axum_server::tls_rustls::RustlsConfig;
use tracing::{error, info};

use crate::config::WebhookConfig;
use crate::health::HealthState;
use crate::webhooks::error::WebhookError;
use crate::webhooks::mutate::{AdmissionOutcome, review};

/// Path the mutating webhook is served on
pub const MUTATE_PATH: &str = "/mutate";

/// Shared state for webhook handlers
pub struct WebhookState {
    pub config: WebhookConfig,
    pub health_state: Option<Arc<HealthState>>,
}

impl WebhookState {
    pub fn new(config: WebhookConfig, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            config,
            health_state,
        }
    }
}

/// Reject requests that cannot carry an AdmissionReview
pub fn check_request(content_type: Option<&str>, body: &[u8]) -> Result<(), (StatusCode, String)> {
    if body.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "empty body".to_string()));
    }

    let media_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .unwrap_or_default();
    if !media_type.eq_ignore_ascii_case("application/json") {
        return Err((
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "invalid Content-Type, expect `application/json`".to_string(),
        ));
    }

    Ok(())
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(MUTATE_PATH, post(mutate_pod))
        .with_state(state)
}

/// Mutating admission handler for pods
async fn mutate_pod(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    if let Err((status, message)) = check_request(content_type, &body) {
        error!(status = %status, content_type = content_type.unwrap_or_default(), "{}", message);
        record(&state, AdmissionOutcome::Error, start);
        return (status, message).into_response();
    }

    let (review, outcome) = review(&body, &state.config);
    record(&state, outcome, start);

    (StatusCode::OK, Json(review)).into_response()
}

fn record(state: &WebhookState, outcome: AdmissionOutcome, start: Instant) {
    if let Some(health_state) = &state.health_state {
        health_state
            .metrics
            .record_admission(outcome, start.elapsed().as_secs_f64());
    }
}

/// Run the webhook server with TLS
///
/// Binds to `0.0.0.0:<webhook_port>` and serves the `/mutate` endpoint.
/// The health state is marked ready once the certificate is loaded.
pub async fn run_webhook_server(state: Arc<WebhookState>) -> Result<(), WebhookError> {
    let cert_path = state.config.cert_path.clone();
    let key_path = state.config.key_path.clone();
    for path in [&cert_path, &key_path] {
        if !path.exists() {
            return Err(WebhookError::MissingCertificate(path.display().to_string()));
        }
    }

    let config = RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let port = state.config.webhook_port;
    let health_state = state.health_state.clone();
    let app = create_webhook_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Webhook server listening with TLS");
    if let Some(health_state) = health_state {
        health_state.set_ready(true).await;
    }

    axum_server::bind_rustls(addr, config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
