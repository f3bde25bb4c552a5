//! lxcfs-admission-webhook library crate
//!
//! This module exports the mutation policies, the patch builder and the
//! admission servers used by the binary.

pub mod config;
pub mod health;
pub mod webhooks;

pub use config::WebhookConfig;
pub use health::{HealthState, run_health_server};
pub use webhooks::{WebhookError, WebhookState, run_webhook_server};
