//! Process-wide webhook configuration.
//!
//! Read once from the environment at startup and shared read-only with every
//! request handler. Nothing in the decision path reads the environment itself.

use std::path::PathBuf;

use tracing::warn;

use crate::webhooks::policies::ListMode;

/// Environment variable selecting blacklist or whitelist mode
pub const LIST_MODE_ENV: &str = "BLACK_OR_WHITE";
/// Environment variable overriding the TLS certificate path
pub const CERT_PATH_ENV: &str = "WEBHOOK_CERT_PATH";
/// Environment variable overriding the TLS private key path
pub const KEY_PATH_ENV: &str = "WEBHOOK_KEY_PATH";
/// Environment variable overriding the webhook port
pub const WEBHOOK_PORT_ENV: &str = "WEBHOOK_PORT";
/// Environment variable overriding the health server port
pub const HEALTH_PORT_ENV: &str = "HEALTH_PORT";

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 9443;
/// Default health server port
pub const HEALTH_PORT: u16 = 8080;

/// Namespaces owned by the platform itself. Pods there are never mutated.
pub const IGNORED_NAMESPACES: [&str; 2] = ["kube-system", "kube-public"];

/// Immutable configuration for the webhook process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Default mutation behaviour for pods without an explicit opt-in/opt-out
    pub list_mode: ListMode,
    /// Namespaces that are skipped unconditionally
    pub ignored_namespaces: Vec<String>,
    /// PEM certificate served by the webhook
    pub cert_path: PathBuf,
    /// PEM private key matching `cert_path`
    pub key_path: PathBuf,
    /// Port the TLS webhook server binds to
    pub webhook_port: u16,
    /// Port the plain-HTTP health server binds to
    pub health_port: u16,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            list_mode: ListMode::default(),
            ignored_namespaces: IGNORED_NAMESPACES.iter().map(|ns| ns.to_string()).collect(),
            cert_path: PathBuf::from(WEBHOOK_CERT_PATH),
            key_path: PathBuf::from(WEBHOOK_KEY_PATH),
            webhook_port: WEBHOOK_PORT,
            health_port: HEALTH_PORT,
        }
    }
}

impl WebhookConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Unset values take their defaults. Unrecognized list modes and
    /// unparseable ports also fall back to the default, with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let list_mode = match lookup(LIST_MODE_ENV) {
            None => defaults.list_mode,
            Some(raw) if raw.trim().is_empty() => defaults.list_mode,
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(error = %e, fallback = %defaults.list_mode, "Unrecognized list mode");
                defaults.list_mode
            }),
        };

        Self {
            list_mode,
            cert_path: lookup(CERT_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.cert_path),
            key_path: lookup(KEY_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.key_path),
            webhook_port: parse_port(&lookup, WEBHOOK_PORT_ENV, defaults.webhook_port),
            health_port: parse_port(&lookup, HEALTH_PORT_ENV, defaults.health_port),
            ignored_namespaces: defaults.ignored_namespaces,
        }
    }
}

fn parse_port<F>(lookup: &F, key: &str, default: u16) -> u16
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = key, value = %raw, fallback = default, "Invalid port");
            default
        }),
    }
}
