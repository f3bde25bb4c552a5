//! Error types for the webhook.

use kube::core::admission::SerializePatchError;
use thiserror::Error;

/// Errors that turn an admission request into a rejected response
#[derive(Error, Debug)]
pub enum MutationError {
    /// The body is not an AdmissionReview, or carries no request
    #[error("Invalid AdmissionReview: {0}")]
    InvalidReview(String),

    /// The embedded object could not be decoded as the declared kind
    #[error("Could not decode raw object: {0}")]
    Decode(#[source] serde_json::Error),

    /// The request carries no object to mutate
    #[error("Missing object in request")]
    MissingObject,

    /// A patch value could not be serialized
    #[error("Could not serialize patch value: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The finished patch could not be attached to the response
    #[error("Could not encode patch: {0}")]
    PatchEncoding(#[from] SerializePatchError),
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    /// Certificate or key file is missing
    #[error("TLS certificate not found: {0}")]
    MissingCertificate(String),

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Server error
    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Result type alias for mutation operations
pub type Result<T> = std::result::Result<T, MutationError>;
