//! Mutating admission webhook for pods.
//!
//! A pod that passes the mutation policies gets every lxcfs `/proc` file
//! from the injection catalog mounted into each of its containers, and is
//! stamped with a status annotation so it is never mutated twice.

pub mod catalog;
pub mod error;
pub mod mutate;
pub mod patch;
pub mod policies;
mod server;

pub use catalog::{InjectionSpec, LXCFS};
pub use error::{MutationError, WebhookError};
pub use mutate::{AdmissionOutcome, Decision, evaluate, mutate, respond, review};
pub use patch::create_patch;
pub use policies::{ListMode, MutationContext, mutation_required};
pub use server::{
    MUTATE_PATH, WebhookState, check_request, create_webhook_router, run_webhook_server,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
