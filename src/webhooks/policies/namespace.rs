//! Ignored namespace policy.
//!
//! Pods in platform namespaces are never mutated, whatever their
//! annotations say or which list mode is configured.

use tracing::info;

use super::MutationContext;

/// Whether the object lives in one of the ignored namespaces
pub fn is_ignored(ctx: &MutationContext<'_>) -> bool {
    let Some(namespace) = ctx.namespace else {
        return false;
    };

    let ignored = ctx.ignored_namespaces.iter().any(|ns| ns == namespace);
    if ignored {
        info!(
            namespace,
            name = ctx.name,
            "Skipping mutation for object in ignored namespace"
        );
    }
    ignored
}
