//! Already-mutated guard.
//!
//! The webhook stamps the status annotation on every pod it patches. A pod
//! carrying it (in any letter case) is never patched again.

use super::{MutationContext, STATUS_ANNOTATION, STATUS_MUTATED};

/// Whether the object is already marked as mutated
pub fn is_mutated(ctx: &MutationContext<'_>) -> bool {
    ctx.annotation(STATUS_ANNOTATION) == STATUS_MUTATED
}
