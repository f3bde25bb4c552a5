//! Opt-in / opt-out policy.
//!
//! Reads the mutate annotation and applies the configured list mode:
//! - Blacklist: mutate unless the value is one of `n`, `no`, `false`, `off`
//! - Whitelist: skip unless the value is one of `y`, `yes`, `true`, `on`
//!
//! Absent or unknown values always resolve to the mode's default.

use super::{ListMode, MUTATE_ANNOTATION, MutationContext};

const OPT_OUT_VALUES: [&str; 4] = ["n", "no", "false", "off"];
const OPT_IN_VALUES: [&str; 4] = ["y", "yes", "true", "on"];

/// Whether the list mode and mutate annotation ask for mutation
pub fn admission_required(ctx: &MutationContext<'_>) -> bool {
    let value = ctx.annotation(MUTATE_ANNOTATION);
    match ctx.mode {
        ListMode::Blacklist => !OPT_OUT_VALUES.contains(&value.as_str()),
        ListMode::Whitelist => OPT_IN_VALUES.contains(&value.as_str()),
    }
}
