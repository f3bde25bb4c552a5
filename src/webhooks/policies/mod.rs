//! Mutation policies for Pod admission requests.
//!
//! Policies are evaluated in order:
//! - Namespace: platform namespaces are never mutated
//! - Opt-in/opt-out: the mutate annotation, interpreted per [`ListMode`]
//! - Status: pods already marked as mutated are left alone

pub mod namespace;
pub mod opt_in;
pub mod status;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use thiserror::Error;
use tracing::info;

/// Annotation a pod uses to opt in to or out of mutation
pub const MUTATE_ANNOTATION: &str = "lxcfs-webhook.paradeum.com/mutate";
/// Annotation recording that a pod has already been mutated
pub const STATUS_ANNOTATION: &str = "lxcfs-webhook.paradeum.com/status";
/// Value of [`STATUS_ANNOTATION`] written by the webhook
pub const STATUS_MUTATED: &str = "mutated";

/// Default mutation behaviour for pods without an explicit annotation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ListMode {
    /// Mutate unless the pod opts out
    #[default]
    Blacklist,
    /// Leave alone unless the pod opts in
    Whitelist,
}

impl fmt::Display for ListMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListMode::Blacklist => write!(f, "BLACK"),
            ListMode::Whitelist => write!(f, "WHITE"),
        }
    }
}

/// A list mode string that is neither `BLACK` nor `WHITE`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown list mode {0:?}, expected BLACK or WHITE")]
pub struct UnknownListMode(pub String);

impl FromStr for ListMode {
    type Err = UnknownListMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BLACK" => Ok(ListMode::Blacklist),
            "WHITE" => Ok(ListMode::Whitelist),
            _ => Err(UnknownListMode(s.to_string())),
        }
    }
}

/// Everything the policies look at for one object
#[derive(Clone, Copy, Debug)]
pub struct MutationContext<'a> {
    /// Namespace the object is being created in
    pub namespace: Option<&'a str>,
    /// Object name, used for logging only
    pub name: &'a str,
    /// Object annotations
    pub annotations: Option<&'a BTreeMap<String, String>>,
    /// Configured list mode
    pub mode: ListMode,
    /// Namespaces skipped unconditionally
    pub ignored_namespaces: &'a [String],
}

impl<'a> MutationContext<'a> {
    /// Build a context from object metadata.
    ///
    /// `fallback_namespace` is used when the object itself carries none (or an
    /// empty one), which is the norm for pods on CREATE.
    pub fn from_metadata(
        metadata: &'a ObjectMeta,
        fallback_namespace: Option<&'a str>,
        mode: ListMode,
        ignored_namespaces: &'a [String],
    ) -> Self {
        Self {
            namespace: metadata
                .namespace
                .as_deref()
                .filter(|ns| !ns.is_empty())
                .or(fallback_namespace),
            name: metadata
                .name
                .as_deref()
                .or(metadata.generate_name.as_deref())
                .unwrap_or_default(),
            annotations: metadata.annotations.as_ref(),
            mode,
            ignored_namespaces,
        }
    }

    /// Lower-cased annotation value, empty when absent
    pub fn annotation(&self, key: &str) -> String {
        self.annotations
            .and_then(|annotations| annotations.get(key))
            .map(|value| value.to_lowercase())
            .unwrap_or_default()
    }
}

/// Decide whether the object should be mutated
pub fn mutation_required(ctx: &MutationContext<'_>) -> bool {
    let required =
        !namespace::is_ignored(ctx) && opt_in::admission_required(ctx) && !status::is_mutated(ctx);

    info!(
        namespace = ctx.namespace.unwrap_or_default(),
        name = ctx.name,
        mode = %ctx.mode,
        required,
        "Mutation policy evaluated"
    );
    required
}
