//! Admission request handling.
//!
//! Turns one AdmissionReview into one response:
//! - decode the envelope and the embedded object
//! - evaluate the mutation policies
//! - build the JSON patch when mutation is required
//!
//! Every failure becomes a denied response carrying the error message. The
//! request UID is echoed whenever it can be read.

use std::collections::BTreeMap;
use std::fmt;

use json_patch::Patch;
use k8s_openapi::api::core::v1::Pod;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use tracing::{debug, error, info};

use crate::config::WebhookConfig;
use crate::webhooks::catalog::LXCFS;
use crate::webhooks::error::MutationError;
use crate::webhooks::patch::create_patch;
use crate::webhooks::policies::{
    MutationContext, STATUS_ANNOTATION, STATUS_MUTATED, mutation_required,
};

/// The only kind this webhook mutates
pub const POD_KIND: &str = "Pod";

/// What the webhook decided for one request
#[derive(Debug)]
pub enum Decision {
    /// Allowed unchanged by policy
    Skip,
    /// Allowed unchanged, the kind is not handled
    Unrecognized,
    /// Allowed with the patch applied
    Patch(Patch),
    /// Rejected with the error message
    Reject(MutationError),
}

/// Coarse outcome of a request, used for logs and metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdmissionOutcome {
    Mutated,
    Skipped,
    Unrecognized,
    Error,
}

impl AdmissionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionOutcome::Mutated => "mutated",
            AdmissionOutcome::Skipped => "skipped",
            AdmissionOutcome::Unrecognized => "unrecognized",
            AdmissionOutcome::Error => "error",
        }
    }
}

impl fmt::Display for AdmissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_pod(request: &AdmissionRequest<DynamicObject>) -> bool {
    request.kind.group.is_empty() && request.kind.kind == POD_KIND
}

fn decode_pod(request: &AdmissionRequest<DynamicObject>) -> Result<Pod, MutationError> {
    let object = request
        .object
        .as_ref()
        .ok_or(MutationError::MissingObject)?;
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(MutationError::Decode)
}

/// Decide what to do with an admission request.
pub fn evaluate(request: &AdmissionRequest<DynamicObject>, config: &WebhookConfig) -> Decision {
    info!(
        kind = %request.kind.kind,
        namespace = request.namespace.as_deref().unwrap_or_default(),
        name = %request.name,
        uid = %request.uid,
        operation = ?request.operation,
        user = request.user_info.username.as_deref().unwrap_or_default(),
        "AdmissionReview received"
    );

    if !is_pod(request) {
        info!(
            uid = %request.uid,
            kind = %request.kind.kind,
            "Kind not handled, allowing unchanged"
        );
        return Decision::Unrecognized;
    }

    // Pod specs are immutable after creation
    if request.operation != Operation::Create {
        debug!(
            uid = %request.uid,
            operation = ?request.operation,
            "Not a CREATE, allowing unchanged"
        );
        return Decision::Skip;
    }

    let pod = match decode_pod(request) {
        Ok(pod) => pod,
        Err(e) => {
            error!(uid = %request.uid, error = %e, "Could not decode pod");
            return Decision::Reject(e);
        }
    };

    let ctx = MutationContext::from_metadata(
        &pod.metadata,
        request.namespace.as_deref(),
        config.list_mode,
        &config.ignored_namespaces,
    );
    if !mutation_required(&ctx) {
        info!(
            uid = %request.uid,
            namespace = ctx.namespace.unwrap_or_default(),
            name = ctx.name,
            "Skipping mutation due to policy check"
        );
        return Decision::Skip;
    }

    // No containers to mount into, and a `/spec/containers` replace would fail
    let Some(spec) = pod.spec.as_ref() else {
        info!(
            uid = %request.uid,
            namespace = ctx.namespace.unwrap_or_default(),
            name = ctx.name,
            "Pod has no spec, allowing unchanged"
        );
        return Decision::Skip;
    };

    let annotations = BTreeMap::from([(STATUS_ANNOTATION.to_string(), STATUS_MUTATED.to_string())]);
    match create_patch(
        pod.metadata.annotations.as_ref(),
        &annotations,
        &spec.containers,
        spec.volumes.as_deref().unwrap_or_default(),
        &LXCFS,
    ) {
        Ok(patch) => {
            info!(
                uid = %request.uid,
                patch = %serde_json::to_string(&patch).unwrap_or_default(),
                "Patch created"
            );
            Decision::Patch(patch)
        }
        Err(e) => {
            error!(uid = %request.uid, error = %e, "Could not create patch");
            Decision::Reject(e)
        }
    }
}

/// Turn a decision into the response for `request`.
pub fn respond(
    request: &AdmissionRequest<DynamicObject>,
    decision: Decision,
) -> (AdmissionResponse, AdmissionOutcome) {
    match decision {
        Decision::Skip => (AdmissionResponse::from(request), AdmissionOutcome::Skipped),
        Decision::Unrecognized => (
            AdmissionResponse::from(request),
            AdmissionOutcome::Unrecognized,
        ),
        Decision::Patch(patch) => match AdmissionResponse::from(request).with_patch(patch) {
            Ok(response) => (response, AdmissionOutcome::Mutated),
            Err(e) => {
                let e = MutationError::from(e);
                error!(uid = %request.uid, error = %e, "Could not attach patch");
                (
                    AdmissionResponse::from(request).deny(e.to_string()),
                    AdmissionOutcome::Error,
                )
            }
        },
        Decision::Reject(e) => (
            AdmissionResponse::from(request).deny(e.to_string()),
            AdmissionOutcome::Error,
        ),
    }
}

/// Evaluate and respond to a decoded admission request.
pub fn mutate(
    request: &AdmissionRequest<DynamicObject>,
    config: &WebhookConfig,
) -> (AdmissionResponse, AdmissionOutcome) {
    let decision = evaluate(request, config);
    respond(request, decision)
}

/// Best-effort UID extraction from a body that failed to decode
fn request_uid(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("request")?
        .get("uid")?
        .as_str()
        .map(str::to_string)
}

fn invalid(body: &[u8], error: MutationError) -> AdmissionReview<DynamicObject> {
    let mut response = AdmissionResponse::invalid(error.to_string());
    if let Some(uid) = request_uid(body) {
        response.uid = uid;
    }
    response.into_review()
}

/// Handle a raw AdmissionReview body end to end.
pub fn review(
    body: &[u8],
    config: &WebhookConfig,
) -> (AdmissionReview<DynamicObject>, AdmissionOutcome) {
    let review: AdmissionReview<DynamicObject> = match serde_json::from_slice(body) {
        Ok(review) => review,
        Err(e) => {
            error!(error = %e, "Can't decode body");
            let e = MutationError::InvalidReview(e.to_string());
            return (invalid(body, e), AdmissionOutcome::Error);
        }
    };

    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Failed to extract admission request");
            let e = MutationError::InvalidReview(e.to_string());
            return (invalid(body, e), AdmissionOutcome::Error);
        }
    };

    let (response, outcome) = mutate(&request, config);
    info!(
        uid = %request.uid,
        outcome = %outcome,
        allowed = response.allowed,
        "Admission request handled"
    );
    (response.into_review(), outcome)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::webhooks::policies::{ListMode, MUTATE_ANNOTATION};
    use json_patch::PatchOperation;
    use serde_json::{Value, json};

    fn review_json(kind: &str, operation: &str, object: Value) -> Value {
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "", "version": "v1", "kind": kind},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "name": "web",
                "namespace": "default",
                "operation": operation,
                "userInfo": {"username": "admin"},
                "object": object,
                "dryRun": false
            }
        })
    }

    fn pod_json(annotations: Value) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web", "namespace": "default", "annotations": annotations},
            "spec": {"containers": [{"name": "nginx", "image": "nginx"}]}
        })
    }

    fn request(kind: &str, operation: &str, object: Value) -> AdmissionRequest<DynamicObject> {
        let review: AdmissionReview<DynamicObject> =
            serde_json::from_value(review_json(kind, operation, object)).unwrap();
        review.try_into().unwrap()
    }

    #[test]
    fn test_pod_is_patched() {
        let req = request("Pod", "CREATE", pod_json(json!({})));
        let decision = evaluate(&req, &WebhookConfig::default());
        let Decision::Patch(patch) = decision else {
            panic!("expected patch, got {decision:?}");
        };
        assert_eq!(patch.0.len(), 3);
        assert!(matches!(&patch.0[0], PatchOperation::Add(_)));
        assert!(matches!(&patch.0[1], PatchOperation::Replace(_)));
    }

    #[test]
    fn test_patched_response_allowed_with_uid() {
        let req = request("Pod", "CREATE", pod_json(json!({})));
        let (response, outcome) = mutate(&req, &WebhookConfig::default());
        assert_eq!(outcome, AdmissionOutcome::Mutated);
        assert!(response.allowed);
        assert_eq!(response.uid, "705ab4f5-6393-11e8-b7cc-42010a800002");

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["patchType"], "JSONPatch");
        assert!(value.get("patch").is_some());
    }

    #[test]
    fn test_opted_out_pod_skipped() {
        let req = request(
            "Pod",
            "CREATE",
            pod_json(json!({ MUTATE_ANNOTATION: "off" })),
        );
        let (response, outcome) = mutate(&req, &WebhookConfig::default());
        assert_eq!(outcome, AdmissionOutcome::Skipped);
        assert!(response.allowed);
        assert!(serde_json::to_value(&response).unwrap().get("patch").is_none());
    }

    #[test]
    fn test_whitelist_requires_opt_in() {
        let config = WebhookConfig {
            list_mode: ListMode::Whitelist,
            ..Default::default()
        };
        let req = request("Pod", "CREATE", pod_json(json!({})));
        assert!(matches!(evaluate(&req, &config), Decision::Skip));

        let req = request("Pod", "CREATE", pod_json(json!({ MUTATE_ANNOTATION: "yes" })));
        assert!(matches!(evaluate(&req, &config), Decision::Patch(_)));
    }

    #[test]
    fn test_other_kinds_unrecognized() {
        let req = request("ConfigMap", "CREATE", json!({"metadata": {"name": "cm"}}));
        let (response, outcome) = mutate(&req, &WebhookConfig::default());
        assert_eq!(outcome, AdmissionOutcome::Unrecognized);
        assert!(response.allowed);
    }

    #[test]
    fn test_update_not_mutated() {
        let req = request("Pod", "UPDATE", pod_json(json!({})));
        assert!(matches!(evaluate(&req, &WebhookConfig::default()), Decision::Skip));
    }

    #[test]
    fn test_pod_without_spec_skipped() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web", "namespace": "default"}
        });
        let req = request("Pod", "CREATE", object);
        let (response, outcome) = mutate(&req, &WebhookConfig::default());
        assert_eq!(outcome, AdmissionOutcome::Skipped);
        assert!(response.allowed);
        assert!(serde_json::to_value(&response).unwrap().get("patch").is_none());
    }

    #[test]
    fn test_empty_pod_namespace_uses_request_namespace() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"generateName": "coredns-", "namespace": ""},
            "spec": {"containers": [{"name": "coredns", "image": "coredns"}]}
        });
        let mut value = review_json("Pod", "CREATE", object);
        value["request"]["namespace"] = json!("kube-system");
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(value).unwrap();
        let req: AdmissionRequest<DynamicObject> = review.try_into().unwrap();
        assert!(matches!(evaluate(&req, &WebhookConfig::default()), Decision::Skip));
    }

    #[test]
    fn test_malformed_pod_rejected() {
        let object = json!({
            "metadata": {"name": "web"},
            "spec": {"containers": "not-a-list"}
        });
        let req = request("Pod", "CREATE", object);
        let (response, outcome) = mutate(&req, &WebhookConfig::default());
        assert_eq!(outcome, AdmissionOutcome::Error);
        assert!(!response.allowed);
        assert_eq!(response.uid, "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert!(response.result.message.contains("Could not decode raw object"));
    }

    #[test]
    fn test_missing_object_rejected() {
        let mut value = review_json("Pod", "CREATE", Value::Null);
        value["request"].as_object_mut().unwrap().remove("object");
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(value).unwrap();
        let req: AdmissionRequest<DynamicObject> = review.try_into().unwrap();
        let decision = evaluate(&req, &WebhookConfig::default());
        assert!(matches!(decision, Decision::Reject(MutationError::MissingObject)));
    }

    #[test]
    fn test_review_invalid_body() {
        let (review, outcome) = review(b"not json", &WebhookConfig::default());
        assert_eq!(outcome, AdmissionOutcome::Error);
        let response = review.response.unwrap();
        assert!(!response.allowed);
        assert!(response.result.message.contains("Invalid AdmissionReview"));
    }

    #[test]
    fn test_review_echoes_uid_on_envelope_error() {
        let body = json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {"uid": "abc-123", "kind": 42}
        });
        let (review, outcome) = review(&serde_json::to_vec(&body).unwrap(), &WebhookConfig::default());
        assert_eq!(outcome, AdmissionOutcome::Error);
        assert_eq!(review.response.unwrap().uid, "abc-123");
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(AdmissionOutcome::Mutated.to_string(), "mutated");
        assert_eq!(AdmissionOutcome::Skipped.as_str(), "skipped");
        assert_eq!(AdmissionOutcome::Unrecognized.as_str(), "unrecognized");
        assert_eq!(AdmissionOutcome::Error.as_str(), "error");
    }
}
