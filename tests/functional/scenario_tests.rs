//! Multi-step and policy scenarios.

use crate::common::fixtures::{PodBuilder, admission_review, pod_create_review};
use crate::{apply, decode_request, patch_for};
use lxcfs_admission_webhook::WebhookConfig;
use lxcfs_admission_webhook::webhooks::policies::{ListMode, MUTATE_ANNOTATION, STATUS_ANNOTATION};
use lxcfs_admission_webhook::webhooks::{AdmissionOutcome, mutate, review};
use serde_json::json;

fn whitelist() -> WebhookConfig {
    WebhookConfig {
        list_mode: ListMode::Whitelist,
        ..Default::default()
    }
}

// ============================================================================
// Resubmission
// ============================================================================

/// A pod that already went through the webhook is never patched again.
#[test]
fn test_resubmitted_pod_not_mutated_twice() {
    let pod = PodBuilder::new("web").namespace("default").container("nginx").build();
    let config = WebhookConfig::default();

    let patch = patch_for(&pod_create_review("uid-1", "default", &pod), &config).unwrap();
    let mutated = apply(&pod, &patch);

    let again = patch_for(&pod_create_review("uid-2", "default", &mutated), &config);
    assert!(again.is_none());
}

#[test]
fn test_status_guard_is_case_insensitive() {
    let pod = PodBuilder::new("web")
        .namespace("default")
        .annotation(STATUS_ANNOTATION, "MUTATED")
        .container("nginx")
        .build();
    let body = pod_create_review("uid-1", "default", &pod);
    assert!(patch_for(&body, &WebhookConfig::default()).is_none());
    assert!(patch_for(&body, &whitelist()).is_none());
}

// ============================================================================
// Ignored namespaces
// ============================================================================

#[test]
fn test_system_namespaces_skipped_in_every_mode() {
    for namespace in ["kube-system", "kube-public"] {
        let pod = PodBuilder::new("coredns")
            .namespace(namespace)
            .annotation(MUTATE_ANNOTATION, "yes")
            .container("coredns")
            .build();
        let body = pod_create_review("uid-1", namespace, &pod);
        assert!(patch_for(&body, &WebhookConfig::default()).is_none(), "{namespace}");
        assert!(patch_for(&body, &whitelist()).is_none(), "{namespace}");
    }
}

/// Pods created through a controller carry no namespace in their metadata.
#[test]
fn test_request_namespace_used_when_pod_has_none() {
    let pod = PodBuilder::new("coredns-5d78c9869d-abcde").container("coredns").build();
    let body = pod_create_review("uid-1", "kube-system", &pod);
    assert!(patch_for(&body, &WebhookConfig::default()).is_none());

    let body = pod_create_review("uid-2", "default", &pod);
    assert!(patch_for(&body, &WebhookConfig::default()).is_some());
}

#[test]
fn test_request_namespace_used_when_pod_namespace_empty() {
    let pod = PodBuilder::new("coredns").namespace("").container("coredns").build();
    let body = pod_create_review("uid-1", "kube-system", &pod);
    assert!(patch_for(&body, &WebhookConfig::default()).is_none());
}

// ============================================================================
// List modes
// ============================================================================

#[test]
fn test_blacklist_opt_out() {
    for value in ["n", "no", "false", "off", "OFF"] {
        let pod = PodBuilder::new("web")
            .namespace("default")
            .annotation(MUTATE_ANNOTATION, value)
            .container("nginx")
            .build();
        let body = pod_create_review("uid-1", "default", &pod);
        assert!(patch_for(&body, &WebhookConfig::default()).is_none(), "{value}");
    }
}

#[test]
fn test_whitelist_opt_in() {
    let pod = PodBuilder::new("web").namespace("default").container("nginx").build();
    let body = pod_create_review("uid-1", "default", &pod);
    assert!(patch_for(&body, &whitelist()).is_none());

    for value in ["y", "yes", "true", "on", "Yes"] {
        let pod = PodBuilder::new("web")
            .namespace("default")
            .annotation(MUTATE_ANNOTATION, value)
            .container("nginx")
            .build();
        let body = pod_create_review("uid-1", "default", &pod);
        assert!(patch_for(&body, &whitelist()).is_some(), "{value}");
    }
}

// ============================================================================
// Envelope handling
// ============================================================================

#[test]
fn test_uid_echoed_in_every_outcome() {
    let config = WebhookConfig::default();
    let pod = PodBuilder::new("web").namespace("default").container("nginx").build();
    let skipped = PodBuilder::new("web")
        .namespace("default")
        .annotation(MUTATE_ANNOTATION, "off")
        .container("nginx")
        .build();

    let cases = [
        (pod_create_review("uid-mutated", "default", &pod), AdmissionOutcome::Mutated),
        (pod_create_review("uid-skipped", "default", &skipped), AdmissionOutcome::Skipped),
        (
            admission_review("uid-other", "Service", "CREATE", "default", json!({"metadata": {"name": "svc"}})),
            AdmissionOutcome::Unrecognized,
        ),
        (
            admission_review(
                "uid-bad",
                "Pod",
                "CREATE",
                "default",
                json!({"metadata": {"name": "web"}, "spec": {"containers": 7}}),
            ),
            AdmissionOutcome::Error,
        ),
    ];

    for (body, expected) in cases {
        let uid = body["request"]["uid"].as_str().unwrap().to_string();
        let (review, outcome) = review(&serde_json::to_vec(&body).unwrap(), &config);
        assert_eq!(outcome, expected, "{uid}");

        let response = review.response.unwrap();
        assert_eq!(response.uid, uid);
        assert_eq!(response.allowed, expected != AdmissionOutcome::Error, "{uid}");
    }
}

#[test]
fn test_review_round_trips_through_json() {
    let pod = PodBuilder::new("web").namespace("default").container("nginx").build();
    let body = pod_create_review("uid-1", "default", &pod);
    let (review, _) = review(&serde_json::to_vec(&body).unwrap(), &WebhookConfig::default());

    let value = serde_json::to_value(&review).unwrap();
    assert_eq!(value["apiVersion"], "admission.k8s.io/v1");
    assert_eq!(value["kind"], "AdmissionReview");
    assert_eq!(value["response"]["uid"], "uid-1");
    assert_eq!(value["response"]["patchType"], "JSONPatch");
}

#[test]
fn test_delete_allowed_without_patch() {
    let pod = PodBuilder::new("web").namespace("default").container("nginx").build();
    let mut body = pod_create_review("uid-1", "default", &pod);
    body["request"]["operation"] = json!("DELETE");
    body["request"]["oldObject"] = body["request"]["object"].take();
    body["request"].as_object_mut().unwrap().remove("object");

    let (response, outcome) = mutate(&decode_request(&body), &WebhookConfig::default());
    assert_eq!(outcome, AdmissionOutcome::Skipped);
    assert!(response.allowed);
}
