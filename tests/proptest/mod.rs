// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for lxcfs-admission-webhook.
//!
//! Uses proptest to generate random inputs and verify invariants.


use std::collections::BTreeMap;

use json_patch::PatchOperation;
use k8s_openapi::api::core::v1::{Container, Volume, VolumeMount};
use proptest::prelude::*;

use lxcfs_admission_webhook::config::IGNORED_NAMESPACES;
use lxcfs_admission_webhook::webhooks::policies::{
    ListMode, MUTATE_ANNOTATION, MutationContext, STATUS_ANNOTATION, mutation_required,
};
use lxcfs_admission_webhook::webhooks::{LXCFS, create_patch};

/// Strategy for generating list modes.
fn any_mode() -> impl Strategy<Value = ListMode> {
    prop_oneof![Just(ListMode::Blacklist), Just(ListMode::Whitelist)]
}

/// Strategy for annotation values, mixing known tokens with noise.
fn annotation_value() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("yes".to_string()),
        Just("No".to_string()),
        Just("OFF".to_string()),
        Just("true".to_string()),
        Just(String::new()),
        "[a-zA-Z]{0,8}",
    ]
}

/// Strategy for annotation maps that may contain the mutate annotation.
fn annotations() -> impl Strategy<Value = BTreeMap<String, String>> {
    (
        prop::option::of(annotation_value()),
        prop::collection::btree_map("[a-z]{1,8}(/[a-z]{1,8})?", "[a-z0-9]{0,8}", 0..4),
    )
        .prop_map(|(mutate, mut map)| {
            if let Some(value) = mutate {
                map.insert(MUTATE_ANNOTATION.to_string(), value);
            }
            map
        })
}

/// Letter-case variants of "mutated".
fn mutated_any_case() -> impl Strategy<Value = String> {
    prop::collection::vec(any::<bool>(), 7).prop_map(|upper| {
        "mutated"
            .chars()
            .zip(upper)
            .map(|(c, up)| if up { c.to_ascii_uppercase() } else { c })
            .collect()
    })
}

fn containers() -> impl Strategy<Value = Vec<Container>> {
    prop::collection::vec(
        ("[a-z]{1,8}", prop::collection::vec("[a-z]{1,8}", 0..3)).prop_map(|(name, mounts)| {
            Container {
                name,
                volume_mounts: Some(
                    mounts
                        .into_iter()
                        .map(|m| VolumeMount {
                            mount_path: format!("/{m}"),
                            name: m,
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }
        }),
        1..4,
    )
}

fn volumes() -> impl Strategy<Value = Vec<Volume>> {
    prop::collection::vec(
        "[a-z]{1,8}".prop_map(|name| Volume {
            name,
            ..Default::default()
        }),
        0..3,
    )
}

fn ignored() -> Vec<String> {
    IGNORED_NAMESPACES.iter().map(|s| s.to_string()).collect()
}

proptest! {
    #[test]
    fn ignored_namespaces_never_mutated(
        mode in any_mode(),
        annotations in annotations(),
        index in 0..IGNORED_NAMESPACES.len(),
    ) {
        let ignored = ignored();
        let ctx = MutationContext {
            namespace: Some(IGNORED_NAMESPACES[index]),
            name: "pod",
            annotations: Some(&annotations),
            mode,
            ignored_namespaces: &ignored,
        };
        prop_assert!(!mutation_required(&ctx));
    }

    #[test]
    fn status_mutated_never_mutated(
        mode in any_mode(),
        mut annotations in annotations(),
        status in mutated_any_case(),
    ) {
        annotations.insert(STATUS_ANNOTATION.to_string(), status);
        let ignored = ignored();
        let ctx = MutationContext {
            namespace: Some("default"),
            name: "pod",
            annotations: Some(&annotations),
            mode,
            ignored_namespaces: &ignored,
        };
        prop_assert!(!mutation_required(&ctx));
    }

    #[test]
    fn whitelist_opt_in_implies_blacklist_mutates(annotations in annotations()) {
        let ignored = ignored();
        let ctx = |mode| MutationContext {
            namespace: Some("default"),
            name: "pod",
            annotations: Some(&annotations),
            mode,
            ignored_namespaces: &ignored,
        };
        let black = mutation_required(&ctx(ListMode::Blacklist));
        let white = mutation_required(&ctx(ListMode::Whitelist));
        prop_assert!(!white || black);
    }

    #[test]
    fn patch_order_and_shape(
        existing in prop::option::of(prop::collection::btree_map("[a-z]{1,8}", "[a-z]{0,4}", 0..3)),
        containers in containers(),
        volumes in volumes(),
    ) {
        let to_set = BTreeMap::from([(STATUS_ANNOTATION.to_string(), "mutated".to_string())]);
        let patch = create_patch(existing.as_ref(), &to_set, &containers, &volumes, &LXCFS).unwrap();

        let annotation_ops = 1;
        let volume_ops = if volumes.is_empty() { 1 } else { LXCFS.volumes.len() };
        prop_assert_eq!(patch.0.len(), annotation_ops + 1 + volume_ops);

        // Annotations first, then containers, then volumes
        let paths: Vec<String> = patch.0.iter().map(|op| match op {
            PatchOperation::Add(op) => op.path.to_string(),
            PatchOperation::Replace(op) => op.path.to_string(),
            other => panic!("unexpected {other:?}"),
        }).collect();
        prop_assert!(paths[0].starts_with("/metadata/annotations"));
        prop_assert_eq!(&paths[1], "/spec/containers");
        prop_assert!(paths[2..].iter().all(|p| p.starts_with("/spec/volumes")));

        // Every container keeps its mounts and gains the catalog, in order
        let PatchOperation::Replace(replace) = &patch.0[1] else {
            panic!("expected replace");
        };
        let patched: Vec<Container> = serde_json::from_value(replace.value.clone()).unwrap();
        let injected = LXCFS.volume_mounts();
        prop_assert_eq!(patched.len(), containers.len());
        for (before, after) in containers.iter().zip(&patched) {
            let before = before.volume_mounts.clone().unwrap_or_default();
            let after = after.volume_mounts.clone().unwrap_or_default();
            prop_assert_eq!(after.len(), before.len() + LXCFS.mounts.len());
            prop_assert_eq!(&after[..before.len()], &before[..]);
            prop_assert_eq!(&after[before.len()..], &injected[..]);
        }
    }

    #[test]
    fn patch_serialization_round_trips(
        containers in containers(),
        volumes in volumes(),
    ) {
        let to_set = BTreeMap::from([(STATUS_ANNOTATION.to_string(), "mutated".to_string())]);
        let patch = create_patch(None, &to_set, &containers, &volumes, &LXCFS).unwrap();
        let bytes = serde_json::to_vec(&patch).unwrap();
        let parsed: json_patch::Patch = serde_json::from_slice(&bytes).unwrap();
        prop_assert_eq!(parsed, patch);
    }
}
