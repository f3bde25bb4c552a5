//! JSON patch synthesis for Pod mutation.
//!
//! Operations are emitted in a fixed order so that a sequential patch-apply
//! engine never meets a path that does not exist yet:
//! 1. annotations
//! 2. `/spec/containers` (replaced as a whole)
//! 3. `/spec/volumes`
//!
//! Inputs are never modified; the patch is the only output.

use std::collections::BTreeMap;

use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, Patch, PatchOperation, ReplaceOperation};
use k8s_openapi::api::core::v1::{Container, Volume, VolumeMount};
use serde_json::Value;
use tracing::debug;

use crate::webhooks::catalog::InjectionSpec;
use crate::webhooks::error::Result;

fn pointer(tokens: &[&str]) -> PointerBuf {
    PointerBuf::from_tokens(tokens.iter().copied())
}

fn add(path: PointerBuf, value: Value) -> PatchOperation {
    PatchOperation::Add(AddOperation { path, value })
}

fn replace(path: PointerBuf, value: Value) -> PatchOperation {
    PatchOperation::Replace(ReplaceOperation { path, value })
}

/// Build the complete patch for a pod.
pub fn create_patch(
    existing_annotations: Option<&BTreeMap<String, String>>,
    annotations_to_set: &BTreeMap<String, String>,
    containers: &[Container],
    volumes: &[Volume],
    injection: &InjectionSpec,
) -> Result<Patch> {
    let mut operations = update_annotations(existing_annotations, annotations_to_set);
    operations.push(update_mounts(containers, &injection.volume_mounts())?);
    operations.extend(add_volumes(volumes, &injection.volumes())?);

    debug!(operations = operations.len(), "Patch created");
    Ok(Patch(operations))
}

/// Operations setting `added` on top of the existing annotations.
///
/// An absent or empty annotation map is created whole in one `add`. Otherwise
/// new keys are added and existing keys replaced one by one.
pub fn update_annotations(
    existing: Option<&BTreeMap<String, String>>,
    added: &BTreeMap<String, String>,
) -> Vec<PatchOperation> {
    if added.is_empty() {
        return Vec::new();
    }

    let existing = match existing {
        Some(existing) if !existing.is_empty() => existing,
        _ => {
            let map = added
                .iter()
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect();
            return vec![add(pointer(&["metadata", "annotations"]), Value::Object(map))];
        }
    };

    added
        .iter()
        .map(|(key, value)| {
            let path = pointer(&["metadata", "annotations", key.as_str()]);
            let value = Value::String(value.clone());
            if existing.contains_key(key) {
                replace(path, value)
            } else {
                add(path, value)
            }
        })
        .collect()
}

/// A `replace` of the whole container array with `mounts` appended to
/// every container's existing mounts.
pub fn update_mounts(containers: &[Container], mounts: &[VolumeMount]) -> Result<PatchOperation> {
    let containers: Vec<Container> = containers
        .iter()
        .cloned()
        .map(|mut container| {
            container
                .volume_mounts
                .get_or_insert_with(Vec::new)
                .extend(mounts.iter().cloned());
            container
        })
        .collect();

    Ok(replace(
        pointer(&["spec", "containers"]),
        serde_json::to_value(&containers)?,
    ))
}

/// Operations appending `added` to the pod's volumes.
///
/// An empty volume list is created whole in one `add`. Otherwise each volume
/// is appended with its own `add` at the end of the array.
pub fn add_volumes(existing: &[Volume], added: &[Volume]) -> Result<Vec<PatchOperation>> {
    if added.is_empty() {
        return Ok(Vec::new());
    }

    if existing.is_empty() {
        return Ok(vec![add(
            pointer(&["spec", "volumes"]),
            serde_json::to_value(added)?,
        )]);
    }

    added
        .iter()
        .map(|volume| {
            Ok(add(
                pointer(&["spec", "volumes", "-"]),
                serde_json::to_value(volume)?,
            ))
        })
        .collect()
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
    use crate::webhooks::catalog::LXCFS;
    use crate::webhooks::policies::STATUS_ANNOTATION;
    use serde_json::json;

    fn op_path(op: &PatchOperation) -> &str {
        match op {
            PatchOperation::Add(op) => op.path.as_str(),
            PatchOperation::Replace(op) => op.path.as_str(),
            other => panic!("unexpected operation {other:?}"),
        }
    }

    fn container(name: &str, mounts: &[(&str, &str)]) -> Container {
        Container {
            name: name.to_string(),
            image: Some("nginx".to_string()),
            volume_mounts: if mounts.is_empty() {
                None
            } else {
                Some(
                    mounts
                        .iter()
                        .map(|(name, path)| VolumeMount {
                            name: name.to_string(),
                            mount_path: path.to_string(),
                            ..Default::default()
                        })
                        .collect(),
                )
            },
            ..Default::default()
        }
    }

    fn status_mutated() -> BTreeMap<String, String> {
        BTreeMap::from([("status".to_string(), "mutated".to_string())])
    }

    #[test]
    fn test_annotations_created_when_absent() {
        let ops = update_annotations(None, &status_mutated());
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            PatchOperation::Add(op) => {
                assert_eq!(op.path.as_str(), "/metadata/annotations");
                assert_eq!(op.value, json!({"status": "mutated"}));
            }
            other => panic!("expected add, got {other:?}"),
        }
    }

    #[test]
    fn test_annotations_created_when_empty() {
        let empty = BTreeMap::new();
        let ops = update_annotations(Some(&empty), &status_mutated());
        assert_eq!(ops.len(), 1);
        assert_eq!(op_path(&ops[0]), "/metadata/annotations");
    }

    #[test]
    fn test_new_key_added_to_existing_annotations() {
        let existing = BTreeMap::from([("team".to_string(), "web".to_string())]);
        let added = BTreeMap::from([(STATUS_ANNOTATION.to_string(), "mutated".to_string())]);
        let ops = update_annotations(Some(&existing), &added);
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            PatchOperation::Add(op) => {
                assert_eq!(
                    op.path.as_str(),
                    "/metadata/annotations/lxcfs-webhook.paradeum.com~1status"
                );
                assert_eq!(op.value, json!("mutated"));
            }
            other => panic!("expected add, got {other:?}"),
        }
    }

    #[test]
    fn test_existing_key_replaced() {
        let existing = BTreeMap::from([("status".to_string(), "".to_string())]);
        let ops = update_annotations(Some(&existing), &status_mutated());
        assert!(matches!(&ops[0], PatchOperation::Replace(_)));
        assert_eq!(op_path(&ops[0]), "/metadata/annotations/status");
    }

    #[test]
    fn test_mounts_appended_to_every_container() {
        let containers = vec![
            container("app", &[("data", "/data")]),
            container("sidecar", &[]),
        ];
        let op = update_mounts(&containers, &LXCFS.volume_mounts()).unwrap();
        let PatchOperation::Replace(op) = op else {
            panic!("expected replace");
        };
        assert_eq!(op.path.as_str(), "/spec/containers");

        let patched: Vec<Container> = serde_json::from_value(op.value).unwrap();
        assert_eq!(patched.len(), 2);

        let app_mounts = patched[0].volume_mounts.as_ref().unwrap();
        assert_eq!(app_mounts.len(), 7);
        assert_eq!(app_mounts[0].name, "data");
        let injected: Vec<&str> = app_mounts[1..].iter().map(|m| m.name.as_str()).collect();
        let catalog: Vec<&str> = LXCFS.mounts.iter().map(|m| m.name).collect();
        assert_eq!(injected, catalog);

        assert_eq!(patched[1].volume_mounts.as_ref().unwrap().len(), 6);
    }

    #[test]
    fn test_input_containers_untouched() {
        let containers = vec![container("app", &[("data", "/data")])];
        let before = containers.clone();
        update_mounts(&containers, &LXCFS.volume_mounts()).unwrap();
        assert_eq!(containers, before);
    }

    #[test]
    fn test_volumes_created_when_empty() {
        let ops = add_volumes(&[], &LXCFS.volumes()).unwrap();
        assert_eq!(ops.len(), 1);
        let PatchOperation::Add(op) = &ops[0] else {
            panic!("expected add");
        };
        assert_eq!(op.path.as_str(), "/spec/volumes");
        let volumes: Vec<Volume> = serde_json::from_value(op.value.clone()).unwrap();
        assert_eq!(volumes, LXCFS.volumes());
    }

    #[test]
    fn test_volumes_appended_one_by_one() {
        let existing = vec![Volume {
            name: "data".to_string(),
            ..Default::default()
        }];
        let ops = add_volumes(&existing, &LXCFS.volumes()).unwrap();
        assert_eq!(ops.len(), 6);
        for (op, expected) in ops.iter().zip(LXCFS.volumes()) {
            let PatchOperation::Add(op) = op else {
                panic!("expected add");
            };
            assert_eq!(op.path.as_str(), "/spec/volumes/-");
            assert_eq!(op.value["name"], json!(expected.name));
        }
    }

    #[test]
    fn test_operation_order() {
        let existing = vec![Volume {
            name: "data".to_string(),
            ..Default::default()
        }];
        let patch = create_patch(
            None,
            &status_mutated(),
            &[container("app", &[])],
            &existing,
            &LXCFS,
        )
        .unwrap();

        let paths: Vec<&str> = patch.0.iter().map(op_path).collect();
        assert_eq!(paths.len(), 8);
        assert_eq!(paths[0], "/metadata/annotations");
        assert_eq!(paths[1], "/spec/containers");
        assert!(paths[2..].iter().all(|p| *p == "/spec/volumes/-"));
    }

    #[test]
    fn test_patch_serializes_as_json_patch() {
        let patch = create_patch(None, &status_mutated(), &[container("app", &[])], &[], &LXCFS)
            .unwrap();
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value[0]["op"], "add");
        assert_eq!(value[0]["path"], "/metadata/annotations");
        assert_eq!(value[1]["op"], "replace");
        assert_eq!(value[2]["op"], "add");
        assert_eq!(value[2]["value"][0]["hostPath"]["path"], "/var/lib/lxcfs/proc/cpuinfo");
    }
}
