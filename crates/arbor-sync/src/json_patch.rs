//! Patch operation interpreter over JSON snapshots.
//!
//! Operations run against the entity's [`Patchable::patch_state`] snapshot;
//! the result is handed back through [`Patchable::absorb_patch`] only when
//! every operation succeeded.

use arbor_core::patch::{PatchApplier, PatchError, PatchOperation, Patchable};
use serde_json::{Map, Value};

/// Interprets `set`, `delete`, `add` and `remove` on dotted property paths.
///
/// `add` appends to an array (skipping elements already present) and
/// otherwise behaves like `set`. `remove` drops array elements equal to the
/// value or whose `id` matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPatchApplier;

impl JsonPatchApplier {
    pub fn new() -> Self {
        Self
    }

    /// Applies `operations` to a snapshot in place.
    pub fn apply_to_value(
        &self,
        state: &mut Value,
        operations: &[PatchOperation],
    ) -> Result<(), PatchError> {
        for operation in operations {
            apply_operation(state, operation)?;
        }
        Ok(())
    }
}

impl PatchApplier for JsonPatchApplier {
    fn apply(
        &self,
        target: &mut dyn Patchable,
        operations: &[PatchOperation],
    ) -> Result<(), PatchError> {
        let mut state = target.patch_state();
        self.apply_to_value(&mut state, operations)?;
        target.absorb_patch(state)
    }
}

fn apply_operation(state: &mut Value, op: &PatchOperation) -> Result<(), PatchError> {
    let segments: Vec<&str> = op.property.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(PatchError::InvalidPath {
            property: op.property.clone(),
        });
    }
    let Some((last, path)) = segments.split_last() else {
        return Err(PatchError::InvalidPath {
            property: op.property.clone(),
        });
    };

    match op.operation.as_str() {
        "set" => {
            let map = object_at(state, path, &op.property, true)?
                .ok_or_else(|| invalid_path(op))?;
            map.insert(last.to_string(), op.value.clone());
        }
        "delete" => {
            if let Some(map) = object_at(state, path, &op.property, false)? {
                map.remove(*last);
            }
        }
        "add" => {
            let map = object_at(state, path, &op.property, true)?
                .ok_or_else(|| invalid_path(op))?;
            match map.get_mut(*last) {
                Some(Value::Array(items)) => {
                    if !items.iter().any(|item| matches_element(item, op)) {
                        items.push(op.value.clone());
                    }
                }
                _ => {
                    map.insert(last.to_string(), op.value.clone());
                }
            }
        }
        "remove" => {
            let Some(map) = object_at(state, path, &op.property, false)? else {
                return Ok(());
            };
            match map.get_mut(*last) {
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => items.retain(|item| !matches_element(item, op)),
                Some(_) => {
                    return Err(PatchError::TypeMismatch {
                        property: op.property.clone(),
                        expected: "array",
                    });
                }
            }
        }
        other => {
            return Err(PatchError::UnsupportedOperation {
                property: op.property.clone(),
                operation: other.to_string(),
            });
        }
    }
    Ok(())
}

/// Walks `path` down from `state` to the object holding the last segment.
///
/// With `create`, missing or null intermediate values become empty objects;
/// without it a missing step yields `None`.
fn object_at<'a>(
    state: &'a mut Value,
    path: &[&str],
    property: &str,
    create: bool,
) -> Result<Option<&'a mut Map<String, Value>>, PatchError> {
    let mut current = state;
    for segment in path {
        let Value::Object(map) = current else {
            return Err(PatchError::TypeMismatch {
                property: property.to_string(),
                expected: "object",
            });
        };
        if !map.contains_key(*segment) {
            if !create {
                return Ok(None);
            }
            map.insert(segment.to_string(), Value::Object(Map::new()));
        }
        let Some(next) = map.get_mut(*segment) else {
            return Ok(None);
        };
        if create && next.is_null() {
            *next = Value::Object(Map::new());
        }
        current = next;
    }
    match current {
        Value::Object(map) => Ok(Some(map)),
        Value::Null if !create => Ok(None),
        _ => Err(PatchError::TypeMismatch {
            property: property.to_string(),
            expected: "object",
        }),
    }
}

fn matches_element(item: &Value, op: &PatchOperation) -> bool {
    if *item == op.value {
        return true;
    }
    let item_id = item.get("id").and_then(Value::as_str);
    match (&op.id, item_id) {
        (Some(id), Some(item_id)) => id == item_id,
        (None, Some(item_id)) => {
            op.value.as_str() == Some(item_id)
                || op.value.get("id").and_then(Value::as_str) == Some(item_id)
        }
        _ => false,
    }
}

fn invalid_path(op: &PatchOperation) -> PatchError {
    PatchError::InvalidPath {
        property: op.property.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::container::{Container, ContainerKind, ContainerPayload};
    use serde_json::json;

    fn apply(state: &mut Value, ops: &[PatchOperation]) -> Result<(), PatchError> {
        JsonPatchApplier::new().apply_to_value(state, ops)
    }

    #[test]
    fn test_set_and_delete_nested() {
        let mut state = json!({"metadata": {"topic": "lunch"}});
        apply(
            &mut state,
            &[
                PatchOperation::set("metadata.topic", json!("dinner")),
                PatchOperation::set("metadata.place.city", json!("Oslo")),
                PatchOperation::delete("missing.key"),
            ],
        )
        .unwrap();
        assert_eq!(state, json!({"metadata": {"topic": "dinner", "place": {"city": "Oslo"}}}));

        apply(&mut state, &[PatchOperation::delete("metadata.topic")]).unwrap();
        assert_eq!(state["metadata"].get("topic"), None);
    }

    #[test]
    fn test_add_and_remove_array_elements() {
        let mut state = json!({"participants": [{"id": "a"}]});
        apply(
            &mut state,
            &[
                PatchOperation::add("participants", json!({"id": "b"})),
                PatchOperation::add("participants", json!({"id": "b"})),
            ],
        )
        .unwrap();
        assert_eq!(state["participants"].as_array().map(Vec::len), Some(2));

        let mut by_id = PatchOperation::remove("participants", Value::Null);
        by_id.id = Some("a".to_string());
        apply(&mut state, &[by_id]).unwrap();
        assert_eq!(state["participants"], json!([{"id": "b"}]));

        apply(&mut state, &[PatchOperation::remove("participants", json!("b"))]).unwrap();
        assert_eq!(state["participants"], json!([]));
    }

    #[test]
    fn test_errors() {
        let mut state = json!({"title": "x", "tags": "flat"});
        assert!(matches!(
            apply(&mut state, &[PatchOperation::new("title", "upsert", json!(1))]),
            Err(PatchError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            apply(&mut state, &[PatchOperation::set("a..b", json!(1))]),
            Err(PatchError::InvalidPath { .. })
        ));
        assert!(matches!(
            apply(&mut state, &[PatchOperation::set("title.inner", json!(1))]),
            Err(PatchError::TypeMismatch { .. })
        ));
        assert!(matches!(
            apply(&mut state, &[PatchOperation::remove("tags", json!("x"))]),
            Err(PatchError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_apply_is_all_or_nothing() {
        let payload: ContainerPayload = serde_json::from_value(json!({
            "id": "arbor:///conversations/c1",
            "metadata": {"topic": "lunch"}
        }))
        .unwrap();
        let mut container = Container::from_payload(ContainerKind::Conversation, payload);

        let result = JsonPatchApplier::new().apply(
            &mut container,
            &[
                PatchOperation::set("metadata.topic", json!("dinner")),
                PatchOperation::new("metadata", "explode", Value::Null),
            ],
        );
        assert!(result.is_err());
        assert_eq!(container.metadata()["topic"], json!("lunch"));
        assert!(!container.notifier().is_dirty());

        JsonPatchApplier::new()
            .apply(&mut container, &[PatchOperation::set("metadata.topic", json!("dinner"))])
            .unwrap();
        assert_eq!(container.metadata()["topic"], json!("dinner"));
    }
}
