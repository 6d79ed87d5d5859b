//! Wire envelopes of the change channel.

use arbor_core::ResourceKind;
use arbor_core::patch::PatchOperation;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One frame received over the change channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Change {
        #[serde(alias = "body")]
        data: ChangeEvent,
    },
    /// Forwarded to session observers without interpretation.
    Operation {
        #[serde(alias = "body", default)]
        data: Value,
    },
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Structural change of one server entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum ChangeEvent {
    Create {
        object: ObjectRef,
        #[serde(default)]
        data: Value,
    },
    Update {
        object: ObjectRef,
        #[serde(default)]
        data: Vec<PatchOperation>,
    },
    Delete {
        object: ObjectRef,
    },
}

impl ChangeEvent {
    pub fn object(&self) -> &ObjectRef {
        match self {
            ChangeEvent::Create { object, .. }
            | ChangeEvent::Update { object, .. }
            | ChangeEvent::Delete { object } => object,
        }
    }

    pub fn operation_name(&self) -> &'static str {
        match self {
            ChangeEvent::Create { .. } => "create",
            ChangeEvent::Update { .. } => "update",
            ChangeEvent::Delete { .. } => "delete",
        }
    }
}

/// `{type, id}` reference to the entity a change targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub id: String,
}

impl ObjectRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Resource kind from the declared type, or from the id when the type is
    /// not recognized.
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        ResourceKind::from_type_name(&self.kind).or_else(|| ResourceKind::from_id(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_update() {
        let envelope = Envelope::parse(
            r#"{"type":"change","data":{"operation":"update","object":{"type":"messages","id":"X"},
                "data":[{"property":"title","operation":"set","value":"Hi"}]}}"#,
        )
        .unwrap();
        let Envelope::Change { data } = envelope else {
            panic!("expected change envelope");
        };
        assert_eq!(data.operation_name(), "update");
        assert_eq!(data.object().resource_kind(), Some(ResourceKind::Messages));
        let ChangeEvent::Update { data: ops, .. } = data else {
            panic!("expected update");
        };
        assert_eq!(ops, vec![PatchOperation::set("title", json!("Hi"))]);
    }

    #[test]
    fn test_parse_body_alias_and_operation() {
        let envelope: Envelope = serde_json::from_value(json!({
            "type": "change",
            "body": {"operation": "delete", "object": {"type": "Conversation", "id": "arbor:///conversations/c1"}}
        }))
        .unwrap();
        assert!(matches!(envelope, Envelope::Change { data: ChangeEvent::Delete { .. } }));

        let envelope = Envelope::parse(r#"{"type":"operation","data":{"method":"typing"}}"#).unwrap();
        assert_eq!(
            envelope,
            Envelope::Operation {
                data: json!({"method": "typing"})
            }
        );
    }

    #[test]
    fn test_object_kind_falls_back_to_id() {
        let object = ObjectRef::new("", "arbor:///channels/c9");
        assert_eq!(object.resource_kind(), Some(ResourceKind::Channels));
        assert_eq!(ObjectRef::new("Widget", "w1").resource_kind(), None);
    }

    #[test]
    fn test_unknown_envelope_type_fails() {
        assert!(Envelope::parse(r#"{"type":"ping"}"#).is_err());
        assert!(Envelope::parse("not json").is_err());
    }
}
