use crate::error::{ArborError, Result};
use crate::ids::ResourceKind;
use crate::message::{IdentityRef, Message};
use crate::notify::{EntityEvent, Notifier};
use crate::part::Part;
use crate::patch::{PatchError, Patchable, SyncTracker};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// The two kinds of message destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Conversation,
    Channel,
}

impl ContainerKind {
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            ContainerKind::Conversation => ResourceKind::Conversations,
            ContainerKind::Channel => ResourceKind::Channels,
        }
    }

    pub fn from_resource_kind(kind: ResourceKind) -> Option<Self> {
        match kind {
            ResourceKind::Conversations => Some(ContainerKind::Conversation),
            ResourceKind::Channels => Some(ContainerKind::Channel),
            _ => None,
        }
    }
}

/// Wire representation of a conversation or channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerPayload {
    pub id: String,
    #[serde(default)]
    pub participants: Vec<IdentityRef>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub from_websocket: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A conversation or channel.
#[derive(Debug)]
pub struct Container {
    id: String,
    kind: ContainerKind,
    participants: Vec<IdentityRef>,
    metadata: Map<String, Value>,
    created_at: Option<String>,
    extra: Map<String, Value>,
    notifier: Notifier,
    sync: SyncTracker,
}

impl Container {
    pub fn new(id: impl Into<String>, kind: ContainerKind) -> Self {
        Self {
            id: id.into(),
            kind,
            participants: Vec::new(),
            metadata: Map::new(),
            created_at: None,
            extra: Map::new(),
            notifier: Notifier::new(),
            sync: SyncTracker::default(),
        }
    }

    pub fn from_payload(kind: ContainerKind, payload: ContainerPayload) -> Self {
        let mut container = Self::new(payload.id, kind);
        container.participants = payload.participants;
        container.metadata = payload.metadata;
        container.created_at = payload.created_at;
        container.extra = payload.extra;
        container
    }

    /// Refreshes the container from a newer server representation.
    pub fn update_from_payload(&mut self, payload: ContainerPayload) {
        let mut state = payload.extra;
        state.insert("participants".to_string(), json!(payload.participants));
        state.insert("metadata".to_string(), Value::Object(payload.metadata));
        if let Some(created_at) = payload.created_at {
            self.created_at = Some(created_at);
        }
        // Payload types already match the patch state shape.
        if let Err(err) = self.absorb_patch(Value::Object(state)) {
            tracing::warn!(container_id = %self.id, "Ignoring container payload: {}", err);
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn participants(&self) -> &[IdentityRef] {
        &self.participants
    }

    pub fn has_participant(&self, identity_id: &str) -> bool {
        self.participants.iter().any(|p| p.id == identity_id)
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        match self.patch_state() {
            Value::Object(mut state) => state.remove(name),
            _ => None,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut Notifier {
        &mut self.notifier
    }

    pub fn flush(&mut self) -> usize {
        self.notifier.flush(&self.id)
    }

    pub fn sync_tracker(&self) -> &SyncTracker {
        &self.sync
    }

    /// Builds a new, unsent message addressed to this container.
    pub fn create_message(
        &self,
        message_id: impl Into<String>,
        parts: Vec<Part>,
        sender: Option<IdentityRef>,
    ) -> Result<Message> {
        if parts.is_empty() {
            return Err(ArborError::internal(format!(
                "message for {} has no parts",
                self.id
            )));
        }
        Ok(Message::new_local(message_id, self.id.clone(), parts, sender))
    }

    pub fn destroy(&mut self) {
        self.notifier.destroy(&self.id);
    }

    fn assign(&mut self, property: &str, old: Value, new: Value) -> bool {
        if old == new {
            return false;
        }
        self.notifier
            .queue(EntityEvent::changed(property, old, new));
        true
    }
}

impl Patchable for Container {
    fn patch_state(&self) -> Value {
        let mut state = self.extra.clone();
        state.insert("participants".to_string(), json!(self.participants));
        state.insert("metadata".to_string(), Value::Object(self.metadata.clone()));
        Value::Object(state)
    }

    fn absorb_patch(&mut self, state: Value) -> std::result::Result<(), PatchError> {
        let Value::Object(mut state) = state else {
            return Err(PatchError::rejected("", "container state must be an object"));
        };
        let participants = match state.remove("participants") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value::<Vec<IdentityRef>>(value)
                .map_err(|err| PatchError::rejected("participants", err.to_string()))?,
        };
        let metadata = match state.remove("metadata") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(PatchError::TypeMismatch {
                    property: "metadata".to_string(),
                    expected: "object",
                });
            }
        };

        if self.assign(
            "participants",
            json!(self.participants),
            json!(participants),
        ) {
            self.participants = participants;
        }
        if self.assign(
            "metadata",
            Value::Object(self.metadata.clone()),
            Value::Object(metadata.clone()),
        ) {
            self.metadata = metadata;
        }

        let keys: Vec<String> = self
            .extra
            .keys()
            .chain(state.keys())
            .cloned()
            .collect();
        for key in keys {
            let old = self.extra.get(&key).cloned().unwrap_or(Value::Null);
            let new = state.get(&key).cloned().unwrap_or(Value::Null);
            self.assign(&key, old, new);
        }
        self.extra = state;
        Ok(())
    }

    fn set_remote_patch(&mut self, active: bool) {
        self.sync.set_remote_patch(active);
    }
}
