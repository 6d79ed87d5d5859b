//! Message domain model.

use crate::error::Result;
use crate::ids;
use crate::notify::{EntityEvent, Notifier};
use crate::part::{Part, PartPayload, ROLE_ROOT};
use crate::patch::{PatchError, PatchOperation, Patchable, SyncTracker};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};

/// Where a message stands relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Generated locally, never sent.
    New,
    /// Handed to the transport, waiting for the server echo.
    Sending,
    /// Known to the server.
    Synced,
}

/// How a message entered the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadType {
    Local,
    Fetched,
    Websocket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRef {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    pub title: String,
    pub text: String,
}

/// Structural change of a message's part list, routed to its models.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageEvent {
    PartAdded { part_id: String },
    /// Carries the removed part, which the message no longer holds.
    PartRemoved { part: Part },
    PartChanged { part_id: String },
}

/// Wire representation of a message.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePayload {
    pub id: String,
    #[serde(default)]
    pub conversation: Option<ContainerRef>,
    #[serde(default)]
    pub channel: Option<ContainerRef>,
    #[serde(default)]
    pub parts: Vec<PartPayload>,
    #[serde(default)]
    pub sender: Option<IdentityRef>,
    #[serde(default)]
    pub sent_at: Option<String>,
    #[serde(default)]
    pub position: Option<u64>,
    #[serde(default)]
    pub is_unread: bool,
    #[serde(default)]
    pub recipient_status: BTreeMap<String, String>,
    #[serde(default)]
    pub from_websocket: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const NAMED_PROPERTIES: [&str; 5] = ["parts", "recipient_status", "is_unread", "position", "sent_at"];

/// A message and the part tree it owns.
#[derive(Debug)]
pub struct Message {
    id: String,
    container_id: String,
    parts: Vec<Part>,
    sender: Option<IdentityRef>,
    sent_at: Option<String>,
    position: Option<u64>,
    is_unread: bool,
    recipient_status: BTreeMap<String, String>,
    extra: Map<String, Value>,
    sync_state: SyncState,
    load_type: LoadType,
    notification: Option<PushNotification>,
    events: Vec<MessageEvent>,
    notifier: Notifier,
    sync: SyncTracker,
}

impl Message {
    /// Creates a locally generated, unsent message.
    ///
    /// Parts without a storage id get one derived from the message id.
    pub fn new_local(
        id: impl Into<String>,
        container_id: impl Into<String>,
        parts: Vec<Part>,
        sender: Option<IdentityRef>,
    ) -> Self {
        let id = id.into();
        let parts = parts
            .into_iter()
            .map(|mut part| {
                if part.id.is_empty() {
                    part.id = ids::part_id(&id);
                }
                part
            })
            .collect();
        Self {
            id,
            container_id: container_id.into(),
            parts,
            sender,
            sent_at: None,
            position: None,
            is_unread: false,
            recipient_status: BTreeMap::new(),
            extra: Map::new(),
            sync_state: SyncState::New,
            load_type: LoadType::Local,
            notification: None,
            events: Vec::new(),
            notifier: Notifier::new(),
            sync: SyncTracker::default(),
        }
    }

    /// Builds a message received from the server.
    pub fn from_payload(payload: MessagePayload) -> Result<Self> {
        let parts = payload
            .parts
            .into_iter()
            .map(Part::from_payload)
            .collect::<Result<Vec<_>>>()?;
        let container_id = payload
            .conversation
            .or(payload.channel)
            .map(|container| container.id)
            .unwrap_or_default();
        let mut message = Self::new_local(payload.id, container_id, parts, payload.sender);
        message.sent_at = payload.sent_at;
        message.position = payload.position;
        message.is_unread = payload.is_unread;
        message.recipient_status = payload.recipient_status;
        message.extra = payload.extra;
        message.sync_state = SyncState::Synced;
        message.load_type = if payload.from_websocket {
            LoadType::Websocket
        } else {
            LoadType::Fetched
        };
        Ok(message)
    }

    /// Refreshes a cached message from a newer server representation.
    ///
    /// Part differences surface as [`MessageEvent`]s, property differences
    /// as queued change notifications.
    pub fn update_from_payload(&mut self, payload: MessagePayload) -> Result<()> {
        let parts = payload
            .parts
            .into_iter()
            .map(Part::from_payload)
            .collect::<Result<Vec<_>>>()?;

        self.merge_parts(parts);
        self.assign_sent_at(payload.sent_at);
        self.assign_position(payload.position);
        self.set_is_unread(payload.is_unread);
        self.assign_recipient_status(payload.recipient_status);
        for (key, value) in payload.extra {
            self.assign_extra(key, value);
        }
        if payload.sender.is_some() {
            self.sender = payload.sender;
        }
        if payload.from_websocket {
            self.load_type = LoadType::Websocket;
        }
        self.sync_state = SyncState::Synced;
        Ok(())
    }

    // ============================================================================
    // Accessors
    // ============================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn part(&self, part_id: &str) -> Option<&Part> {
        self.parts.iter().find(|part| part.id == part_id)
    }

    pub fn part_by_node_id(&self, node_id: &str) -> Option<&Part> {
        self.parts.iter().find(|part| part.node_id() == Some(node_id))
    }

    /// The part tagged `role=root`, falling back to the first part without
    /// a parent.
    pub fn root_part(&self) -> Option<&Part> {
        self.parts
            .iter()
            .find(|part| part.role() == Some(ROLE_ROOT))
            .or_else(|| self.parts.iter().find(|part| part.parent_id().is_none()))
    }

    /// Parts whose MIME attribute `key` equals `value`.
    pub fn parts_matching(&self, key: &str, value: &str) -> Vec<&Part> {
        self.parts
            .iter()
            .filter(|part| part.mime.attributes.get(key) == Some(value))
            .collect()
    }

    pub fn sender(&self) -> Option<&IdentityRef> {
        self.sender.as_ref()
    }

    pub fn sent_at(&self) -> Option<&str> {
        self.sent_at.as_deref()
    }

    pub fn position(&self) -> Option<u64> {
        self.position
    }

    pub fn is_unread(&self) -> bool {
        self.is_unread
    }

    pub fn recipient_status(&self) -> &BTreeMap<String, String> {
        &self.recipient_status
    }

    /// Reads any patchable property by name, including unknown ones.
    pub fn property(&self, name: &str) -> Option<Value> {
        match self.patch_state() {
            Value::Object(mut state) => state.remove(name),
            _ => None,
        }
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    pub fn is_new(&self) -> bool {
        self.sync_state == SyncState::New
    }

    pub fn load_type(&self) -> LoadType {
        self.load_type
    }

    pub fn notification(&self) -> Option<&PushNotification> {
        self.notification.as_ref()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut Notifier {
        &mut self.notifier
    }

    /// Delivers this turn's notifications.
    pub fn flush(&mut self) -> usize {
        self.notifier.flush(&self.id)
    }

    pub fn sync_tracker(&self) -> &SyncTracker {
        &self.sync
    }

    pub fn sync_tracker_mut(&mut self) -> &mut SyncTracker {
        &mut self.sync
    }

    // ============================================================================
    // Local mutations
    // ============================================================================

    /// Hands the message to the transport.
    pub fn mark_sending(&mut self, notification: Option<PushNotification>) {
        self.notification = notification;
        self.sync_state = SyncState::Sending;
        self.sent_at = Some(chrono::Utc::now().to_rfc3339());
    }

    pub fn mark_read(&mut self) {
        self.set_is_unread(false);
    }

    fn set_is_unread(&mut self, is_unread: bool) {
        if self.is_unread == is_unread {
            return;
        }
        self.notifier.queue(EntityEvent::changed(
            "is_unread",
            json!(self.is_unread),
            json!(is_unread),
        ));
        self.is_unread = is_unread;
        self.sync
            .record(PatchOperation::set("is_unread", json!(is_unread)));
    }

    fn assign_sent_at(&mut self, sent_at: Option<String>) {
        if self.sent_at != sent_at {
            self.notifier
                .queue(EntityEvent::changed("sent_at", json!(self.sent_at), json!(sent_at)));
            self.sent_at = sent_at;
        }
    }

    fn assign_position(&mut self, position: Option<u64>) {
        if self.position != position {
            self.notifier.queue(EntityEvent::changed(
                "position",
                json!(self.position),
                json!(position),
            ));
            self.position = position;
        }
    }

    fn assign_recipient_status(&mut self, status: BTreeMap<String, String>) {
        if self.recipient_status != status {
            self.notifier.queue(EntityEvent::changed(
                "recipient_status",
                json!(self.recipient_status),
                json!(status),
            ));
            self.recipient_status = status;
        }
    }

    fn assign_extra(&mut self, key: String, value: Value) {
        let old = self.extra.get(&key).cloned().unwrap_or(Value::Null);
        if old == value {
            return;
        }
        self.notifier
            .queue(EntityEvent::changed(key.clone(), old, value.clone()));
        if value.is_null() {
            self.extra.remove(&key);
        } else {
            self.extra.insert(key, value);
        }
    }

    // ============================================================================
    // Structural edits
    // ============================================================================

    /// Adds a part, or replaces the part with the same node id.
    ///
    /// A replacement keeps the position of the old part and is reported as
    /// `PartAdded` so the owning model can swap its reference.
    pub fn add_part(&mut self, mut part: Part) {
        if part.id.is_empty() {
            part.id = ids::part_id(&self.id);
        }
        let part_id = part.id.clone();

        if let Some(index) = self.parts.iter().position(|p| p.id == part.id) {
            if self.parts[index] != part {
                self.parts[index] = part;
                self.events.push(MessageEvent::PartChanged { part_id });
            }
            return;
        }

        let node_id = part.node_id().map(String::from);
        match self
            .parts
            .iter()
            .position(|p| node_id.is_some() && p.node_id() == node_id.as_deref())
        {
            Some(index) => self.parts[index] = part,
            None => self.parts.push(part),
        }
        self.events.push(MessageEvent::PartAdded { part_id });
    }

    pub fn remove_part(&mut self, part_id: &str) -> Option<Part> {
        let index = self.parts.iter().position(|part| part.id == part_id)?;
        let part = self.parts.remove(index);
        self.events
            .push(MessageEvent::PartRemoved { part: part.clone() });
        Some(part)
    }

    /// Replaces a part body; returns `false` when the part is unknown.
    pub fn update_part_body(&mut self, part_id: &str, body: impl Into<Vec<u8>>) -> bool {
        let body = body.into();
        let Some(part) = self.parts.iter_mut().find(|part| part.id == part_id) else {
            return false;
        };
        if part.body.as_deref() != Some(body.as_slice()) {
            part.body = Some(body);
            self.events.push(MessageEvent::PartChanged {
                part_id: part_id.to_string(),
            });
        }
        true
    }

    /// Reconciles the part list with `incoming`.
    ///
    /// Additions and replacements are applied before removals so an
    /// edit-replacement is never reported as a removal of the old node.
    pub fn merge_parts(&mut self, incoming: Vec<Part>) {
        let incoming_ids: BTreeSet<String> = incoming
            .iter()
            .filter(|part| !part.id.is_empty())
            .map(|part| part.id.clone())
            .collect();

        for part in incoming {
            self.add_part(part);
        }

        let stale: Vec<String> = self
            .parts
            .iter()
            .filter(|part| !incoming_ids.contains(&part.id))
            .map(|part| part.id.clone())
            .collect();
        for part_id in stale {
            self.remove_part(&part_id);
        }
    }

    /// Drains the structural events queued since the last call.
    pub fn take_events(&mut self) -> Vec<MessageEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn destroy(&mut self) {
        self.events.clear();
        self.notifier.destroy(&self.id);
    }
}

fn reject(property: &str, err: impl std::fmt::Display) -> PatchError {
    PatchError::rejected(property, err.to_string())
}

impl Patchable for Message {
    fn patch_state(&self) -> Value {
        let mut state = self.extra.clone();
        let parts: Vec<PartPayload> = self.parts.iter().map(Part::to_payload).collect();
        state.insert("parts".to_string(), json!(parts));
        state.insert("recipient_status".to_string(), json!(self.recipient_status));
        state.insert("is_unread".to_string(), json!(self.is_unread));
        state.insert("position".to_string(), json!(self.position));
        state.insert("sent_at".to_string(), json!(self.sent_at));
        Value::Object(state)
    }

    fn absorb_patch(&mut self, state: Value) -> std::result::Result<(), PatchError> {
        let Value::Object(mut state) = state else {
            return Err(PatchError::rejected("", "message state must be an object"));
        };

        let parts = match state.remove("parts") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value::<Vec<PartPayload>>(value)
                .map_err(|err| reject("parts", err))?
                .into_iter()
                .map(Part::from_payload)
                .collect::<Result<Vec<_>>>()
                .map_err(|err| reject("parts", err))?,
        };
        let recipient_status = match state.remove("recipient_status") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(value) => serde_json::from_value::<BTreeMap<String, String>>(value)
                .map_err(|err| reject("recipient_status", err))?,
        };
        let is_unread = match state.remove("is_unread") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => flag,
            Some(_) => {
                return Err(PatchError::TypeMismatch {
                    property: "is_unread".to_string(),
                    expected: "boolean",
                });
            }
        };
        let position = match state.remove("position") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_u64().ok_or(PatchError::TypeMismatch {
                property: "position".to_string(),
                expected: "unsigned integer",
            })?),
        };
        let sent_at = match state.remove("sent_at") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text),
            Some(_) => {
                return Err(PatchError::TypeMismatch {
                    property: "sent_at".to_string(),
                    expected: "string",
                });
            }
        };
        debug_assert!(NAMED_PROPERTIES.iter().all(|name| !state.contains_key(*name)));

        // Everything validated: commit.
        self.merge_parts(parts);
        self.assign_recipient_status(recipient_status);
        self.set_is_unread(is_unread);
        self.assign_position(position);
        self.assign_sent_at(sent_at);

        let removed: Vec<String> = self
            .extra
            .keys()
            .filter(|key| !state.contains_key(*key))
            .cloned()
            .collect();
        for key in removed {
            self.assign_extra(key, Value::Null);
        }
        for (key, value) in state {
            self.assign_extra(key, value);
        }
        Ok(())
    }

    fn set_remote_patch(&mut self, active: bool) {
        self.sync.set_remote_patch(active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::ROLE_ROOT;

    fn root_part() -> Part {
        let mut part = Part::new("application/vnd.arbor.text+json", r#"{"text":"hi"}"#);
        part.set_role(ROLE_ROOT);
        part
    }

    fn message_with_root() -> (Message, String) {
        let message = Message::new_local(
            "arbor:///messages/m1",
            "arbor:///conversations/c1",
            vec![root_part()],
            None,
        );
        let part_id = message.parts()[0].id.clone();
        (message, part_id)
    }

    #[test]
    fn test_new_local_assigns_part_ids() {
        let (message, part_id) = message_with_root();
        assert!(part_id.starts_with("arbor:///messages/m1/parts/"));
        assert!(message.is_new());
        assert_eq!(message.root_part().map(|p| p.id.as_str()), Some(part_id.as_str()));
    }

    #[test]
    fn test_structural_events() {
        let (mut message, root_id) = message_with_root();
        let root_node = message.parts()[0].node_id().unwrap().to_string();

        let mut child = Part::new("text/plain", "child");
        child.set_parent_id(root_node.clone());
        message.add_part(child);
        assert!(message.update_part_body(&root_id, r#"{"text":"edited"}"#.as_bytes()));
        let child_id = message.parts()[1].id.clone();
        assert!(message.remove_part(&child_id).is_some());

        let events = message.take_events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], MessageEvent::PartAdded { .. }));
        assert_eq!(events[1], MessageEvent::PartChanged { part_id: root_id });
        assert!(matches!(events[2], MessageEvent::PartRemoved { .. }));
        assert!(!message.has_pending_events());
    }

    #[test]
    fn test_edit_replacement_keeps_position() {
        let (mut message, root_id) = message_with_root();
        let node_id = message.parts()[0].node_id().unwrap().to_string();

        let mut replacement = Part::new("application/vnd.arbor.text+json", r#"{"text":"v2"}"#);
        replacement.set_node_id(node_id.clone());
        replacement.set_role(ROLE_ROOT);
        replacement.id = "arbor:///messages/m1/parts/v2".to_string();
        message.merge_parts(vec![replacement]);

        assert_eq!(message.parts().len(), 1);
        assert_ne!(message.parts()[0].id, root_id);
        assert_eq!(
            message.take_events(),
            vec![MessageEvent::PartAdded {
                part_id: "arbor:///messages/m1/parts/v2".to_string()
            }]
        );
    }

    #[test]
    fn test_absorb_patch_is_atomic() {
        let (mut message, _) = message_with_root();
        let mut state = message.patch_state();
        state["title"] = json!("Hi");
        state["is_unread"] = json!("yes");

        assert!(message.absorb_patch(state).is_err());
        assert_eq!(message.property("title"), None);
        assert!(!message.notifier().is_dirty());
    }

    #[test]
    fn test_absorb_patch_unknown_property() {
        let (mut message, _) = message_with_root();
        let mut state = message.patch_state();
        state["title"] = json!("Hi");
        message.absorb_patch(state).unwrap();

        assert_eq!(message.property("title"), Some(json!("Hi")));
        assert_eq!(message.notifier().pending().len(), 1);
        assert!(message.take_events().is_empty());
    }

    #[test]
    fn test_remote_patch_not_recorded_for_sync() {
        let (mut message, _) = message_with_root();
        let mut state = message.patch_state();
        state["is_unread"] = json!(true);
        message.set_remote_patch(true);
        message.absorb_patch(state).unwrap();
        message.set_remote_patch(false);
        assert!(message.is_unread());
        assert!(message.sync_tracker().outbound().is_empty());

        message.mark_read();
        assert_eq!(message.sync_tracker().outbound().len(), 1);
    }

    #[test]
    fn test_from_payload() {
        let payload: MessagePayload = serde_json::from_value(json!({
            "id": "arbor:///messages/m2",
            "conversation": {"id": "arbor:///conversations/c1"},
            "parts": [{
                "id": "arbor:///messages/m2/parts/p1",
                "mime_type": "application/vnd.arbor.text+json; role=root; node-id=n1",
                "body": "{\"text\":\"hello\"}"
            }],
            "sender": {"id": "arbor:///identities/u1", "display_name": "Ann"},
            "is_unread": true,
            "from_websocket": true,
            "title": "greeting"
        }))
        .unwrap();
        let message = Message::from_payload(payload).unwrap();
        assert_eq!(message.container_id(), "arbor:///conversations/c1");
        assert_eq!(message.load_type(), LoadType::Websocket);
        assert_eq!(message.sync_state(), SyncState::Synced);
        assert_eq!(message.property("title"), Some(json!("greeting")));
        assert_eq!(message.root_part().unwrap().node_id(), Some("n1"));
    }
}
