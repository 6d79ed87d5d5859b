use super::registry::{Entity, EntityRegistry};
use crate::config::SyncConfig;
use crate::container::{Container, ContainerKind, ContainerPayload};
use crate::error::{ArborError, Result};
use crate::ids::{self, ResourceKind};
use crate::message::{IdentityRef, Message, MessagePayload};
use crate::model::{ContentUploader, Model, ModelFactory, ModelState, ModelType};
use crate::notify::{
    NotificationReceiver, NotificationSender, SessionEvent, SubscriptionId, notification_channel,
};
use crate::part::{ExternalContent, Part};
use crate::patch::{PatchApplier, PatchError, PatchOperation, Patchable};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tokio::sync::mpsc;

/// Uploader used when none was configured; every upload fails.
#[derive(Debug, Default)]
struct UnconfiguredUploader;

#[async_trait(?Send)]
impl ContentUploader for UnconfiguredUploader {
    async fn upload(&self, mime_type: &str, body: Vec<u8>) -> Result<ExternalContent> {
        Err(ArborError::upload(format!(
            "no content uploader configured for {} bytes of {}",
            body.len(),
            mime_type
        )))
    }
}

/// The context of one signed-in session.
///
/// Owns the entity cache and everything that reacts to it. Created at session
/// start and torn down at session end.
pub struct Session {
    pub(super) owner: IdentityRef,
    pub(super) config: SyncConfig,
    pub(super) registry: EntityRegistry,
    pub(super) factory: ModelFactory,
    pub(super) uploader: Rc<dyn ContentUploader>,
    pub(super) model_observers: Vec<NotificationSender>,
    pub(super) session_observers: Vec<mpsc::UnboundedSender<SessionEvent>>,
    pub(super) outbox: Vec<String>,
    pub(super) content_requests: BTreeSet<String>,
    pub(super) identities: BTreeMap<String, IdentityRef>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("owner", &self.owner)
            .field("entities", &self.registry.len())
            .field("outbox", &self.outbox)
            .finish()
    }
}

impl Session {
    pub fn new(owner: IdentityRef, config: SyncConfig) -> Self {
        Self {
            owner,
            config,
            registry: EntityRegistry::new(),
            factory: ModelFactory::default(),
            uploader: Rc::new(UnconfiguredUploader),
            model_observers: Vec::new(),
            session_observers: Vec::new(),
            outbox: Vec::new(),
            content_requests: BTreeSet::new(),
            identities: BTreeMap::new(),
        }
    }

    pub fn with_uploader(mut self, uploader: Rc<dyn ContentUploader>) -> Self {
        self.uploader = uploader;
        self
    }

    pub fn with_factory(mut self, factory: ModelFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn owner(&self) -> &IdentityRef {
        &self.owner
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn factory_mut(&mut self) -> &mut ModelFactory {
        &mut self.factory
    }

    pub fn identity(&self, id: &str) -> Option<&IdentityRef> {
        self.identities.get(id)
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.registry.message(id)
    }

    pub fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.registry.message_mut(id)
    }

    pub fn container(&self, id: &str) -> Option<&Container> {
        self.registry.container(id)
    }

    pub fn model(&self, id: &str) -> Option<&Model> {
        self.registry.model(id)
    }

    pub fn model_mut(&mut self, id: &str) -> Option<&mut Model> {
        self.registry.model_mut(id)
    }

    /// Id of the model projected from a message's root part.
    pub fn root_model_id(&self, message_id: &str) -> Option<String> {
        let root = self.registry.message(message_id)?.root_part()?;
        self.model_id_for_existing_part(message_id, root)
    }

    /// The model already projected from `part`: by derived id, else by node id.
    fn model_id_for_existing_part(&self, message_id: &str, part: &Part) -> Option<String> {
        let model_id = ids::model_id_for_part(&part.id);
        if let Some(model) = self.registry.model(&model_id) {
            return Some(model.id().to_string());
        }
        let node_id = part.node_id()?;
        self.registry
            .models()
            .find(|model| model.message_id() == Some(message_id) && model.node_id() == Some(node_id))
            .map(|model| model.id().to_string())
    }

    /// Message ids handed to the transport, oldest first.
    pub fn outbox(&self) -> &[String] {
        &self.outbox
    }

    pub fn take_outbox(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbox)
    }

    /// Part ids whose bodies are stored remotely and not fetched yet.
    pub fn content_requests(&self) -> &BTreeSet<String> {
        &self.content_requests
    }

    // ============================================================================
    // Containers
    // ============================================================================

    /// Registers a local conversation or channel.
    pub fn add_container(&mut self, container: Container) -> String {
        let id = container.id().to_string();
        if !self.registry.register_container(container) {
            tracing::debug!(container_id = %id, "Container already registered");
        }
        id
    }

    // ============================================================================
    // Models
    // ============================================================================

    /// Creates an unsent model in the local id space.
    pub fn create_model(&mut self, kind: Box<dyn ModelType>) -> String {
        self.create_model_with(kind, Map::new())
    }

    /// Creates an unsent model with initial properties.
    ///
    /// Undeclared property names are ignored.
    pub fn create_model_with(
        &mut self,
        kind: Box<dyn ModelType>,
        properties: Map<String, Value>,
    ) -> String {
        let id = ids::new_id(ResourceKind::Models);
        let mut model = Model::new(id.clone(), kind);
        for (field, value) in properties {
            model.set_property(&field, value);
        }
        model.notifier_mut().discard_pending();
        self.register_model(model);
        id
    }

    /// Returns the model projected from a part, creating it on first use.
    ///
    /// `None` when the part does not exist or has no typed representation.
    pub fn model_for_part(&mut self, message_id: &str, part_id: &str) -> Option<String> {
        let part = self.registry.message(message_id)?.part(part_id)?.clone();
        if let Some(existing) = self.model_id_for_existing_part(message_id, &part) {
            return Some(existing);
        }
        let model_id = ids::model_id_for_part(part_id);
        let kind = self.factory.create(&part)?;

        let mut model = Model::new(model_id.clone(), kind);
        model.state_mut().attach(message_id, &part);
        model.parse_part(&part, false);
        self.register_model(model);
        self.setup_model(&model_id);
        // The initial build is not a change.
        if let Some(model) = self.registry.model_mut(&model_id) {
            model.notifier_mut().discard_pending();
        }
        Some(model_id)
    }

    /// The model owning `model_id` in its message tree: the model whose
    /// node id is the child's parent node id.
    pub fn parent_model(&self, model_id: &str) -> Option<&Model> {
        let model = self.registry.model(model_id)?;
        let parent_id = model.parent_id()?;
        let message_id = model.message_id();
        self.registry.models().find(|candidate| {
            candidate.id() != model.id()
                && candidate.node_id() == Some(parent_id)
                && (message_id.is_none() || candidate.message_id() == message_id)
        })
    }

    pub(super) fn register_model(&mut self, mut model: Model) -> bool {
        self.model_observers.retain(|observer| !observer.is_closed());
        for observer in &self.model_observers {
            model.notifier_mut().subscribe(observer.clone());
        }
        self.registry.register_model(model)
    }

    /// Runs `f` on a model taken out of the registry.
    pub(super) fn with_model<R>(
        &mut self,
        model_id: &str,
        f: impl FnOnce(&dyn ModelType, &mut ModelState, &EntityRegistry) -> R,
    ) -> Option<R> {
        let mut model = self.registry.take_model(model_id)?;
        let result = {
            let (kind, state) = model.split_mut();
            f(kind, state, &self.registry)
        };
        self.registry.put_model(model);
        Some(result)
    }

    // ============================================================================
    // Remote changes
    // ============================================================================

    /// Builds or refreshes an entity from a server payload.
    ///
    /// A payload for a known id updates the cached entity instead of creating
    /// a second one. Returns the entity id, or `None` for kinds that are not
    /// cached.
    pub fn create_from_payload(&mut self, kind: ResourceKind, data: Value) -> Result<Option<String>> {
        match kind {
            ResourceKind::Messages | ResourceKind::Announcements => {
                self.upsert_message(data).map(Some)
            }
            ResourceKind::Conversations | ResourceKind::Channels => {
                self.upsert_container(kind, data).map(Some)
            }
            ResourceKind::Identities => {
                let identity: IdentityRef = serde_json::from_value(data)
                    .map_err(|err| ArborError::malformed(format!("identity: {}", err)))?;
                let id = identity.id.clone();
                self.identities.insert(id.clone(), identity);
                Ok(Some(id))
            }
            ResourceKind::Models => {
                tracing::debug!("Models are local projections; ignoring payload");
                Ok(None)
            }
        }
    }

    fn upsert_message(&mut self, data: Value) -> Result<String> {
        let payload: MessagePayload = serde_json::from_value(data)
            .map_err(|err| ArborError::malformed(format!("message: {}", err)))?;
        let id = payload.id.clone();
        if let Some(sender) = &payload.sender {
            self.identities
                .entry(sender.id.clone())
                .or_insert_with(|| sender.clone());
        }

        if let Some(message) = self.registry.message_mut(&id) {
            message.update_from_payload(payload)?;
            self.track_content_requests(&id);
            self.outbox.retain(|queued| queued != &id);
            self.route_message_events(&id);
            return Ok(id);
        }

        let message = Message::from_payload(payload)?;
        tracing::info!(message_id = %id, parts = message.parts().len(), "Caching message");
        self.registry.register_message(message);
        self.track_content_requests(&id);
        self.materialize_roots(&id);
        Ok(id)
    }

    fn upsert_container(&mut self, kind: ResourceKind, data: Value) -> Result<String> {
        let container_kind = ContainerKind::from_resource_kind(kind)
            .ok_or_else(|| ArborError::internal(format!("{:?} is not a container", kind)))?;
        let payload: ContainerPayload = serde_json::from_value(data)
            .map_err(|err| ArborError::malformed(format!("{}: {}", kind.segment(), err)))?;
        let id = payload.id.clone();
        match self.registry.container_mut(&id) {
            Some(container) => container.update_from_payload(payload),
            None => {
                tracing::info!(container_id = %id, "Caching {}", kind.segment());
                self.registry
                    .register_container(Container::from_payload(container_kind, payload));
            }
        }
        Ok(id)
    }

    fn track_content_requests(&mut self, message_id: &str) {
        let Some(message) = self.registry.message(message_id) else {
            return;
        };
        for part in message.parts() {
            if part.needs_content() {
                self.content_requests.insert(part.id.clone());
            } else {
                self.content_requests.remove(&part.id);
            }
        }
    }

    /// Delivers a fetched external body for a part.
    pub fn resolve_content(&mut self, message_id: &str, part_id: &str, body: Vec<u8>) -> bool {
        let Some(message) = self.registry.message_mut(message_id) else {
            return false;
        };
        if !message.update_part_body(part_id, body) {
            return false;
        }
        self.content_requests.remove(part_id);
        self.route_message_events(message_id);
        true
    }

    /// Applies remote patch operations to a cached entity.
    ///
    /// The entity is flagged as being remotely patched for the duration, so
    /// its own writes are not queued for outbound sync. Returns `Ok(false)`
    /// when no such entity is cached.
    pub fn apply_remote_patch(
        &mut self,
        id: &str,
        operations: &[PatchOperation],
        applier: &dyn PatchApplier,
    ) -> std::result::Result<bool, PatchError> {
        let result = if let Some(message) = self.registry.message_mut(id) {
            message.set_remote_patch(true);
            let result = applier.apply(&mut *message, operations);
            message.set_remote_patch(false);
            result
        } else if let Some(container) = self.registry.container_mut(id) {
            container.set_remote_patch(true);
            let result = applier.apply(&mut *container, operations);
            container.set_remote_patch(false);
            result
        } else {
            return Ok(false);
        };

        if self.registry.message(id).is_some() {
            self.route_message_events(id);
        }
        result.map(|_| true)
    }

    // ============================================================================
    // Teardown
    // ============================================================================

    /// Destroys whatever entity is registered under `id`.
    pub fn destroy_entity(&mut self, id: &str) -> bool {
        if self.registry.message(id).is_some() {
            return self.destroy_message(id);
        }
        if self.registry.container(id).is_some() {
            return self.destroy_container(id);
        }
        if self.registry.model(id).is_some() {
            return self.destroy_model(id);
        }
        self.identities.remove(id).is_some()
    }

    /// Destroys a message together with every model projected from it.
    pub fn destroy_message(&mut self, id: &str) -> bool {
        let Some(Entity::Message(mut message)) = self.registry.unregister(id) else {
            return false;
        };
        for model_id in self.registry.models_for_message(id) {
            self.destroy_model(&model_id);
        }
        for part in message.parts() {
            self.content_requests.remove(&part.id);
        }
        self.outbox.retain(|queued| queued != id);
        message.destroy();
        tracing::debug!(message_id = %id, "Destroyed message");
        true
    }

    /// Destroys a container and the messages cached for it.
    pub fn destroy_container(&mut self, id: &str) -> bool {
        if self.registry.container(id).is_none() {
            return false;
        }
        for message_id in self.registry.messages_in(id) {
            self.destroy_message(&message_id);
        }
        if let Some(Entity::Container(mut container)) = self.registry.unregister(id) {
            container.destroy();
        }
        true
    }

    /// Destroys a model and, recursively, its child models.
    pub fn destroy_model(&mut self, id: &str) -> bool {
        let Some(mut model) = self.registry.remove_model(id) else {
            return false;
        };
        for child_id in model.state().child_models().to_vec() {
            self.destroy_model(&child_id);
        }
        model.destroy();
        true
    }

    /// Destroys every cached entity and drops all observers.
    pub fn teardown(&mut self) {
        let containers: Vec<String> = self
            .registry
            .containers()
            .map(|container| container.id().to_string())
            .collect();
        for id in containers {
            self.destroy_container(&id);
        }
        let messages: Vec<String> = self
            .registry
            .messages()
            .map(|message| message.id().to_string())
            .collect();
        for id in messages {
            self.destroy_message(&id);
        }
        let models: Vec<String> = self
            .registry
            .models()
            .map(|model| model.id().to_string())
            .collect();
        for id in models {
            self.destroy_model(&id);
        }
        self.model_observers.clear();
        self.session_observers.clear();
        self.outbox.clear();
        self.content_requests.clear();
        self.identities.clear();
        tracing::info!(owner = %self.owner.id, "Session torn down");
    }

    // ============================================================================
    // Notifications
    // ============================================================================

    /// Ends a processing turn: delivers every entity's queued notifications.
    pub fn flush(&mut self) -> usize {
        let mut delivered = 0;
        for container in self.registry.containers_mut() {
            delivered += container.flush();
        }
        for message in self.registry.messages_mut() {
            delivered += message.flush();
        }
        for model in self.registry.models_mut() {
            delivered += model.flush();
        }
        delivered
    }

    /// Observes one entity.
    pub fn subscribe(&mut self, id: &str, sender: NotificationSender) -> Option<SubscriptionId> {
        if let Some(message) = self.registry.message_mut(id) {
            return Some(message.notifier_mut().subscribe(sender));
        }
        if let Some(container) = self.registry.container_mut(id) {
            return Some(container.notifier_mut().subscribe(sender));
        }
        self.registry
            .model_mut(id)
            .map(|model| model.notifier_mut().subscribe(sender))
    }

    pub fn unsubscribe(&mut self, id: &str, subscription: SubscriptionId) -> bool {
        if let Some(message) = self.registry.message_mut(id) {
            return message.notifier_mut().unsubscribe(subscription);
        }
        if let Some(container) = self.registry.container_mut(id) {
            return container.notifier_mut().unsubscribe(subscription);
        }
        self.registry
            .model_mut(id)
            .is_some_and(|model| model.notifier_mut().unsubscribe(subscription))
    }

    /// Observes every model of the session, including models created later.
    pub fn subscribe_models(&mut self) -> NotificationReceiver {
        let (sender, receiver) = notification_channel();
        for model in self.registry.models_mut() {
            model.notifier_mut().subscribe(sender.clone());
        }
        self.model_observers.push(sender);
        receiver
    }

    pub fn subscribe_session(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.session_observers.push(sender);
        receiver
    }

    /// Sends a session-wide event to every session observer.
    pub fn publish(&mut self, event: SessionEvent) {
        self.session_observers
            .retain(|observer| observer.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::EntityEvent;
    use serde_json::json;

    const CONVERSATION: &str = "arbor:///conversations/c1";
    const MESSAGE: &str = "arbor:///messages/m1";

    /// Applies `set` operations on top-level keys.
    struct SetApplier;

    impl PatchApplier for SetApplier {
        fn apply(
            &self,
            target: &mut dyn Patchable,
            operations: &[PatchOperation],
        ) -> std::result::Result<(), PatchError> {
            let mut state = target.patch_state();
            for op in operations {
                if op.operation != "set" {
                    return Err(PatchError::UnsupportedOperation {
                        property: op.property.clone(),
                        operation: op.operation.clone(),
                    });
                }
                state[op.property.as_str()] = op.value.clone();
            }
            target.absorb_patch(state)
        }
    }

    fn session() -> Session {
        Session::new(
            IdentityRef {
                id: "arbor:///identities/owner".to_string(),
                display_name: Some("Owner".to_string()),
            },
            SyncConfig::default(),
        )
    }

    fn message_payload(text: &str) -> Value {
        json!({
            "id": MESSAGE,
            "conversation": {"id": CONVERSATION},
            "sender": {"id": "arbor:///identities/a", "display_name": "Ann"},
            "parts": [{
                "id": "arbor:///messages/m1/parts/root",
                "mime_type": "application/vnd.arbor.text+json; role=root; node-id=n1",
                "body": json!({"text": text}).to_string()
            }]
        })
    }

    fn seeded() -> Session {
        let mut session = session();
        session
            .create_from_payload(
                ResourceKind::Conversations,
                json!({"id": CONVERSATION, "participants": [{"id": "arbor:///identities/a"}]}),
            )
            .unwrap();
        session
            .create_from_payload(ResourceKind::Messages, message_payload("hello"))
            .unwrap();
        session
    }

    #[test]
    fn test_create_from_payload_is_idempotent() {
        let mut session = seeded();
        let id = session
            .create_from_payload(ResourceKind::Messages, message_payload("edited"))
            .unwrap();

        assert_eq!(id.as_deref(), Some(MESSAGE));
        assert_eq!(session.registry().messages().count(), 1);
        let root = session.root_model_id(MESSAGE).unwrap();
        assert_eq!(session.model(&root).unwrap().property("text"), json!("edited"));
        assert_eq!(
            session.identity("arbor:///identities/a").and_then(|i| i.display_name.as_deref()),
            Some("Ann")
        );
    }

    #[test]
    fn test_create_from_payload_rejects_malformed() {
        let mut session = session();
        let err = session
            .create_from_payload(ResourceKind::Messages, json!({"parts": "nope"}))
            .unwrap_err();
        assert!(err.is_malformed());
        assert!(session.registry().is_empty());
        assert_eq!(
            session
                .create_from_payload(ResourceKind::Models, json!({}))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_external_content_is_requested_and_resolved() {
        let mut session = session();
        session
            .create_from_payload(
                ResourceKind::Messages,
                json!({
                    "id": MESSAGE,
                    "conversation": {"id": CONVERSATION},
                    "parts": [{
                        "id": "arbor:///messages/m1/parts/root",
                        "mime_type": "application/vnd.arbor.text+json; role=root; node-id=n1",
                        "content": {"id": "content-1", "size": 16}
                    }]
                }),
            )
            .unwrap();
        let part_id = "arbor:///messages/m1/parts/root";
        assert!(session.content_requests().contains(part_id));

        let body = json!({"text": "late"}).to_string().into_bytes();
        assert!(session.resolve_content(MESSAGE, part_id, body));
        assert!(session.content_requests().is_empty());
        let root = session.root_model_id(MESSAGE).unwrap();
        assert_eq!(session.model(&root).unwrap().property("text"), json!("late"));
    }

    #[test]
    fn test_apply_remote_patch() {
        let mut session = seeded();
        let (sender, mut receiver) = notification_channel();
        session.subscribe(MESSAGE, sender);

        let applied = session
            .apply_remote_patch(MESSAGE, &[PatchOperation::set("title", json!("Hi"))], &SetApplier)
            .unwrap();
        assert!(applied);
        session.flush();

        let message = session.message(MESSAGE).unwrap();
        assert_eq!(message.property("title"), Some(json!("Hi")));
        assert!(message.sync_tracker().outbound().is_empty());
        assert!(matches!(
            receiver.try_recv().unwrap().event,
            EntityEvent::Changed { ref property, .. } if property == "title"
        ));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_apply_remote_patch_unknown_or_rejected() {
        let mut session = seeded();
        assert!(!session
            .apply_remote_patch("arbor:///messages/nope", &[], &SetApplier)
            .unwrap());

        let ops = [
            PatchOperation::set("title", json!("Hi")),
            PatchOperation::delete("metadata"),
        ];
        assert!(session.apply_remote_patch(CONVERSATION, &ops, &SetApplier).is_err());
        let container = session.container(CONVERSATION).unwrap();
        assert_eq!(container.property("title"), None);
        assert!(!container.notifier().is_dirty());
    }

    #[test]
    fn test_destroy_container_cascades() {
        let mut session = seeded();
        let root = session.root_model_id(MESSAGE).unwrap();
        let (sender, mut receiver) = notification_channel();
        session.subscribe(&root, sender);

        assert!(session.destroy_entity(CONVERSATION));
        assert!(session.message(MESSAGE).is_none());
        assert!(session.model(&root).is_none());
        assert_eq!(receiver.try_recv().unwrap().event, EntityEvent::Destroyed);
        assert!(!session.destroy_entity(CONVERSATION));
    }

    #[test]
    fn test_teardown_clears_everything() {
        let mut session = seeded();
        session.create_model(Box::new(crate::model::types::TextModel));
        let mut events = session.subscribe_session();
        session.teardown();

        assert!(session.registry().is_empty());
        assert!(session.identity("arbor:///identities/a").is_none());
        session.publish(SessionEvent::Operation { data: json!({}) });
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_subscribe_models_sees_later_models() {
        let mut session = session();
        let mut receiver = session.subscribe_models();
        let model_id = session.create_model(Box::new(crate::model::types::TextModel));
        session
            .model_mut(&model_id)
            .unwrap()
            .set_property("text", json!("draft"));
        session.flush();

        let delivered = receiver.try_recv().unwrap();
        assert_eq!(delivered.entity_id, model_id);
    }
}
