use crate::container::Container;
use crate::message::Message;
use crate::model::Model;
use std::collections::BTreeMap;

/// Borrowed view of a registered entity.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Container(&'a Container),
    Message(&'a Message),
    Model(&'a Model),
}

impl EntityRef<'_> {
    pub fn id(&self) -> &str {
        match self {
            EntityRef::Container(container) => container.id(),
            EntityRef::Message(message) => message.id(),
            EntityRef::Model(model) => model.id(),
        }
    }
}

/// An entity removed from the registry.
#[derive(Debug)]
pub enum Entity {
    Container(Container),
    Message(Message),
    Model(Model),
}

/// Id → entity for everything cached in a session.
///
/// Holds at most one instance per id: registering a known id is refused.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    containers: BTreeMap<String, Container>,
    messages: BTreeMap<String, Message>,
    models: BTreeMap<String, Model>,
    /// Previous model ids, kept after a model is re-keyed.
    aliases: BTreeMap<String, String>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_by_id(&self, id: &str) -> Option<EntityRef<'_>> {
        if let Some(message) = self.messages.get(id) {
            return Some(EntityRef::Message(message));
        }
        if let Some(container) = self.containers.get(id) {
            return Some(EntityRef::Container(container));
        }
        self.model(id).map(EntityRef::Model)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get_by_id(id).is_some()
    }

    pub fn container(&self, id: &str) -> Option<&Container> {
        self.containers.get(id)
    }

    pub fn container_mut(&mut self, id: &str) -> Option<&mut Container> {
        self.containers.get_mut(id)
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.get(id)
    }

    pub fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.get_mut(id)
    }

    /// Resolves current ids as well as ids a model had before re-keying.
    pub fn model(&self, id: &str) -> Option<&Model> {
        let id = self.resolve_model_id(id)?;
        self.models.get(id)
    }

    pub fn model_mut(&mut self, id: &str) -> Option<&mut Model> {
        let id = self.resolve_model_id(id)?.to_string();
        self.models.get_mut(&id)
    }

    /// Current id of a model known by `id`.
    pub fn resolve_model_id<'a>(&'a self, id: &'a str) -> Option<&'a str> {
        if self.models.contains_key(id) {
            return Some(id);
        }
        self.aliases
            .get(id)
            .map(String::as_str)
            .filter(|current| self.models.contains_key(*current))
    }

    pub fn register_container(&mut self, container: Container) -> bool {
        if self.containers.contains_key(container.id()) {
            return false;
        }
        self.containers.insert(container.id().to_string(), container);
        true
    }

    pub fn register_message(&mut self, message: Message) -> bool {
        if self.messages.contains_key(message.id()) {
            return false;
        }
        self.messages.insert(message.id().to_string(), message);
        true
    }

    pub fn register_model(&mut self, model: Model) -> bool {
        if self.models.contains_key(model.id()) {
            return false;
        }
        self.aliases.remove(model.id());
        self.models.insert(model.id().to_string(), model);
        true
    }

    pub fn unregister(&mut self, id: &str) -> Option<Entity> {
        if let Some(message) = self.messages.remove(id) {
            return Some(Entity::Message(message));
        }
        if let Some(container) = self.containers.remove(id) {
            return Some(Entity::Container(container));
        }
        self.remove_model(id).map(Entity::Model)
    }

    /// Removes a model for good, forgetting the ids it was known by.
    pub fn remove_model(&mut self, id: &str) -> Option<Model> {
        let model = self.take_model(id)?;
        self.aliases.retain(|_, target| target != model.id());
        Some(model)
    }

    /// Removes a model, to be handed back with [`EntityRegistry::put_model`].
    pub fn take_model(&mut self, id: &str) -> Option<Model> {
        let id = self.resolve_model_id(id)?.to_string();
        self.models.remove(&id)
    }

    pub(crate) fn put_model(&mut self, model: Model) {
        self.models.insert(model.id().to_string(), model);
    }

    /// Moves a model to a new id; the old id stays resolvable.
    pub fn rename_model(&mut self, old_id: &str, new_id: &str) -> bool {
        if old_id == new_id {
            return self.models.contains_key(old_id);
        }
        if self.models.contains_key(new_id) {
            return false;
        }
        let Some(mut model) = self.take_model(old_id) else {
            return false;
        };
        let previous = model.id().to_string();
        model.state_mut().id = new_id.to_string();
        self.models.insert(new_id.to_string(), model);
        for target in self.aliases.values_mut() {
            if *target == previous {
                *target = new_id.to_string();
            }
        }
        self.aliases.insert(previous, new_id.to_string());
        true
    }

    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }

    pub fn messages_in(&self, container_id: &str) -> Vec<String> {
        self.messages
            .values()
            .filter(|message| message.container_id() == container_id)
            .map(|message| message.id().to_string())
            .collect()
    }

    pub fn models_for_message(&self, message_id: &str) -> Vec<String> {
        self.models
            .values()
            .filter(|model| model.message_id() == Some(message_id))
            .map(|model| model.id().to_string())
            .collect()
    }

    pub(crate) fn containers_mut(&mut self) -> impl Iterator<Item = &mut Container> {
        self.containers.values_mut()
    }

    pub(crate) fn messages_mut(&mut self) -> impl Iterator<Item = &mut Message> {
        self.messages.values_mut()
    }

    pub(crate) fn models_mut(&mut self) -> impl Iterator<Item = &mut Model> {
        self.models.values_mut()
    }

    pub fn len(&self) -> usize {
        self.containers.len() + self.messages.len() + self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
