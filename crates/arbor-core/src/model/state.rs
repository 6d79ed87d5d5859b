use super::descriptor::{self, FieldDescriptor};
use crate::notify::{EntityEvent, Notifier};
use crate::part::Part;
use crate::response::ResponseSummary;
use serde_json::{Map, Value};

/// Non-owning reference to the part a model is projected from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRef {
    pub part_id: String,
    pub node_id: Option<String>,
}

impl PartRef {
    pub fn from_part(part: &Part) -> Self {
        Self {
            part_id: part.id.clone(),
            node_id: part.node_id().map(String::from),
        }
    }
}

/// A child part a model keeps track of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedPart {
    pub part_id: String,
    pub node_id: Option<String>,
    pub role: Option<String>,
    /// Model projected from the part, once materialized.
    pub model_id: Option<String>,
}

impl TrackedPart {
    pub fn from_part(part: &Part) -> Self {
        Self {
            part_id: part.id.clone(),
            node_id: part.node_id().map(String::from),
            role: part.role().map(String::from),
            model_id: None,
        }
    }

    /// Same part, or the same node under a new part id.
    pub fn is_same_node(&self, part: &Part) -> bool {
        self.part_id == part.id
            || (self.node_id.is_some() && self.node_id.as_deref() == part.node_id())
    }
}

/// Everything a model knows about itself.
///
/// Properties are stored under their camel-form field names.
#[derive(Debug)]
pub struct ModelState {
    pub(crate) id: String,
    properties: Map<String, Value>,
    pub(crate) message_id: Option<String>,
    pub(crate) part: Option<PartRef>,
    pub(crate) role: Option<String>,
    pub(crate) parent_id: Option<String>,
    pub(crate) child_parts: Vec<TrackedPart>,
    pub(crate) child_models: Vec<String>,
    pub(crate) responses: ResponseSummary,
    pub(crate) notifier: Notifier,
}

impl ModelState {
    pub(crate) fn new(id: impl Into<String>, fields: &[FieldDescriptor]) -> Self {
        let properties = descriptor::all_fields(fields)
            .map(|field| (field.field.to_string(), field.default_value()))
            .collect();
        Self {
            id: id.into(),
            properties,
            message_id: None,
            part: None,
            role: None,
            parent_id: None,
            child_parts: Vec::new(),
            child_models: Vec::new(),
            responses: ResponseSummary::new(),
            notifier: Notifier::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn part(&self) -> Option<&PartRef> {
        self.part.as_ref()
    }

    pub fn node_id(&self) -> Option<&str> {
        self.part.as_ref().and_then(|part| part.node_id.as_deref())
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    /// Parent node id; explicit for anonymous models.
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn child_parts(&self) -> &[TrackedPart] {
        &self.child_parts
    }

    pub fn child_models(&self) -> &[String] {
        &self.child_models
    }

    pub fn responses(&self) -> &ResponseSummary {
        &self.responses
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.properties.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.properties.get(field).and_then(Value::as_str)
    }

    /// Assigns a property and queues a change when the value differs.
    ///
    /// Returns whether the value changed.
    pub fn set(&mut self, field: &str, value: Value) -> bool {
        let old = self.properties.get(field).cloned().unwrap_or(Value::Null);
        if old == value {
            return false;
        }
        self.notifier
            .queue(EntityEvent::changed(field, old, value.clone()));
        self.properties.insert(field.to_string(), value);
        true
    }

    /// Queues a change of a derived, non-property value such as `responses`.
    pub fn notify_changed(&mut self, property: &str, old_value: Value, new_value: Value) {
        self.notifier
            .queue(EntityEvent::changed(property, old_value, new_value));
    }

    /// Applies a decoded part body.
    ///
    /// Keys map to fields through their wire key or camel form; only
    /// declared fields are taken.
    ///
    /// Returns the number of properties that changed.
    pub fn parse_payload(
        &mut self,
        fields: &[FieldDescriptor],
        payload: &Map<String, Value>,
    ) -> usize {
        let mut changed = 0;
        for (key, value) in payload {
            let Some(field) = descriptor::find_wire_field(fields, key) else {
                continue;
            };
            if self.set(field.field, value.clone()) {
                changed += 1;
            }
        }
        changed
    }

    /// Builds the part body for the declared fields.
    pub fn wire_payload(&self, fields: &[FieldDescriptor]) -> Map<String, Value> {
        let mut payload = Map::new();
        for field in descriptor::all_fields(fields) {
            let value = self
                .properties
                .get(field.field)
                .cloned()
                .unwrap_or_else(|| field.default_value());
            if field.includes(&value) {
                payload.insert(field.wire_name().into_owned(), value);
            }
        }
        payload
    }

    /// Child model ids whose part carries `role`.
    pub fn models_by_role(&self, role: &str) -> Vec<String> {
        self.child_parts
            .iter()
            .filter(|tracked| tracked.role.as_deref() == Some(role))
            .filter_map(|tracked| tracked.model_id.clone())
            .filter(|model_id| self.child_models.contains(model_id))
            .collect()
    }

    /// Records `model_id` as the child model projected from `part_id`.
    pub(crate) fn bind_child(&mut self, part_id: &str, model_id: &str) {
        if let Some(tracked) = self
            .child_parts
            .iter_mut()
            .find(|tracked| tracked.part_id == part_id)
        {
            tracked.model_id = Some(model_id.to_string());
        }
        if !self.child_models.iter().any(|id| id == model_id) {
            self.child_models.push(model_id.to_string());
        }
    }

    /// Follows a child model to its new id.
    pub(crate) fn rename_child(&mut self, old_id: &str, new_id: &str) -> bool {
        let mut renamed = false;
        for id in self.child_models.iter_mut().filter(|id| *id == old_id) {
            *id = new_id.to_string();
            renamed = true;
        }
        for tracked in &mut self.child_parts {
            if tracked.model_id.as_deref() == Some(old_id) {
                tracked.model_id = Some(new_id.to_string());
                renamed = true;
            }
        }
        renamed
    }

    pub(crate) fn tracks_part(&self, part_id: &str) -> bool {
        self.child_parts
            .iter()
            .any(|tracked| tracked.part_id == part_id)
    }

    pub(crate) fn is_root_part(&self, part_id: &str) -> bool {
        self.part
            .as_ref()
            .is_some_and(|part| part.part_id == part_id)
    }

    /// Attaches the model to a message part.
    pub(crate) fn attach(&mut self, message_id: &str, part: &Part) {
        self.message_id = Some(message_id.to_string());
        self.part = Some(PartRef::from_part(part));
        self.role = part.role().map(String::from);
        self.parent_id = part.parent_id().map(String::from);
    }
}
