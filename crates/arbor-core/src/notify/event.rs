use serde::Serialize;
use serde_json::Value;

/// An event raised by a single entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityEvent {
    /// A property changed value.
    ///
    /// After coalescing only the first change of a turn is delivered, so
    /// observers must re-read current state instead of trusting the payload.
    Changed {
        property: String,
        old_value: Value,
        new_value: Value,
    },
    /// A model produced a push notification for a message being sent.
    Notification { title: String, text: String },
    /// The entity was destroyed and detached from the registry.
    Destroyed,
}

impl EntityEvent {
    pub fn changed(property: impl Into<String>, old_value: Value, new_value: Value) -> Self {
        Self::Changed {
            property: property.into(),
            old_value,
            new_value,
        }
    }

    pub fn is_change(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// An event together with the id of the entity that raised it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityNotification {
    pub entity_id: String,
    pub event: EntityEvent,
}

/// Session-wide events that are not tied to a cached entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// An `operation` envelope forwarded without interpretation.
    Operation { data: Value },
}
