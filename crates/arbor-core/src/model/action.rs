use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The event a model raises when selected, plus its opaque data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl Action {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: Map::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Reads an action property; anything but an object yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.event.is_none() && self.data.is_empty()
    }

    /// Fills in what `self` lacks from `other`; existing keys are kept.
    pub fn merge(&mut self, other: &Action) {
        if self.event.is_none() {
            self.event = other.event.clone();
        }
        for (key, value) in &other.data {
            if !self.data.contains_key(key) {
                self.data.insert(key.clone(), value.clone());
            }
        }
    }
}
