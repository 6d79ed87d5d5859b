//! Field descriptor tables.
//!
//! Each model type declares the properties it round-trips through its root
//! part body as an ordered table. Parsing and generation walk the table; a
//! payload key without a matching descriptor is ignored.

use crate::naming;
use serde_json::{Map, Value};
use std::borrow::Cow;

/// One declared model property.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Key used in the part body; empty to derive it from `field`.
    pub wire_key: &'static str,
    /// Camel-form property name on the model.
    pub field: &'static str,
    pub default: fn() -> Value,
    /// Whether a value is written to a generated body.
    pub include_if: fn(&Value) -> bool,
}

impl FieldDescriptor {
    pub const fn new(wire_key: &'static str, field: &'static str, default: fn() -> Value) -> Self {
        Self {
            wire_key,
            field,
            default,
            include_if: is_present,
        }
    }

    /// A property whose wire key is its snake-case field name.
    pub const fn named(field: &'static str, default: fn() -> Value) -> Self {
        Self::new("", field, default)
    }

    pub const fn include_if(self, include_if: fn(&Value) -> bool) -> Self {
        Self { include_if, ..self }
    }

    pub fn default_value(&self) -> Value {
        (self.default)()
    }

    pub fn includes(&self, value: &Value) -> bool {
        (self.include_if)(value)
    }

    pub fn wire_name(&self) -> Cow<'static, str> {
        if self.wire_key.is_empty() {
            Cow::Owned(naming::hyphenate(self.field, '_'))
        } else {
            Cow::Borrowed(self.wire_key)
        }
    }

    /// Whether a body key names this property.
    pub fn matches_key(&self, key: &str) -> bool {
        self.wire_name() == key || naming::camel_case(key) == self.field
    }
}

pub fn null() -> Value {
    Value::Null
}

pub fn empty_string() -> Value {
    Value::String(String::new())
}

pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

pub fn empty_array() -> Value {
    Value::Array(Vec::new())
}

pub fn zero() -> Value {
    Value::from(0)
}

pub fn is_present(value: &Value) -> bool {
    !value.is_null()
}

/// Rejects null, empty strings, empty arrays and empty objects.
pub fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

/// Properties every model type round-trips.
pub const BASE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("action", "action", null),
    FieldDescriptor::named("customData", empty_object).include_if(is_non_empty),
];

/// Looks up a field in the base table, then in `fields`.
pub fn find_field<'a>(
    fields: &'a [FieldDescriptor],
    field: &str,
) -> Option<&'a FieldDescriptor> {
    BASE_FIELDS
        .iter()
        .chain(fields.iter())
        .find(|descriptor| descriptor.field == field)
}

/// Looks up the field a body key maps to.
pub fn find_wire_field<'a>(
    fields: &'a [FieldDescriptor],
    key: &str,
) -> Option<&'a FieldDescriptor> {
    all_fields(fields).find(|descriptor| descriptor.matches_key(key))
}

/// Base fields followed by `fields`.
pub fn all_fields<'a>(
    fields: &'a [FieldDescriptor],
) -> impl Iterator<Item = &'a FieldDescriptor> + 'a {
    BASE_FIELDS.iter().chain(fields.iter())
}
