//! Patch contracts.
//!
//! `update` change events carry a list of `{property, operation, value}`
//! edits. The interpreter turning those edits into mutations sits behind
//! [`PatchApplier`]; entities expose themselves to it through [`Patchable`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A single edit instruction for a cached entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    /// Dotted property path, e.g. `metadata.topic` or `recipient_status.<id>`.
    pub property: String,
    /// `set`, `delete`, `add` or `remove`.
    pub operation: String,
    #[serde(default)]
    pub value: Value,
    /// Element id for `add`/`remove` on collections of objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl PatchOperation {
    pub fn new(property: impl Into<String>, operation: impl Into<String>, value: Value) -> Self {
        Self {
            property: property.into(),
            operation: operation.into(),
            value,
            id: None,
        }
    }

    pub fn set(property: impl Into<String>, value: Value) -> Self {
        Self::new(property, "set", value)
    }

    pub fn add(property: impl Into<String>, value: Value) -> Self {
        Self::new(property, "add", value)
    }

    pub fn remove(property: impl Into<String>, value: Value) -> Self {
        Self::new(property, "remove", value)
    }

    pub fn delete(property: impl Into<String>) -> Self {
        Self::new(property, "delete", Value::Null)
    }

    /// First path segment of the property.
    pub fn root_property(&self) -> &str {
        self.property.split('.').next().unwrap_or_default()
    }
}

/// Errors raised while applying a patch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatchError {
    #[error("unsupported patch operation '{operation}' on '{property}'")]
    UnsupportedOperation { property: String, operation: String },

    #[error("invalid property path '{property}'")]
    InvalidPath { property: String },

    #[error("type mismatch at '{property}': expected {expected}")]
    TypeMismatch {
        property: String,
        expected: &'static str,
    },

    /// The entity refused the patched state.
    #[error("patch rejected for '{property}': {message}")]
    Rejected { property: String, message: String },
}

impl PatchError {
    pub fn rejected(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            property: property.into(),
            message: message.into(),
        }
    }
}

/// An entity that can be mutated by remote patches.
pub trait Patchable {
    /// Snapshot of the patchable properties as a JSON object.
    fn patch_state(&self) -> Value;

    /// Replaces the patchable properties with a patched snapshot.
    ///
    /// Must validate the whole snapshot before mutating anything, so a
    /// rejected patch leaves the entity untouched.
    fn absorb_patch(&mut self, state: Value) -> Result<(), PatchError>;

    /// Marks a remote patch in progress. While set, mutations are not
    /// recorded for outbound sync.
    fn set_remote_patch(&mut self, active: bool);
}

/// Interprets patch operations against an entity.
pub trait PatchApplier {
    fn apply(
        &self,
        target: &mut dyn Patchable,
        operations: &[PatchOperation],
    ) -> Result<(), PatchError>;
}

/// Local mutations waiting to be synced to the server.
///
/// Recording is suppressed while a remote patch is being applied, so the
/// applier's own writes never echo back as outbound edits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncTracker {
    in_remote_patch: bool,
    outbound: Vec<PatchOperation>,
}

impl SyncTracker {
    pub fn record(&mut self, operation: PatchOperation) {
        if self.in_remote_patch {
            return;
        }
        self.outbound.push(operation);
    }

    pub fn set_remote_patch(&mut self, active: bool) {
        self.in_remote_patch = active;
    }

    pub fn in_remote_patch(&self) -> bool {
        self.in_remote_patch
    }

    pub fn outbound(&self) -> &[PatchOperation] {
        &self.outbound
    }

    pub fn take_outbound(&mut self) -> Vec<PatchOperation> {
        std::mem::take(&mut self.outbound)
    }
}
