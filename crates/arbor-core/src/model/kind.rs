use super::action::Action;
use super::descriptor::FieldDescriptor;
use super::generate::GenerateContext;
use super::state::ModelState;
use crate::error::Result;
use crate::part::{ExternalContent, Part};
use crate::session::EntityRegistry;
use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use std::fmt::Debug;

/// Flat list of parts produced by a model generation.
pub type PartsFuture = LocalBoxFuture<'static, Result<Vec<Part>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartChangeKind {
    Added,
    Removed,
    Changed,
}

/// A structural change of one of a model's child parts.
#[derive(Debug, Clone, PartialEq)]
pub struct PartChange {
    pub kind: PartChangeKind,
    pub part: Part,
    /// The child model projected from the part, if any.
    pub model_id: Option<String>,
}

impl PartChange {
    pub fn new(kind: PartChangeKind, part: Part, model_id: Option<String>) -> Self {
        Self {
            kind,
            part,
            model_id,
        }
    }
}

/// Stores binary content that is too large to travel inline.
#[async_trait(?Send)]
pub trait ContentUploader {
    async fn upload(&self, mime_type: &str, body: Vec<u8>) -> Result<ExternalContent>;
}

/// Per-type behavior of a model.
///
/// Properties live in the [`ModelState`] handed to each hook, not in the
/// type itself.
pub trait ModelType: Debug {
    fn name(&self) -> &'static str;

    /// Base MIME type of the root part.
    fn mime_type(&self) -> &'static str;

    /// Declared properties; the base fields are always added.
    fn fields(&self) -> &'static [FieldDescriptor];

    /// Human readable type name.
    fn label(&self) -> &'static str {
        self.name()
    }

    /// One line summary with `${field}` placeholders.
    fn summary_template(&self) -> Option<&'static str> {
        None
    }

    fn default_action(&self) -> Option<Action> {
        None
    }

    /// Updates properties derived from child parts.
    ///
    /// Must reach the same end state when called again for changes that were
    /// already applied.
    fn parse_child_parts(
        &self,
        _state: &mut ModelState,
        _registry: &EntityRegistry,
        _changes: &[PartChange],
        _is_edit: bool,
    ) {
    }

    /// Called after the response summary changed.
    fn parse_responses(&self, _state: &mut ModelState) {}

    /// Plans the parts for the current state.
    ///
    /// Planning runs synchronously; anything that must wait (uploads, child
    /// generations) is folded into the returned future.
    fn generate_parts(
        &self,
        state: &ModelState,
        ctx: &mut GenerateContext<'_>,
    ) -> Result<PartsFuture>;
}
