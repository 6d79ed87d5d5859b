//! Model generation context.
//!
//! Generating a message walks the model tree depth first. Every model plans
//! its root part and registers children on the context; the futures of all
//! children are joined under their parent, so sibling order is not
//! significant and only the `parent-node-id` linkage carries structure.

use super::kind::{ContentUploader, PartsFuture};
use crate::config::SyncConfig;
use crate::error::{ArborError, Result};
use crate::ids;
use crate::part::Part;
use crate::session::EntityRegistry;
use futures::future;
use serde_json::{Map, Value};
use std::rc::Rc;

struct Scope {
    node_id: String,
    children: Vec<PartsFuture>,
}

impl Scope {
    fn new(node_id: String) -> Self {
        Self {
            node_id,
            children: Vec::new(),
        }
    }
}

/// Handed to [`ModelType::generate_parts`](super::ModelType::generate_parts).
///
/// Only the session creates one, so children can only be attached while a
/// generation runs.
pub struct GenerateContext<'a> {
    registry: &'a EntityRegistry,
    uploader: Rc<dyn ContentUploader>,
    config: &'a SyncConfig,
    current: Scope,
    parents: Vec<Scope>,
    bindings: Vec<(String, String)>,
}

impl<'a> GenerateContext<'a> {
    pub(crate) fn new(
        registry: &'a EntityRegistry,
        uploader: Rc<dyn ContentUploader>,
        config: &'a SyncConfig,
    ) -> Self {
        Self {
            registry,
            uploader,
            config,
            current: Scope::new(String::new()),
            parents: Vec::new(),
            bindings: Vec::new(),
        }
    }

    /// Root node id of the model currently generating.
    pub fn node_id(&self) -> &str {
        &self.current.node_id
    }

    pub fn config(&self) -> &SyncConfig {
        self.config
    }

    pub fn registry(&self) -> &EntityRegistry {
        self.registry
    }

    /// Builds the root part of the current model from a wire payload.
    pub fn root_part(&self, mime_type: &str, payload: &Map<String, Value>) -> Part {
        let mut part = Part::with_json(mime_type, payload);
        part.set_node_id(self.current.node_id.clone());
        part
    }

    /// Generates `model_id` as a child tagged with `role`.
    pub fn add_child_model(&mut self, model_id: &str, role: &str) -> Result<()> {
        let parent_node_id = self.current.node_id.clone();
        let child = self.generate_model(model_id)?;
        let role = role.to_string();
        self.current.children.push(Box::pin(async move {
            let mut parts = child.await?;
            if let Some(root) = parts.first_mut() {
                root.set_role(role);
                root.set_parent_id(parent_node_id);
            }
            Ok::<_, ArborError>(parts)
        }));
        Ok(())
    }

    /// Attaches a raw part tagged with `role`.
    ///
    /// Bodies above the configured inline limit are uploaded and replaced by
    /// external content before the part is emitted.
    pub fn add_child_part(&mut self, mut part: Part, role: &str) {
        part.set_role(role);
        part.set_parent_id(self.current.node_id.clone());

        let oversized = part
            .body
            .as_ref()
            .is_some_and(|body| body.len() > self.config.max_inline_body_size);
        if !oversized {
            self.current
                .children
                .push(Box::pin(future::ready(Ok::<_, ArborError>(vec![part]))));
            return;
        }

        let uploader = Rc::clone(&self.uploader);
        self.current.children.push(Box::pin(async move {
            let mime_type = part.mime_base().to_string();
            let body = part.body.take().unwrap_or_default();
            let size = body.len();
            let content = uploader.upload(&mime_type, body).await?;
            tracing::debug!(content_id = %content.id, size, "Uploaded part body");
            part.content = Some(content);
            Ok::<_, ArborError>(vec![part])
        }));
    }

    /// Closes the current model: its root part followed by its children.
    pub fn finish(&mut self, root: Part) -> PartsFuture {
        let children = std::mem::take(&mut self.current.children);
        Box::pin(async move {
            let mut parts = vec![root];
            for generated in future::join_all(children).await {
                parts.extend(generated?);
            }
            Ok::<_, ArborError>(parts)
        })
    }

    pub(crate) fn generate_model(&mut self, model_id: &str) -> Result<PartsFuture> {
        let registry = self.registry;
        let model = registry
            .model(model_id)
            .ok_or_else(|| ArborError::not_found("model", model_id))?;
        let node_id = model
            .node_id()
            .map(String::from)
            .unwrap_or_else(ids::new_node_id);
        self.bindings
            .push((node_id.clone(), model.id().to_string()));

        let parent = std::mem::replace(&mut self.current, Scope::new(node_id));
        self.parents.push(parent);
        let generated = model.kind().generate_parts(model.state(), self);
        if let Some(parent) = self.parents.pop() {
            self.current = parent;
        }
        generated
    }

    /// Node id → model id for every model generated.
    pub(crate) fn into_bindings(self) -> Vec<(String, String)> {
        self.bindings
    }
}
