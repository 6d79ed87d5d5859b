use crate::error::Result;
use crate::model::descriptor::{FieldDescriptor, empty_string, is_non_empty, null};
use crate::model::{
    Action, GenerateContext, ModelState, ModelType, PartChange, PartChangeKind, PartsFuture,
};
use crate::part::Part;
use crate::session::EntityRegistry;
use serde_json::{Value, json};

pub const FILE_MIME_TYPE: &str = "application/vnd.arbor.file+json";
/// Role of the child part holding the file bytes.
pub const SOURCE_ROLE: &str = "source";

const FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("title", "title", empty_string).include_if(is_non_empty),
    FieldDescriptor::named("size", null),
    FieldDescriptor::named("sourceMimeType", null),
];

/// A file: metadata in the root part, bytes in a `source` child part.
///
/// `sourcePart` holds the id of the received source part.
#[derive(Debug, Clone, Default)]
pub struct FileModel {
    source: Option<(String, Vec<u8>)>,
}

impl FileModel {
    /// A file model about to be sent with the given content.
    pub fn with_source(mime_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: Some((mime_type.into(), bytes.into())),
        }
    }
}

impl ModelType for FileModel {
    fn name(&self) -> &'static str {
        "file"
    }

    fn mime_type(&self) -> &'static str {
        FILE_MIME_TYPE
    }

    fn fields(&self) -> &'static [FieldDescriptor] {
        FIELDS
    }

    fn label(&self) -> &'static str {
        "File"
    }

    fn summary_template(&self) -> Option<&'static str> {
        Some("${title}")
    }

    fn default_action(&self) -> Option<Action> {
        Some(Action::new("open-file"))
    }

    fn parse_child_parts(
        &self,
        state: &mut ModelState,
        _registry: &EntityRegistry,
        changes: &[PartChange],
        _is_edit: bool,
    ) {
        for change in changes {
            if change.part.role() != Some(SOURCE_ROLE) {
                continue;
            }
            let source = match change.kind {
                PartChangeKind::Removed => Value::Null,
                PartChangeKind::Added | PartChangeKind::Changed => json!(change.part.id),
            };
            state.set("sourcePart", source);
        }
    }

    fn generate_parts(
        &self,
        state: &ModelState,
        ctx: &mut GenerateContext<'_>,
    ) -> Result<PartsFuture> {
        let mut payload = state.wire_payload(FIELDS);
        if let Some((mime_type, bytes)) = &self.source {
            payload.insert("size".to_string(), json!(bytes.len()));
            payload.insert("source_mime_type".to_string(), json!(mime_type));
            ctx.add_child_part(Part::new(mime_type.clone(), bytes.clone()), SOURCE_ROLE);
        }
        let root = ctx.root_part(FILE_MIME_TYPE, &payload);
        Ok(ctx.finish(root))
    }
}
