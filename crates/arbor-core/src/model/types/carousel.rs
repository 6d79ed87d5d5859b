use crate::error::Result;
use crate::model::descriptor::{FieldDescriptor, empty_string, is_non_empty};
use crate::model::{GenerateContext, ModelState, ModelType, PartChange, PartsFuture};
use crate::session::EntityRegistry;
use serde_json::{Value, json};

pub const CAROUSEL_MIME_TYPE: &str = "application/vnd.arbor.carousel+json";
pub const CAROUSEL_ITEM_ROLE: &str = "carousel-item";

const FIELDS: &[FieldDescriptor] =
    &[FieldDescriptor::new("title", "title", empty_string).include_if(is_non_empty)];

/// An ordered set of item models.
///
/// `items` lists the item model ids. Before sending it names the unsent
/// item models; after parsing it is recomputed from the child parts.
#[derive(Debug, Clone, Copy, Default)]
pub struct CarouselModel;

impl CarouselModel {
    fn item_ids(state: &ModelState) -> Vec<String> {
        match state.get("items") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl ModelType for CarouselModel {
    fn name(&self) -> &'static str {
        "carousel"
    }

    fn mime_type(&self) -> &'static str {
        CAROUSEL_MIME_TYPE
    }

    fn fields(&self) -> &'static [FieldDescriptor] {
        FIELDS
    }

    fn label(&self) -> &'static str {
        "Carousel"
    }

    fn parse_child_parts(
        &self,
        state: &mut ModelState,
        registry: &EntityRegistry,
        _changes: &[PartChange],
        _is_edit: bool,
    ) {
        // Full rescan so repeated calls converge.
        let items: Vec<String> = state
            .models_by_role(CAROUSEL_ITEM_ROLE)
            .into_iter()
            .filter(|model_id| registry.model(model_id).is_some())
            .collect();
        state.set("items", json!(items));
    }

    fn generate_parts(
        &self,
        state: &ModelState,
        ctx: &mut GenerateContext<'_>,
    ) -> Result<PartsFuture> {
        for item_id in Self::item_ids(state) {
            ctx.add_child_model(&item_id, CAROUSEL_ITEM_ROLE)?;
        }
        let root = ctx.root_part(CAROUSEL_MIME_TYPE, &state.wire_payload(FIELDS));
        Ok(ctx.finish(root))
    }
}
