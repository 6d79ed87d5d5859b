use crate::error::Result;
use crate::model::descriptor::{FieldDescriptor, empty_string, is_non_empty};
use crate::model::{GenerateContext, ModelState, ModelType, PartsFuture};

pub const TEXT_MIME_TYPE: &str = "application/vnd.arbor.text+json";

const FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("text", "text", empty_string).include_if(is_non_empty),
    FieldDescriptor::new("title", "title", empty_string).include_if(is_non_empty),
    FieldDescriptor::new("author", "author", empty_string).include_if(is_non_empty),
    FieldDescriptor::new("subtitle", "subtitle", empty_string).include_if(is_non_empty),
];

/// Plain text with optional title, author and subtitle.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextModel;

impl ModelType for TextModel {
    fn name(&self) -> &'static str {
        "text"
    }

    fn mime_type(&self) -> &'static str {
        TEXT_MIME_TYPE
    }

    fn fields(&self) -> &'static [FieldDescriptor] {
        FIELDS
    }

    fn label(&self) -> &'static str {
        "Text"
    }

    fn summary_template(&self) -> Option<&'static str> {
        Some("${text}")
    }

    fn generate_parts(
        &self,
        state: &ModelState,
        ctx: &mut GenerateContext<'_>,
    ) -> Result<PartsFuture> {
        let root = ctx.root_part(TEXT_MIME_TYPE, &state.wire_payload(FIELDS));
        Ok(ctx.finish(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::model::{Action, Model};
    use crate::part::Part;
    use serde_json::json;

    fn text_model() -> Model {
        Model::new("arbor:///models/t1", Box::new(TextModel))
    }

    #[test]
    fn test_parse_part_ignores_unknown_keys() {
        let mut model = text_model();
        let part = Part::new(
            TEXT_MIME_TYPE,
            r#"{"text":"hello","title":"greeting","font":"serif","custom_data":{"a":1}}"#,
        );
        assert_eq!(model.parse_part(&part, false), 3);
        assert_eq!(model.property("text"), json!("hello"));
        assert_eq!(model.property("customData"), json!({"a": 1}));
        assert_eq!(model.property("font"), json!(null));
        assert_eq!(model.parse_part(&part, true), 0);
    }

    #[test]
    fn test_malformed_body_leaves_properties() {
        let mut model = text_model();
        model.set_property("text", json!("kept"));
        let part = Part::new(TEXT_MIME_TYPE, "{broken");
        assert_eq!(model.parse_part(&part, true), 0);
        assert_eq!(model.property("text"), json!("kept"));
    }

    #[test]
    fn test_wire_payload_parses_back() {
        let mut model = text_model();
        model.set_property("text", json!("hello"));
        model.set_property("author", json!("ann"));
        model.merge_action(&Action::new("reply"));

        let mut copy = text_model();
        copy.parse_payload(&model.wire_payload(), false);
        assert_eq!(copy.state().properties(), model.state().properties());
        assert!(!model.set_property("font", json!("serif")));
    }

    #[test]
    fn test_summary_and_notification() {
        let mut model = text_model();
        assert_eq!(model.one_line_summary(), "Text");
        model.set_property("text", json!("lunch?"));
        assert_eq!(model.one_line_summary(), "lunch?");

        let notification = model.notification(&SyncConfig::default(), "Ann");
        assert_eq!(notification.title, "New Message from Ann");
        assert_eq!(notification.text, "lunch?");
    }

    #[test]
    fn test_merge_action() {
        let mut model = text_model();
        model.merge_action(&Action::new("open").with_data("id", json!(1)));
        model.merge_action(&Action::new("other").with_data("id", json!(2)).with_data("x", json!(3)));
        assert_eq!(model.action_event().as_deref(), Some("open"));
        assert_eq!(model.action_data()["id"], json!(1));
        assert_eq!(model.action_data()["x"], json!(3));
    }
}
