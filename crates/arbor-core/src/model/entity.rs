use super::action::Action;
use super::kind::ModelType;
use super::state::ModelState;
use crate::config::SyncConfig;
use crate::message::PushNotification;
use crate::notify::Notifier;
use crate::part::Part;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder"));

/// A typed projection of a part and its descendants.
#[derive(Debug)]
pub struct Model {
    kind: Box<dyn ModelType>,
    state: ModelState,
}

impl Model {
    pub fn new(id: impl Into<String>, kind: Box<dyn ModelType>) -> Self {
        let state = ModelState::new(id, kind.fields());
        Self { kind, state }
    }

    /// An anonymous model: no backing part, parent given explicitly.
    pub fn anonymous(
        id: impl Into<String>,
        kind: Box<dyn ModelType>,
        parent_id: impl Into<String>,
    ) -> Self {
        let mut model = Self::new(id, kind);
        model.state.parent_id = Some(parent_id.into());
        model
    }

    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn kind(&self) -> &dyn ModelType {
        self.kind.as_ref()
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    pub(crate) fn split_mut(&mut self) -> (&dyn ModelType, &mut ModelState) {
        (self.kind.as_ref(), &mut self.state)
    }

    pub fn message_id(&self) -> Option<&str> {
        self.state.message_id()
    }

    pub fn node_id(&self) -> Option<&str> {
        self.state.node_id()
    }

    pub fn part_id(&self) -> Option<&str> {
        self.state.part().map(|part| part.part_id.as_str())
    }

    pub fn role(&self) -> Option<&str> {
        self.state.role()
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.state.parent_id()
    }

    pub fn is_anonymous(&self) -> bool {
        self.state.part().is_none()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.state.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut Notifier {
        &mut self.state.notifier
    }

    /// Current value of a declared property, falling back to its default.
    pub fn property(&self, field: &str) -> Value {
        self.state.get(field).cloned().unwrap_or(Value::Null)
    }

    /// Assigns a declared property; undeclared names are refused.
    pub fn set_property(&mut self, field: &str, value: Value) -> bool {
        if super::descriptor::find_field(self.kind.fields(), field).is_none() {
            tracing::debug!(model_id = %self.id(), field, "Ignoring undeclared property");
            return false;
        }
        self.state.set(field, value)
    }

    pub fn parse_payload(&mut self, payload: &Map<String, Value>, is_edit: bool) -> usize {
        let changed = self.state.parse_payload(self.kind.fields(), payload);
        if changed > 0 {
            tracing::debug!(model_id = %self.id(), changed, is_edit, "Parsed model payload");
        }
        changed
    }

    /// Parses the body of the model's root part.
    ///
    /// A body that fails to decode leaves every property untouched.
    pub fn parse_part(&mut self, part: &Part, is_edit: bool) -> usize {
        match part.json_payload() {
            Ok(payload) => self.parse_payload(&payload, is_edit),
            Err(err) => {
                tracing::warn!(model_id = %self.id(), part_id = %part.id, "{}", err);
                0
            }
        }
    }

    pub fn wire_payload(&self) -> Map<String, Value> {
        self.state.wire_payload(self.kind.fields())
    }

    pub fn action(&self) -> Option<Action> {
        Action::from_value(&self.property("action"))
    }

    /// Merges `action` into the stored one without overwriting existing keys.
    pub fn merge_action(&mut self, action: &Action) {
        let mut merged = self.action().unwrap_or_default();
        merged.merge(action);
        self.state.set("action", merged.to_value());
    }

    /// The action event, falling back to the type's default.
    pub fn action_event(&self) -> Option<String> {
        self.effective_action().event
    }

    pub fn action_data(&self) -> Map<String, Value> {
        self.effective_action().data
    }

    fn effective_action(&self) -> Action {
        let mut action = self.action().unwrap_or_default();
        if let Some(default) = self.kind.default_action() {
            action.merge(&default);
        }
        action
    }

    /// Resolves `${field}` placeholders against the model's properties.
    ///
    /// `extra` values take precedence; unknown placeholders become empty.
    pub fn render_template(&self, template: &str, extra: &[(&str, &str)]) -> String {
        PLACEHOLDER
            .replace_all(template, |captures: &Captures<'_>| {
                let name = &captures[1];
                if let Some((_, value)) = extra.iter().find(|(key, _)| *key == name) {
                    return value.to_string();
                }
                match self.state.get(name) {
                    Some(Value::String(text)) => text.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                }
            })
            .into_owned()
    }

    pub fn one_line_summary(&self) -> String {
        match self.kind.summary_template() {
            Some(template) => {
                let summary = self.render_template(template, &[]);
                if summary.trim().is_empty() {
                    self.kind.label().to_string()
                } else {
                    summary
                }
            }
            None => self.kind.label().to_string(),
        }
    }

    /// Push notification announcing this model to recipients.
    pub fn notification(&self, config: &SyncConfig, sender_name: &str) -> PushNotification {
        PushNotification {
            title: self.render_template(
                &config.notification_title,
                &[("messageSender", sender_name)],
            ),
            text: self.one_line_summary(),
        }
    }

    pub fn flush(&mut self) -> usize {
        self.state.notifier.flush(&self.state.id)
    }

    pub(crate) fn destroy(&mut self) {
        let id = self.state.id.clone();
        self.state.notifier.destroy(&id);
    }
}
