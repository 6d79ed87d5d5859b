//! Aggregated participant responses attached to a message.

use crate::part::Part;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct ResponseSummaryBody {
    #[serde(default)]
    participant_data: BTreeMap<String, Map<String, Value>>,
}

/// Participant identity → response data, backed by a `response_summary` part.
///
/// The map is only ever replaced as a whole; the server merges responses of
/// different participants before delivering them as one summary part.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseSummary {
    part_id: Option<String>,
    participant_data: BTreeMap<String, Map<String, Value>>,
}

impl ResponseSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the summary with the content of `part`.
    ///
    /// Returns `true` when the participant data actually changed. A body
    /// that fails to decode leaves the summary untouched.
    pub fn parse_response_part(&mut self, part: &Part) -> bool {
        self.part_id = Some(part.id.clone());
        let body = match part.body.as_deref() {
            None => return false,
            Some(bytes) => bytes,
        };
        let parsed: ResponseSummaryBody = match serde_json::from_slice(body) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(part_id = %part.id, "Ignoring malformed response summary: {}", err);
                return false;
            }
        };
        if parsed.participant_data == self.participant_data {
            return false;
        }
        self.participant_data = parsed.participant_data;
        true
    }

    /// Clears the summary; used when its part is removed.
    pub fn reset(&mut self) {
        self.part_id = None;
        self.participant_data.clear();
    }

    /// Id of the part the summary was parsed from.
    pub fn part_id(&self) -> Option<&str> {
        self.part_id.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.participant_data.is_empty()
    }

    pub fn participant_data(&self) -> &BTreeMap<String, Map<String, Value>> {
        &self.participant_data
    }

    /// The named response of one participant.
    pub fn get_response(&self, name: &str, identity_id: &str) -> Option<&Value> {
        self.participant_data.get(identity_id)?.get(name)
    }

    /// The named response of every listed participant that gave one.
    ///
    /// An empty `identity_ids` slice means every participant.
    pub fn get_responses(&self, name: &str, identity_ids: &[&str]) -> Vec<(String, Value)> {
        self.participant_data
            .iter()
            .filter(|(identity, _)| {
                identity_ids.is_empty() || identity_ids.contains(&identity.as_str())
            })
            .filter_map(|(identity, data)| {
                data.get(name)
                    .map(|value| (identity.clone(), value.clone()))
            })
            .collect()
    }

    pub fn to_value(&self) -> Value {
        let data: Map<String, Value> = self
            .participant_data
            .iter()
            .map(|(identity, data)| (identity.clone(), Value::Object(data.clone())))
            .collect();
        Value::Object(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::ROLE_RESPONSE_SUMMARY;
    use serde_json::json;

    fn summary_part(body: Value) -> Part {
        let mut part = Part::new(
            "application/vnd.arbor.responsesummary-v2+json",
            body.to_string().into_bytes(),
        );
        part.id = "arbor:///messages/m/parts/r".to_string();
        part.set_role(ROLE_RESPONSE_SUMMARY);
        part
    }

    #[test]
    fn test_parse_reports_changes_once() {
        let part = summary_part(json!({
            "participant_data": {
                "arbor:///identities/a": {"selection": "yes"},
                "arbor:///identities/b": {"selection": "no"}
            }
        }));
        let mut summary = ResponseSummary::new();
        assert!(summary.parse_response_part(&part));
        assert!(!summary.parse_response_part(&part));
        assert_eq!(
            summary.get_response("selection", "arbor:///identities/a"),
            Some(&json!("yes"))
        );
        assert_eq!(summary.part_id(), Some("arbor:///messages/m/parts/r"));
    }

    #[test]
    fn test_replacement_not_merge() {
        let mut summary = ResponseSummary::new();
        summary.parse_response_part(&summary_part(json!({
            "participant_data": {"a": {"selection": "yes"}, "b": {"selection": "no"}}
        })));
        summary.parse_response_part(&summary_part(json!({
            "participant_data": {"a": {"selection": "maybe"}}
        })));
        assert_eq!(summary.participant_data().len(), 1);
        assert_eq!(summary.get_response("selection", "b"), None);
    }

    #[test]
    fn test_malformed_body_keeps_state() {
        let mut summary = ResponseSummary::new();
        summary.parse_response_part(&summary_part(json!({
            "participant_data": {"a": {"selection": "yes"}}
        })));
        let mut broken = summary_part(json!({}));
        broken.body = Some(b"{nope".to_vec());
        assert!(!summary.parse_response_part(&broken));
        assert_eq!(summary.get_response("selection", "a"), Some(&json!("yes")));
    }

    #[test]
    fn test_get_responses_and_reset() {
        let mut summary = ResponseSummary::new();
        summary.parse_response_part(&summary_part(json!({
            "participant_data": {
                "a": {"selection": "yes"},
                "b": {"comment": "hmm"},
                "c": {"selection": "no"}
            }
        })));
        assert_eq!(summary.get_responses("selection", &[]).len(), 2);
        assert_eq!(
            summary.get_responses("selection", &["c"]),
            vec![("c".to_string(), json!("no"))]
        );

        summary.reset();
        assert!(summary.is_empty());
        assert_eq!(summary.part_id(), None);
        assert_eq!(summary.to_value(), json!({}));
    }
}
