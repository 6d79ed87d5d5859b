use super::mime::{MimeType, NODE_ID, PARENT_NODE_ID, ROLE};
use crate::error::{ArborError, Result};
use crate::ids;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role of the part a message's root model is projected from.
pub const ROLE_ROOT: &str = "root";
/// Role of the part carrying aggregated participant responses.
pub const ROLE_RESPONSE_SUMMARY: &str = "response_summary";

/// Body stored remotely and downloaded on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalContent {
    pub id: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// A node of a message tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    /// Storage id (`<message-id>/parts/<uuid>`); empty until attached to a message.
    pub id: String,
    pub mime: MimeType,
    /// Raw body; `None` while external content has not been fetched.
    pub body: Option<Vec<u8>>,
    pub content: Option<ExternalContent>,
}

impl Part {
    /// Creates an unattached part with a fresh node id.
    pub fn new(mime_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        let mut mime = MimeType::new(mime_type);
        mime.attributes.set(NODE_ID, ids::new_node_id());
        Self {
            id: String::new(),
            mime,
            body: Some(body.into()),
            content: None,
        }
    }

    /// Creates a part whose body is a JSON object.
    pub fn with_json(mime_type: impl Into<String>, body: &Map<String, Value>) -> Self {
        let encoded = Value::Object(body.clone()).to_string();
        Self::new(mime_type, encoded.into_bytes())
    }

    /// Identity of the part across edits; `None` when absent or empty.
    pub fn node_id(&self) -> Option<&str> {
        self.mime.attributes.node_id().filter(|id| !id.is_empty())
    }

    pub fn set_node_id(&mut self, node_id: impl Into<String>) {
        self.mime.attributes.set(NODE_ID, node_id);
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.mime.attributes.parent_node_id().filter(|id| !id.is_empty())
    }

    pub fn set_parent_id(&mut self, parent_node_id: impl Into<String>) {
        self.mime.attributes.set(PARENT_NODE_ID, parent_node_id);
    }

    pub fn role(&self) -> Option<&str> {
        self.mime.attributes.role()
    }

    pub fn set_role(&mut self, role: impl Into<String>) {
        self.mime.attributes.set(ROLE, role);
    }

    pub fn mime_base(&self) -> &str {
        &self.mime.base
    }

    pub fn is_response_summary(&self) -> bool {
        self.role() == Some(ROLE_RESPONSE_SUMMARY)
    }

    /// True when the body lives remotely and has not been fetched yet.
    pub fn needs_content(&self) -> bool {
        self.body.is_none() && self.content.is_some()
    }

    pub fn body_text(&self) -> Option<&str> {
        self.body
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// Decodes the body as a JSON object.
    ///
    /// A part without a body yields an empty payload. A body that is not a
    /// JSON object is a `MalformedPayload` error.
    pub fn json_payload(&self) -> Result<Map<String, Value>> {
        let Some(bytes) = self.body.as_deref() else {
            return Ok(Map::new());
        };
        if bytes.is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ArborError::malformed(format!(
                "part {} body is not an object: {}",
                self.id, other
            ))),
            Err(err) => Err(ArborError::malformed(format!(
                "part {} body is not JSON: {}",
                self.id, err
            ))),
        }
    }

    pub fn from_payload(payload: PartPayload) -> Result<Self> {
        let body = match payload.body {
            None => None,
            Some(text) => match payload.encoding.as_deref() {
                Some("base64") => Some(STANDARD.decode(text.as_bytes())?),
                _ => Some(text.into_bytes()),
            },
        };
        Ok(Self {
            id: payload.id,
            mime: MimeType::parse(&payload.mime_type),
            body,
            content: payload.content,
        })
    }

    /// Builds the wire form; non UTF-8 bodies are base64 encoded.
    pub fn to_payload(&self) -> PartPayload {
        let (body, encoding) = match self.body.as_deref() {
            None => (None, None),
            Some(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => (Some(text.to_string()), None),
                Err(_) => (Some(STANDARD.encode(bytes)), Some("base64".to_string())),
            },
        };
        PartPayload {
            id: self.id.clone(),
            mime_type: self.mime.to_string(),
            body,
            encoding,
            content: self.content.clone(),
        }
    }
}

/// Wire representation of a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartPayload {
    #[serde(default)]
    pub id: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ExternalContent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_part_has_node_id() {
        let part = Part::new("text/plain", "hello");
        assert!(part.node_id().is_some());
        assert_eq!(part.parent_id(), None);
        assert_eq!(part.body_text(), Some("hello"));
    }

    #[test]
    fn test_missing_node_id_is_none() {
        let part = Part::from_payload(PartPayload {
            id: "arbor:///messages/m1/parts/a".to_string(),
            mime_type: "text/plain; role=root".to_string(),
            body: Some("hi".to_string()),
            encoding: None,
            content: None,
        })
        .unwrap();
        assert_eq!(part.node_id(), None);

        let mut empty = part.clone();
        empty.set_node_id("");
        empty.set_parent_id("");
        assert_eq!(empty.node_id(), None);
        assert_eq!(empty.parent_id(), None);
    }

    #[test]
    fn test_json_payload() {
        let mut body = Map::new();
        body.insert("text".to_string(), json!("hi"));
        let part = Part::with_json("application/vnd.arbor.text+json", &body);
        assert_eq!(part.json_payload().unwrap(), body);
    }

    #[test]
    fn test_json_payload_malformed() {
        let part = Part::new("application/json", "{not json");
        assert!(part.json_payload().unwrap_err().is_malformed());

        let array = Part::new("application/json", "[1, 2]");
        assert!(array.json_payload().unwrap_err().is_malformed());
    }

    #[test]
    fn test_missing_body_is_empty_payload() {
        let mut part = Part::new("application/json", "");
        part.body = None;
        part.content = Some(ExternalContent {
            id: "c1".to_string(),
            download_url: None,
            size: 10,
        });
        assert!(part.needs_content());
        assert!(part.json_payload().unwrap().is_empty());
    }

    #[test]
    fn test_binary_body_uses_base64_on_the_wire() {
        let mut part = Part::new("image/png", vec![0xff, 0x00, 0x10]);
        part.id = "arbor:///messages/m/parts/p".to_string();
        part.set_role("source");
        let payload = part.to_payload();
        assert_eq!(payload.encoding.as_deref(), Some("base64"));
        assert!(payload.mime_type.contains("role=source"));

        let decoded = Part::from_payload(payload).unwrap();
        assert_eq!(decoded, part);
    }
}
