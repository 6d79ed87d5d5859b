use std::collections::BTreeMap;
use std::fmt;

pub const ROLE: &str = "role";
pub const NODE_ID: &str = "node-id";
pub const PARENT_NODE_ID: &str = "parent-node-id";

/// Attributes appended to a part's MIME type (`; key=value`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimeAttributes {
    values: BTreeMap<String, String>,
}

impl MimeAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn role(&self) -> Option<&str> {
        self.get(ROLE)
    }

    pub fn node_id(&self) -> Option<&str> {
        self.get(NODE_ID)
    }

    pub fn parent_node_id(&self) -> Option<&str> {
        self.get(PARENT_NODE_ID)
    }
}

/// A MIME type split into its base type and attributes.
///
/// Renders as `application/vnd.arbor.text+json; node-id=a; role=root`.
/// Attributes render in key order so equal types render identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimeType {
    pub base: String,
    pub attributes: MimeAttributes,
}

impl MimeType {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            attributes: MimeAttributes::new(),
        }
    }

    /// Parses a full MIME type string.
    ///
    /// Segments without `=` are skipped; values may be double-quoted.
    pub fn parse(raw: &str) -> Self {
        let mut segments = raw.split(';');
        let base = segments.next().unwrap_or_default().trim().to_string();
        let mut attributes = MimeAttributes::new();
        for segment in segments {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let value = value.trim().trim_matches('"');
            attributes.set(key, value);
        }
        Self { base, attributes }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for (key, value) in self.attributes.iter() {
            write!(f, "; {}={}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attributes() {
        let mime = MimeType::parse(
            "application/vnd.arbor.text+json; role=root; node-id=n1; parent-node-id=\"n0\"",
        );
        assert_eq!(mime.base, "application/vnd.arbor.text+json");
        assert_eq!(mime.attributes.role(), Some("root"));
        assert_eq!(mime.attributes.node_id(), Some("n1"));
        assert_eq!(mime.attributes.parent_node_id(), Some("n0"));
    }

    #[test]
    fn test_parse_skips_malformed_segments() {
        let mime = MimeType::parse("text/plain; charset; =x; role=a");
        assert_eq!(mime.base, "text/plain");
        assert_eq!(mime.attributes.iter().count(), 1);
        assert_eq!(mime.attributes.role(), Some("a"));
    }

    #[test]
    fn test_render_is_parseable() {
        let mut mime = MimeType::new("application/json");
        mime.attributes.set(ROLE, "root");
        mime.attributes.set(NODE_ID, "abc");
        let rendered = mime.to_string();
        assert_eq!(rendered, "application/json; node-id=abc; role=root");
        assert_eq!(MimeType::parse(&rendered), mime);
    }
}
