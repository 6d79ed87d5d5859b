//! Entity identifiers.
//!
//! Every server-addressable entity is named `arbor:///<segment>/<uuid>`.
//! Part ids extend their message id with `/parts/<uuid>`, and the id of the
//! model projected from a part is derived from that part id, so a part and
//! its model are linked one to one.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scheme prefix shared by every entity id.
pub const ID_SCHEME: &str = "arbor:///";

const PARTS_SEGMENT: &str = "/parts/";

/// Kinds of resources the remote service addresses by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Conversations,
    Channels,
    Messages,
    Announcements,
    Identities,
    /// Local typed projections of message parts.
    Models,
}

impl ResourceKind {
    /// The id path segment for this kind.
    pub fn segment(&self) -> &'static str {
        match self {
            ResourceKind::Conversations => "conversations",
            ResourceKind::Channels => "channels",
            ResourceKind::Messages => "messages",
            ResourceKind::Announcements => "announcements",
            ResourceKind::Identities => "identities",
            ResourceKind::Models => "models",
        }
    }

    /// Resolves a kind from the first path segment of an id.
    ///
    /// Returns `None` for ids outside the `arbor:///` scheme.
    pub fn from_id(id: &str) -> Option<Self> {
        let rest = id.strip_prefix(ID_SCHEME)?;
        let segment = rest.split('/').next()?;
        Self::from_segment(segment)
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "conversations" => Some(ResourceKind::Conversations),
            "channels" => Some(ResourceKind::Channels),
            "messages" => Some(ResourceKind::Messages),
            "announcements" => Some(ResourceKind::Announcements),
            "identities" => Some(ResourceKind::Identities),
            "models" => Some(ResourceKind::Models),
            _ => None,
        }
    }

    /// Resolves a kind from a wire `object.type` value.
    ///
    /// Accepts the plural segment form (`messages`) as well as singular and
    /// capitalised class names (`Message`, `conversation`).
    pub fn from_type_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::from_segment(&lower).or_else(|| Self::from_segment(&format!("{}s", lower)))
    }
}

/// Creates a fresh id for the given kind.
pub fn new_id(kind: ResourceKind) -> String {
    format!("{}{}/{}", ID_SCHEME, kind.segment(), Uuid::new_v4())
}

/// Creates a fresh node id for a part in a message tree.
pub fn new_node_id() -> String {
    Uuid::new_v4().to_string()
}

/// Builds the id of a part belonging to `message_id`.
pub fn part_id(message_id: &str) -> String {
    format!("{}{}{}", message_id, PARTS_SEGMENT, Uuid::new_v4())
}

/// Derives a model id from the id of the part it projects.
///
/// `arbor:///messages/<m>/parts/<p>` becomes `arbor:///models/<m>/parts/<p>`.
pub fn model_id_for_part(part_id: &str) -> String {
    let tail = match part_id.find("messages/") {
        Some(index) => &part_id[index + "messages/".len()..],
        None => part_id,
    };
    format!("{}{}/{}", ID_SCHEME, ResourceKind::Models.segment(), tail)
}

/// Derives the id of the message generated for an unsent model.
///
/// The model's uuid becomes the message uuid; any `/parts/...` tail is dropped.
pub fn message_id_for_model(model_id: &str) -> String {
    let without_parts = match model_id.find(PARTS_SEGMENT) {
        Some(index) => &model_id[..index],
        None => model_id,
    };
    let uuid = without_parts.rsplit('/').next().unwrap_or(without_parts);
    format!("{}{}/{}", ID_SCHEME, ResourceKind::Messages.segment(), uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_id() {
        assert_eq!(
            ResourceKind::from_id("arbor:///conversations/abc"),
            Some(ResourceKind::Conversations)
        );
        assert_eq!(
            ResourceKind::from_id("arbor:///messages/abc/parts/def"),
            Some(ResourceKind::Messages)
        );
        assert_eq!(ResourceKind::from_id("X"), None);
        assert_eq!(ResourceKind::from_id("arbor:///widgets/1"), None);
    }

    #[test]
    fn test_kind_from_type_name() {
        assert_eq!(
            ResourceKind::from_type_name("Message"),
            Some(ResourceKind::Messages)
        );
        assert_eq!(
            ResourceKind::from_type_name("channels"),
            Some(ResourceKind::Channels)
        );
        assert_eq!(ResourceKind::from_type_name("Widget"), None);
    }

    #[test]
    fn test_model_and_message_derivation() {
        let model_id = model_id_for_part("arbor:///messages/m1/parts/p1");
        assert_eq!(model_id, "arbor:///models/m1/parts/p1");
        assert_eq!(message_id_for_model(&model_id), "arbor:///messages/m1");
        assert_eq!(
            message_id_for_model("arbor:///models/u1"),
            "arbor:///messages/u1"
        );
    }

    #[test]
    fn test_new_ids_are_unique() {
        let a = new_id(ResourceKind::Models);
        let b = new_id(ResourceKind::Models);
        assert_ne!(a, b);
        assert_eq!(ResourceKind::from_id(&a), Some(ResourceKind::Models));
        assert!(part_id("arbor:///messages/m").starts_with("arbor:///messages/m/parts/"));
    }
}
