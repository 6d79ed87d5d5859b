//! Lazy materialization predicates.
//!
//! The local cache is partial. A patch for an entity the client does not
//! hold is offered to the loader registered for its resource kind, which
//! decides whether the entity should now be fetched and cached.

use arbor_core::Session;
use arbor_core::config::LazyLoadConfig;
use arbor_core::ids::ResourceKind;
use arbor_core::patch::PatchOperation;
use serde_json::Value;

/// Decides whether an orphaned patch warrants fetching its entity.
pub trait ResourceLoader {
    fn kind(&self) -> ResourceKind;

    fn should_load(&self, operations: &[PatchOperation], session: &Session) -> bool;
}

/// Loads a conversation or channel once the owner becomes a participant.
#[derive(Debug, Clone, Copy)]
pub struct MembershipLoader {
    kind: ResourceKind,
}

impl MembershipLoader {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }
}

impl ResourceLoader for MembershipLoader {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn should_load(&self, operations: &[PatchOperation], session: &Session) -> bool {
        let owner = session.owner().id.as_str();
        operations.iter().any(|op| {
            if op.property != "participants" {
                return false;
            }
            match op.operation.as_str() {
                "add" => names_identity(&op.value, owner),
                "set" => op
                    .value
                    .as_array()
                    .is_some_and(|items| items.iter().any(|item| names_identity(item, owner))),
                _ => false,
            }
        })
    }
}

/// Loads a message once the server records a delivery status for the owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecipientStatusLoader;

impl ResourceLoader for RecipientStatusLoader {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Messages
    }

    fn should_load(&self, operations: &[PatchOperation], session: &Session) -> bool {
        let owner = session.owner().id.as_str();
        operations.iter().any(|op| {
            if op.operation != "set" {
                return false;
            }
            match op.property.strip_prefix("recipient_status") {
                Some("") => op.value.get(owner).is_some(),
                Some(rest) => rest.strip_prefix('.') == Some(owner),
                None => false,
            }
        })
    }
}

/// The loaders enabled by `config`.
pub fn default_loaders(config: &LazyLoadConfig) -> Vec<Box<dyn ResourceLoader>> {
    let mut loaders: Vec<Box<dyn ResourceLoader>> = Vec::new();
    if config.conversations {
        loaders.push(Box::new(MembershipLoader::new(ResourceKind::Conversations)));
    }
    if config.channels {
        loaders.push(Box::new(MembershipLoader::new(ResourceKind::Channels)));
    }
    if config.messages {
        loaders.push(Box::new(RecipientStatusLoader));
    }
    loaders
}

fn names_identity(value: &Value, identity_id: &str) -> bool {
    match value {
        Value::String(id) => id == identity_id,
        other => other.get("id").and_then(Value::as_str) == Some(identity_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::SyncConfig;
    use arbor_core::message::IdentityRef;
    use serde_json::json;

    const OWNER: &str = "arbor:///identities/owner";

    fn session() -> Session {
        Session::new(
            IdentityRef {
                id: OWNER.to_string(),
                display_name: None,
            },
            SyncConfig::default(),
        )
    }

    #[test]
    fn test_membership_loader() {
        let session = session();
        let loader = MembershipLoader::new(ResourceKind::Conversations);
        assert!(loader.should_load(
            &[PatchOperation::add("participants", json!({"id": OWNER}))],
            &session
        ));
        assert!(loader.should_load(
            &[PatchOperation::set("participants", json!([{"id": "x"}, OWNER]))],
            &session
        ));
        assert!(!loader.should_load(
            &[PatchOperation::add("participants", json!({"id": "arbor:///identities/other"}))],
            &session
        ));
        assert!(!loader.should_load(
            &[PatchOperation::set("metadata.topic", json!("lunch"))],
            &session
        ));
    }

    #[test]
    fn test_recipient_status_loader() {
        let session = session();
        let loader = RecipientStatusLoader;
        assert!(loader.should_load(
            &[PatchOperation::set(format!("recipient_status.{}", OWNER), json!("sent"))],
            &session
        ));
        let mut status = serde_json::Map::new();
        status.insert(OWNER.to_string(), json!("read"));
        assert!(loader.should_load(
            &[PatchOperation::set("recipient_status", Value::Object(status))],
            &session
        ));
        assert!(!loader.should_load(
            &[PatchOperation::set("recipient_status.arbor:///identities/other", json!("sent"))],
            &session
        ));
    }

    #[test]
    fn test_default_loaders_follow_config() {
        let mut config = LazyLoadConfig::default();
        assert_eq!(default_loaders(&config).len(), 3);
        config.messages = false;
        let kinds: Vec<_> = default_loaders(&config).iter().map(|l| l.kind()).collect();
        assert_eq!(kinds, vec![ResourceKind::Conversations, ResourceKind::Channels]);
    }
}
