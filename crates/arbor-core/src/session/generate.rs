use super::context::Session;
use crate::error::{ArborError, Result};
use crate::ids;
use crate::model::GenerateContext;
use crate::notify::EntityEvent;
use crate::part::ROLE_ROOT;
use std::rc::Rc;

impl Session {
    /// Builds the message for a locally created model.
    ///
    /// Returns the existing message when the model already has one. On
    /// first generation every model of the tree moves from the unsent id
    /// space to the id derived from its generated part; the old id keeps
    /// resolving.
    pub async fn generate_message(
        &mut self,
        model_id: &str,
        container_id: Option<&str>,
    ) -> Result<String> {
        let model = self
            .registry
            .model(model_id)
            .ok_or_else(|| ArborError::not_found("model", model_id))?;
        if let Some(message_id) = model.message_id() {
            return Ok(message_id.to_string());
        }
        let model_id = model.id().to_string();
        let container_id = match container_id {
            Some(id) if self.registry.container(id).is_some() => id.to_string(),
            _ => return Err(ArborError::ContainerMissing),
        };

        let (generated, bindings) = {
            let mut ctx =
                GenerateContext::new(&self.registry, Rc::clone(&self.uploader), &self.config);
            let generated = ctx.generate_model(&model_id)?;
            (generated, ctx.into_bindings())
        };
        let mut parts = generated.await?;

        let message_id = ids::message_id_for_model(&model_id);
        for part in &mut parts {
            part.id = ids::part_id(&message_id);
        }
        if let Some(root) = parts.first_mut() {
            root.set_role(ROLE_ROOT);
        }

        let container = self
            .registry
            .container(&container_id)
            .ok_or(ArborError::ContainerMissing)?;
        let message = container.create_message(
            message_id.clone(),
            parts,
            Some(self.owner.clone()),
        )?;

        let mut rebound = Vec::with_capacity(bindings.len());
        for (node_id, bound_id) in bindings {
            let Some(part) = message.part_by_node_id(&node_id) else {
                tracing::warn!(model_id = %bound_id, "Generated parts lost the model's node");
                continue;
            };
            let new_id = ids::model_id_for_part(&part.id);
            if !self.registry.rename_model(&bound_id, &new_id) {
                tracing::warn!(model_id = %bound_id, new_id = %new_id, "Could not re-key model");
                continue;
            }
            if let Some(model) = self.registry.model_mut(&new_id) {
                model.state_mut().attach(&message_id, part);
            }
            rebound.push(new_id);
        }

        tracing::info!(
            message_id = %message_id,
            container_id = %container_id,
            parts = message.parts().len(),
            "Generated message"
        );
        self.registry.register_message(message);
        for id in &rebound {
            self.setup_model(id);
        }
        Ok(message_id)
    }

    /// Generates the model's message and hands it to the transport.
    ///
    /// The message is marked `Sending`, queued in the outbox and raises a
    /// push notification built from the model. Sending an already sent
    /// model returns its message unchanged.
    pub async fn send(&mut self, model_id: &str, container_id: Option<&str>) -> Result<String> {
        let message_id = self.generate_message(model_id, container_id).await?;
        let sender_name = self
            .owner
            .display_name
            .clone()
            .unwrap_or_else(|| self.owner.id.clone());
        let notification = self
            .registry
            .model(model_id)
            .map(|model| model.notification(&self.config, &sender_name));

        let message = self
            .registry
            .message_mut(&message_id)
            .ok_or_else(|| ArborError::not_found("message", message_id.clone()))?;
        if !message.is_new() {
            return Ok(message_id);
        }
        message.mark_sending(notification.clone());
        if let Some(notification) = notification {
            message.notifier_mut().queue(EntityEvent::Notification {
                title: notification.title,
                text: notification.text,
            });
        }
        self.outbox.push(message_id.clone());
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::container::{Container, ContainerKind};
    use crate::message::{IdentityRef, SyncState};
    use crate::model::ContentUploader;
    use crate::model::types::{CAROUSEL_ITEM_ROLE, CarouselModel, FileModel, SOURCE_ROLE, TextModel};
    use crate::notify::notification_channel;
    use crate::part::ExternalContent;
    use async_trait::async_trait;
    use serde_json::{Map, Value, json};
    use std::cell::RefCell;

    const CONVERSATION: &str = "arbor:///conversations/c1";

    fn owner() -> IdentityRef {
        IdentityRef {
            id: "arbor:///identities/owner".to_string(),
            display_name: Some("Owner".to_string()),
        }
    }

    fn session_with(config: SyncConfig) -> Session {
        let mut session = Session::new(owner(), config);
        session.add_container(Container::new(CONVERSATION, ContainerKind::Conversation));
        session
    }

    fn session() -> Session {
        session_with(SyncConfig::default())
    }

    fn props(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[derive(Default)]
    struct RecordingUploader {
        uploads: RefCell<Vec<usize>>,
    }

    #[async_trait(?Send)]
    impl ContentUploader for RecordingUploader {
        async fn upload(&self, _mime_type: &str, body: Vec<u8>) -> Result<ExternalContent> {
            self.uploads.borrow_mut().push(body.len());
            Ok(ExternalContent {
                id: format!("content-{}", body.len()),
                download_url: None,
                size: body.len() as u64,
            })
        }
    }

    #[tokio::test]
    async fn test_generate_message_end_to_end() {
        let mut session = session();
        let model_id = session.create_model_with(Box::new(TextModel), props(json!({"text": "hello"})));

        let message_id = session
            .generate_message(&model_id, Some(CONVERSATION))
            .await
            .unwrap();

        let model = session.model(&model_id).unwrap();
        assert_eq!(model.message_id(), Some(message_id.as_str()));
        assert_ne!(model.id(), model_id);
        assert!(session.registry().model(model.id()).is_some());

        let message = session.message(&message_id).unwrap();
        let root = message.root_part().unwrap();
        assert_eq!(root.role(), Some(ROLE_ROOT));
        assert_eq!(model.part_id(), Some(root.id.as_str()));
        assert_eq!(model.id(), ids::model_id_for_part(&root.id));
        assert_eq!(message.container_id(), CONVERSATION);
        assert_eq!(message.sync_state(), SyncState::New);
        assert_eq!(root.json_payload().unwrap()["text"], json!("hello"));
    }

    #[tokio::test]
    async fn test_generate_twice_returns_same_message() {
        let mut session = session();
        let model_id = session.create_model_with(Box::new(TextModel), props(json!({"text": "a"})));

        let first = session
            .generate_message(&model_id, Some(CONVERSATION))
            .await
            .unwrap();
        let second = session
            .generate_message(&model_id, Some(CONVERSATION))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(session.registry().messages().count(), 1);
        assert_eq!(session.message(&first).unwrap().parts().len(), 1);
    }

    #[tokio::test]
    async fn test_generate_without_container() {
        let mut session = session();
        let model_id = session.create_model(Box::new(TextModel));

        let err = session.generate_message(&model_id, None).await.unwrap_err();
        assert!(err.is_container_missing());
        let err = session
            .generate_message(&model_id, Some("arbor:///conversations/unknown"))
            .await
            .unwrap_err();
        assert!(err.is_container_missing());

        assert!(session.model(&model_id).unwrap().message_id().is_none());
        assert_eq!(session.registry().messages().count(), 0);
    }

    #[tokio::test]
    async fn test_generate_carousel_links_children() {
        let mut session = session();
        let first = session.create_model_with(Box::new(TextModel), props(json!({"text": "one"})));
        let second = session.create_model_with(Box::new(TextModel), props(json!({"text": "two"})));
        let carousel = session.create_model(Box::new(CarouselModel));
        session
            .model_mut(&carousel)
            .unwrap()
            .state_mut()
            .set("items", json!([first, second]));

        let message_id = session
            .generate_message(&carousel, Some(CONVERSATION))
            .await
            .unwrap();

        let message = session.message(&message_id).unwrap();
        assert_eq!(message.parts().len(), 3);
        let carousel_model = session.model(&carousel).unwrap();
        let node_id = carousel_model.node_id().unwrap();
        assert_eq!(message.parts_matching("parent-node-id", node_id).len(), 2);
        assert_eq!(carousel_model.state().child_models().len(), 2);

        let item = session.model(&first).unwrap();
        assert_eq!(item.role(), Some(CAROUSEL_ITEM_ROLE));
        assert_eq!(item.parent_id(), Some(node_id));
        assert_eq!(item.message_id(), Some(message_id.as_str()));
        let items = carousel_model.property("items");
        assert_eq!(items.as_array().map(Vec::len), Some(2));
        assert!(items.as_array().unwrap().contains(&json!(item.id())));
    }

    #[tokio::test]
    async fn test_large_file_source_is_uploaded() {
        let config = SyncConfig {
            max_inline_body_size: 4,
            ..SyncConfig::default()
        };
        let uploader = Rc::new(RecordingUploader::default());
        let mut session = session_with(config).with_uploader(uploader.clone());
        let model_id = session.create_model(Box::new(FileModel::with_source("image/png", vec![7u8; 16])));

        let message_id = session
            .generate_message(&model_id, Some(CONVERSATION))
            .await
            .unwrap();

        assert_eq!(*uploader.uploads.borrow(), vec![16]);
        let message = session.message(&message_id).unwrap();
        let source = message.parts_matching("role", SOURCE_ROLE)[0];
        assert!(source.needs_content());
        assert_eq!(source.content.as_ref().map(|c| c.id.as_str()), Some("content-16"));

        let root = message.root_part().unwrap().json_payload().unwrap();
        assert_eq!(root["size"], json!(16));
        assert_eq!(root["source_mime_type"], json!("image/png"));
        let model = session.model(&model_id).unwrap();
        assert_eq!(model.property("sourcePart"), json!(source.id));
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_model_unsent() {
        let config = SyncConfig {
            max_inline_body_size: 4,
            ..SyncConfig::default()
        };
        let mut session = session_with(config);
        let model_id = session.create_model(Box::new(FileModel::with_source("image/png", vec![1u8; 8])));

        let err = session
            .generate_message(&model_id, Some(CONVERSATION))
            .await
            .unwrap_err();
        assert!(matches!(err, ArborError::Upload(_)));
        assert!(session.model(&model_id).unwrap().message_id().is_none());
    }

    #[tokio::test]
    async fn test_send_queues_message_and_notification() {
        let mut session = session();
        let model_id = session.create_model_with(Box::new(TextModel), props(json!({"text": "hello"})));

        let message_id = session.send(&model_id, Some(CONVERSATION)).await.unwrap();
        assert_eq!(session.send(&model_id, Some(CONVERSATION)).await.unwrap(), message_id);
        assert_eq!(session.outbox(), [message_id.clone()]);

        let message = session.message(&message_id).unwrap();
        assert_eq!(message.sync_state(), SyncState::Sending);
        assert!(message.sent_at().is_some());

        let (sender, mut receiver) = notification_channel();
        session.subscribe(&message_id, sender);
        session.flush();
        let delivered = receiver.try_recv().unwrap();
        assert_eq!(
            delivered.event,
            EntityEvent::Notification {
                title: "New Message from Owner".to_string(),
                text: "hello".to_string(),
            }
        );
        assert!(receiver.try_recv().is_err());
    }
}
