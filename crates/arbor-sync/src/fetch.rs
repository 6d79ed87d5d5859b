//! Fetch-by-id requests raised by the change channel.

use arbor_core::ids::ResourceKind;
use tokio::sync::mpsc;

/// Asks the server for one entity.
///
/// Requests are fire and forget. The fetched payload comes back through
/// [`ChangeManager::fetched`](crate::ChangeManager::fetched), a failure
/// through [`ChangeManager::fetch_failed`](crate::ChangeManager::fetch_failed).
pub trait ResourceFetcher {
    fn fetch(&self, kind: ResourceKind, id: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub kind: ResourceKind,
    pub id: String,
}

/// Queues fetch requests for the transport task.
#[derive(Debug, Clone)]
pub struct FetchQueue {
    sender: mpsc::UnboundedSender<FetchRequest>,
}

impl FetchQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FetchRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ResourceFetcher for FetchQueue {
    fn fetch(&self, kind: ResourceKind, id: &str) {
        let request = FetchRequest {
            kind,
            id: id.to_string(),
        };
        if self.sender.send(request).is_err() {
            tracing::warn!(id, "Fetch queue closed; dropping request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_queue_delivers_requests() {
        let (queue, mut receiver) = FetchQueue::channel();
        queue.fetch(ResourceKind::Messages, "arbor:///messages/m1");
        assert_eq!(
            receiver.try_recv().unwrap(),
            FetchRequest {
                kind: ResourceKind::Messages,
                id: "arbor:///messages/m1".to_string(),
            }
        );

        drop(receiver);
        queue.fetch(ResourceKind::Messages, "arbor:///messages/m2");
    }
}
