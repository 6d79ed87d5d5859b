use super::event::{EntityEvent, EntityNotification};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

pub type NotificationSender = mpsc::UnboundedSender<EntityNotification>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<EntityNotification>;

/// Creates an observer channel.
pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    mpsc::unbounded_channel()
}

/// Handle returned by [`Notifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Per-entity notification queue with an explicit dirty state.
///
/// Events are queued during a turn and only delivered by [`Notifier::flush`].
/// All `Changed` events of one turn collapse to the first one queued; other
/// event kinds are delivered in order.
#[derive(Debug, Default)]
pub struct Notifier {
    pending: Vec<EntityEvent>,
    subscribers: BTreeMap<SubscriptionId, NotificationSender>,
    next_id: u64,
    destroyed: bool,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event for the next flush. Ignored once destroyed.
    pub fn queue(&mut self, event: EntityEvent) {
        if self.destroyed {
            return;
        }
        self.pending.push(event);
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn pending(&self) -> &[EntityEvent] {
        &self.pending
    }

    /// Drops queued events without delivering them.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    pub fn subscribe(&mut self, sender: NotificationSender) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.insert(id, sender);
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Coalesces and delivers the queued events.
    ///
    /// Returns the number of events delivered (before fan-out). Observers
    /// whose receiving end was dropped are pruned.
    pub fn flush(&mut self, entity_id: &str) -> usize {
        if self.destroyed {
            self.pending.clear();
            return 0;
        }
        if self.pending.is_empty() {
            return 0;
        }

        let mut has_change = false;
        let events: Vec<EntityEvent> = self
            .pending
            .drain(..)
            .filter(|event| {
                if !event.is_change() {
                    return true;
                }
                if has_change {
                    return false;
                }
                has_change = true;
                true
            })
            .collect();

        for event in &events {
            self.deliver(entity_id, event.clone());
        }
        events.len()
    }

    /// Marks the notifier destroyed and delivers `Destroyed` immediately.
    ///
    /// Pending events are discarded and later queues are ignored.
    pub fn destroy(&mut self, entity_id: &str) {
        if self.destroyed {
            return;
        }
        self.pending.clear();
        self.deliver(entity_id, EntityEvent::Destroyed);
        self.destroyed = true;
        self.subscribers.clear();
    }

    fn deliver(&mut self, entity_id: &str, event: EntityEvent) {
        self.subscribers.retain(|_, sender| {
            sender
                .send(EntityNotification {
                    entity_id: entity_id.to_string(),
                    event: event.clone(),
                })
                .is_ok()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain(receiver: &mut NotificationReceiver) -> Vec<EntityNotification> {
        let mut out = Vec::new();
        while let Ok(notification) = receiver.try_recv() {
            out.push(notification);
        }
        out
    }

    #[test]
    fn test_changes_coalesce_to_first() {
        let (sender, mut receiver) = notification_channel();
        let mut notifier = Notifier::new();
        notifier.subscribe(sender);

        notifier.queue(EntityEvent::changed("title", json!(null), json!("a")));
        notifier.queue(EntityEvent::changed("text", json!(null), json!("b")));
        notifier.queue(EntityEvent::Notification {
            title: "t".to_string(),
            text: "x".to_string(),
        });
        notifier.queue(EntityEvent::changed("title", json!("a"), json!("c")));

        assert!(notifier.is_dirty());
        assert_eq!(notifier.flush("m1"), 2);
        assert!(!notifier.is_dirty());

        let delivered = drain(&mut receiver);
        assert_eq!(delivered.len(), 2);
        assert_eq!(
            delivered[0].event,
            EntityEvent::changed("title", json!(null), json!("a"))
        );
        assert!(matches!(
            delivered[1].event,
            EntityEvent::Notification { .. }
        ));
        assert_eq!(delivered[0].entity_id, "m1");
    }

    #[test]
    fn test_flush_without_pending_is_noop() {
        let (sender, mut receiver) = notification_channel();
        let mut notifier = Notifier::new();
        notifier.subscribe(sender);
        assert_eq!(notifier.flush("m1"), 0);
        assert!(drain(&mut receiver).is_empty());
    }

    #[test]
    fn test_destroyed_notifier_drops_work() {
        let (sender, mut receiver) = notification_channel();
        let mut notifier = Notifier::new();
        notifier.subscribe(sender);
        notifier.queue(EntityEvent::changed("title", json!(null), json!("a")));

        notifier.destroy("m1");
        notifier.queue(EntityEvent::changed("title", json!("a"), json!("b")));
        assert_eq!(notifier.flush("m1"), 0);

        let delivered = drain(&mut receiver);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].event, EntityEvent::Destroyed);
    }

    #[test]
    fn test_unsubscribe_and_closed_receivers() {
        let (first, mut first_rx) = notification_channel();
        let (second, second_rx) = notification_channel();
        let mut notifier = Notifier::new();
        let first_id = notifier.subscribe(first);
        notifier.subscribe(second);
        drop(second_rx);

        notifier.queue(EntityEvent::changed("a", json!(1), json!(2)));
        notifier.flush("e");
        assert_eq!(notifier.subscriber_count(), 1);
        assert_eq!(drain(&mut first_rx).len(), 1);

        assert!(notifier.unsubscribe(first_id));
        assert!(!notifier.unsubscribe(first_id));
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
