//! Change notifications.
//!
//! Entities queue events while a processing turn runs; the owning scheduler
//! calls `flush` once per turn, which coalesces the queue and delivers it to
//! every registered observer.

mod event;
mod notifier;

pub use event::{EntityEvent, EntityNotification, SessionEvent};
pub use notifier::{
    notification_channel, NotificationReceiver, NotificationSender, Notifier, SubscriptionId,
};
