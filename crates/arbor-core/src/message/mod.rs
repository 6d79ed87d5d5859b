//! Messages: the owners of part trees.

mod model;

pub use model::{
    ContainerRef, IdentityRef, LoadType, Message, MessageEvent, MessagePayload, PushNotification,
    SyncState,
};
