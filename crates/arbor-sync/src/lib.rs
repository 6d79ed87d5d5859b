//! Arbor change channel.
//!
//! Decodes server-pushed envelopes and applies them to a
//! [`Session`](arbor_core::Session): creates, deletes and patches of cached
//! entities, plus lazy materialization of entities the client has not cached
//! yet.

pub mod change_manager;
pub mod envelope;
pub mod fetch;
pub mod json_patch;
pub mod resource;

pub use change_manager::ChangeManager;
pub use envelope::{ChangeEvent, Envelope, ObjectRef};
pub use fetch::{FetchQueue, FetchRequest, ResourceFetcher};
pub use json_patch::JsonPatchApplier;
pub use resource::{MembershipLoader, RecipientStatusLoader, ResourceLoader, default_loaders};
