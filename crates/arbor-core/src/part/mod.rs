//! Message parts.
//!
//! A part is one node of a message's content tree. Its structural identity
//! lives in MIME attributes: `node-id`, `parent-node-id` and `role`.

mod mime;
mod model;

pub use mime::{MimeAttributes, MimeType, NODE_ID, PARENT_NODE_ID, ROLE};
pub use model::{ExternalContent, Part, PartPayload, ROLE_RESPONSE_SUMMARY, ROLE_ROOT};
