//! The session context: entity registry plus everything that mutates it.

mod context;
mod generate;
mod registry;
mod routing;

pub use context::Session;
pub use registry::{Entity, EntityRef, EntityRegistry};
