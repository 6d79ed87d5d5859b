//! Typed models over message parts.
//!
//! A [`Model`] pairs a [`ModelType`] (per-type behavior and field table) with
//! a [`ModelState`]. Models live in the session registry and refer to their
//! message and parts by id.

mod action;
pub mod descriptor;
mod entity;
mod factory;
mod generate;
mod kind;
mod state;
pub mod types;

pub use action::Action;
pub use descriptor::{BASE_FIELDS, FieldDescriptor};
pub use entity::Model;
pub use factory::{ModelConstructor, ModelFactory};
pub use generate::GenerateContext;
pub use kind::{ContentUploader, ModelType, PartChange, PartChangeKind, PartsFuture};
pub use state::{ModelState, PartRef, TrackedPart};
