mod model;

pub use model::{Container, ContainerKind, ContainerPayload};
