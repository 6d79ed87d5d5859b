pub mod config;
pub mod container;
pub mod error;
pub mod ids;
pub mod message;
pub mod model;
pub mod naming;
pub mod notify;
pub mod part;
pub mod patch;
pub mod response;
pub mod session;

// Re-export common types
pub use config::SyncConfig;
pub use error::{ArborError, Result};
pub use ids::ResourceKind;
pub use session::Session;
