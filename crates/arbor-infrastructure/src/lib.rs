//! Infrastructure for the Arbor sync engine: configuration files and
//! logging setup.

pub mod config_service;
pub mod logging;

pub use config_service::ConfigService;
pub use logging::init_tracing;
