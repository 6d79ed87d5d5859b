use serde::{Deserialize, Serialize};

/// Default notification title template for sent messages.
pub const DEFAULT_NOTIFICATION_TITLE: &str = "New Message from ${messageSender}";

/// Runtime configuration for a sync session.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Generated part bodies larger than this (in bytes) are uploaded
    /// instead of being sent inline.
    pub max_inline_body_size: usize,
    /// Template for push notification titles; `${field}` placeholders are
    /// resolved against the model.
    pub notification_title: String,
    pub lazy_load: LazyLoadConfig,
    pub logging: LoggingConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_inline_body_size: 2048,
            notification_title: DEFAULT_NOTIFICATION_TITLE.to_string(),
            lazy_load: LazyLoadConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Which resource kinds may be fetched when a patch arrives for an entity
/// that is not cached locally.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LazyLoadConfig {
    pub conversations: bool,
    pub channels: bool,
    pub messages: bool,
}

impl Default for LazyLoadConfig {
    fn default() -> Self {
        Self {
            conversations: true,
            channels: true,
            messages: true,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}
