//! Shared types, error model, and configuration for Backlinkoo.
//!
//! This crate is the foundation depended on by all other Backlinkoo crates.
//! It provides:
//! - [`BacklinkooError`] — the unified error type
//! - Domain types ([`Campaign`], [`CampaignStatus`], [`Platform`], [`PublishedPost`], [`BlogPost`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BlogConfig, OpenAiConfig, PublishingConfig, ServerConfig, StorageConfig,
    TelegraphConfig, WriteAsConfig, config_dir, config_file_path, expand_home, init_config,
    load_config, load_config_from, validate_api_key,
};
pub use error::{BacklinkooError, Result};
pub use types::{
    ActivityLog, BlogPost, Campaign, CampaignId, CampaignStatus, NewCampaign, Platform,
    PublishedPost, content_hash,
};
