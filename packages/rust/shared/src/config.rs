//! Application configuration for Backlinkoo.
//!
//! User config lives at `~/.backlinkoo/backlinkoo.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BacklinkooError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "backlinkoo.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".backlinkoo";

// ---------------------------------------------------------------------------
// Config structs (matching backlinkoo.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    /// Text-generation API settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Platform rotation and verification.
    #[serde(default)]
    pub publishing: PublishingConfig,

    #[serde(default)]
    pub telegraph: TelegraphConfig,

    #[serde(default)]
    pub writeas: WriteAsConfig,

    #[serde(default)]
    pub blog: BlogConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the libSQL database file. `~` is expanded.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Database path with `~` expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }
}

fn default_db_path() -> String {
    "~/.backlinkoo/backlinkoo.db".into()
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the chat completions API.
    #[serde(default = "default_openai_base")]
    pub base_url: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_openai_timeout")]
    pub timeout_secs: u64,

    /// Fall back to built-in article templates when the API is unavailable.
    #[serde(default = "default_true")]
    pub template_fallback: bool,

    /// Requested article length.
    #[serde(default = "default_word_count")]
    pub word_count: u32,

    /// Custom prompt phrasings with `{keyword}`, `{anchor}` and `{url}`
    /// placeholders. Empty means the built-in set.
    #[serde(default)]
    pub prompts: Vec<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_openai_base(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_openai_timeout(),
            template_fallback: true,
            word_count: default_word_count(),
            prompts: Vec::new(),
        }
    }
}

impl OpenAiConfig {
    /// Read the API key from the configured env var, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_openai_base() -> String {
    "https://api.openai.com/v1".into()
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_openai_timeout() -> u64 {
    60
}
fn default_word_count() -> u32 {
    500
}

/// `[publishing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingConfig {
    /// Platform ids in rotation order.
    #[serde(default = "default_platforms")]
    pub platforms: Vec<String>,

    /// Issue a HEAD request against each published URL (warn-only).
    #[serde(default = "default_true")]
    pub verify_urls: bool,

    #[serde(default = "default_publish_timeout")]
    pub timeout_secs: u64,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            platforms: default_platforms(),
            verify_urls: true,
            timeout_secs: default_publish_timeout(),
        }
    }
}

fn default_platforms() -> Vec<String> {
    vec!["telegraph".into(), "writeas".into()]
}
fn default_publish_timeout() -> u64 {
    30
}

/// `[telegraph]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegraphConfig {
    #[serde(default = "default_telegraph_base")]
    pub api_base: String,

    /// Account short name used when creating a throw-away account.
    #[serde(default = "default_short_name")]
    pub short_name: String,

    #[serde(default = "default_author_name")]
    pub author_name: String,

    /// Env var holding a pre-provisioned access token. When unset, a new
    /// account is created per publish.
    #[serde(default = "default_telegraph_token_env")]
    pub access_token_env: String,
}

impl Default for TelegraphConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegraph_base(),
            short_name: default_short_name(),
            author_name: default_author_name(),
            access_token_env: default_telegraph_token_env(),
        }
    }
}

impl TelegraphConfig {
    pub fn access_token(&self) -> Option<String> {
        std::env::var(&self.access_token_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

fn default_telegraph_base() -> String {
    "https://api.telegra.ph".into()
}
fn default_short_name() -> String {
    "LinkBuilder".into()
}
fn default_author_name() -> String {
    "Professional Content".into()
}
fn default_telegraph_token_env() -> String {
    "TELEGRAPH_ACCESS_TOKEN".into()
}

/// `[writeas]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteAsConfig {
    #[serde(default = "default_writeas_base")]
    pub api_base: String,

    /// Base for public post URLs (`{public_base}/{id}`).
    #[serde(default = "default_writeas_base")]
    pub public_base: String,
}

impl Default for WriteAsConfig {
    fn default() -> Self {
        Self {
            api_base: default_writeas_base(),
            public_base: default_writeas_base(),
        }
    }
}

fn default_writeas_base() -> String {
    "https://write.as".into()
}

/// `[blog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogConfig {
    /// Public site base; posts live at `{base_url}/blog/{slug}`.
    #[serde(default = "default_blog_base")]
    pub base_url: String,

    /// Lifetime of unclaimed trial posts.
    #[serde(default = "default_trial_ttl")]
    pub trial_ttl_hours: i64,
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            base_url: default_blog_base(),
            trial_ttl_hours: default_trial_ttl(),
        }
    }
}

fn default_blog_base() -> String {
    "https://backlinkoo.com".into()
}
fn default_trial_ttl() -> i64 {
    24
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.backlinkoo/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BacklinkooError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.backlinkoo/backlinkoo.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BacklinkooError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        BacklinkooError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BacklinkooError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BacklinkooError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BacklinkooError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the OpenAI API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.openai.api_key_env;
    match config.openai.api_key() {
        Some(_) => Ok(()),
        None => Err(BacklinkooError::config(format!(
            "OpenAI API key not found. Set the {var_name} environment variable."
        ))),
    }
}
