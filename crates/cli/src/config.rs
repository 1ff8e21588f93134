//! Configuration loading and management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use skybridge_domain::MonitoredAccount;
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub x: XConfig,

    #[serde(default)]
    pub bluesky: BlueskyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Minutes between poll cycles in continuous mode
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Maximum posts fetched per account per cycle
    #[serde(default = "default_max_posts_per_check")]
    pub max_posts_per_check: usize,

    /// Accounts to forward, processed in this order
    #[serde(default)]
    pub accounts: Vec<MonitoredAccount>,

    /// Extra regex patterns for posts to skip
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XConfig {
    #[serde(default = "default_x_bearer_token_env")]
    pub bearer_token_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    /// Handle or DID used to log in
    #[serde(default)]
    pub identifier: String,

    #[serde(default = "default_bluesky_app_password_env")]
    pub app_password_env: String,

    #[serde(default = "default_bluesky_service_url")]
    pub service_url: String,

    #[serde(default = "default_bluesky_max_chars")]
    pub max_chars: usize,
}

// Default value functions
fn default_state_path() -> PathBuf {
    PathBuf::from("./bookmarks.json")
}

fn default_interval_minutes() -> u64 {
    5
}

fn default_max_posts_per_check() -> usize {
    10
}

fn default_x_bearer_token_env() -> String {
    "X_BEARER_TOKEN".to_string()
}

fn default_bluesky_app_password_env() -> String {
    "BLUESKY_APP_PASSWORD".to_string()
}

fn default_bluesky_service_url() -> String {
    "https://bsky.social".to_string()
}

fn default_bluesky_max_chars() -> usize {
    300
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            max_posts_per_check: default_max_posts_per_check(),
            accounts: vec![],
            ignore_patterns: vec![],
        }
    }
}

impl Default for XConfig {
    fn default() -> Self {
        Self {
            bearer_token_env: default_x_bearer_token_env(),
        }
    }
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            identifier: String::new(),
            app_password_env: default_bluesky_app_password_env(),
            service_url: default_bluesky_service_url(),
            max_chars: default_bluesky_max_chars(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment.
    ///
    /// A missing file is written out as the default template (empty account
    /// list) and the run continues with defaults, so a first launch leaves a
    /// config skeleton behind to fill in.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let default_path = PathBuf::from("./config.toml");
        let path = config_path.unwrap_or(&default_path);

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, writing default template"
            );
            if let Err(e) = write_template(path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write template");
            }
        }

        let mut builder = config::Config::builder();

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        }

        // Add environment variable overrides
        builder = builder.add_source(
            config::Environment::with_prefix("SKYBRIDGE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# skybridge configuration

[general]
state_path = "./bookmarks.json"

[watch]
interval_minutes = 5
max_posts_per_check = 10
# accounts = [{ username = "example_account" }]
accounts = []
# ignore_patterns = ["^AD:"]
ignore_patterns = []

[x]
bearer_token_env = "X_BEARER_TOKEN"

[bluesky]
# Handle or DID of the account that receives the forwarded posts
identifier = ""
app_password_env = "BLUESKY_APP_PASSWORD"
service_url = "https://bsky.social"
max_chars = 300
"#
        .to_string()
    }
}

fn write_template(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, AppConfig::example_toml())
}
