use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "parley.toml",
    "config/parley.toml",
    "crates/config/parley.toml",
    "../parley.toml",
    "../config/parley.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub push: PushConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://parley.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Settings for the per-connection ingress sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Require a verified credential (upgrade token or first-frame handshake)
    /// before a connection is registered.
    #[serde(default = "RealtimeConfig::default_require_authentication")]
    pub require_authentication: bool,
    #[serde(default = "RealtimeConfig::default_handshake_timeout")]
    pub handshake_timeout_seconds: u64,
    /// Events buffered per connection before a write counts as failed.
    ///
    /// A client that falls this far behind, even a healthy one reading slowly
    /// through a burst, is evicted from the registry and disconnected. Size it
    /// for the largest burst a chat is expected to produce.
    #[serde(default = "RealtimeConfig::default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl RealtimeConfig {
    const fn default_require_authentication() -> bool {
        true
    }

    const fn default_handshake_timeout() -> u64 {
        10
    }

    const fn default_outbound_buffer() -> usize {
        256
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            require_authentication: Self::default_require_authentication(),
            handshake_timeout_seconds: Self::default_handshake_timeout(),
            outbound_buffer: Self::default_outbound_buffer(),
        }
    }
}

/// What a producer experiences when a stage queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// The producer waits until the consumer drains an item.
    Block,
    /// The producer never waits; the oldest queued item is discarded.
    DropOldest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "QueueConfig::default_capacity")]
    pub capacity: usize,
    #[serde(default = "QueueConfig::default_overflow")]
    pub overflow: OverflowPolicy,
}

impl QueueConfig {
    const fn default_capacity() -> usize {
        256
    }

    const fn default_overflow() -> OverflowPolicy {
        OverflowPolicy::Block
    }

    pub const fn blocking(capacity: usize) -> Self {
        Self {
            capacity,
            overflow: OverflowPolicy::Block,
        }
    }

    pub const fn drop_oldest(capacity: usize) -> Self {
        Self {
            capacity,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

/// One queue per pipeline stage.
///
/// ```
/// use parley_config::{OverflowPolicy, PipelineConfig};
///
/// let pipeline = PipelineConfig::default();
/// assert_eq!(pipeline.message.overflow, OverflowPolicy::Block);
/// assert_eq!(pipeline.action.overflow, OverflowPolicy::DropOldest);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "PipelineConfig::default_message")]
    pub message: QueueConfig,
    #[serde(default = "PipelineConfig::default_action")]
    pub action: QueueConfig,
    #[serde(default = "PipelineConfig::default_persistence")]
    pub persistence: QueueConfig,
    #[serde(default = "PipelineConfig::default_notification")]
    pub notification: QueueConfig,
}

impl PipelineConfig {
    const fn default_message() -> QueueConfig {
        QueueConfig::blocking(256)
    }

    const fn default_action() -> QueueConfig {
        QueueConfig::drop_oldest(64)
    }

    const fn default_persistence() -> QueueConfig {
        QueueConfig::blocking(256)
    }

    const fn default_notification() -> QueueConfig {
        QueueConfig::blocking(256)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            message: Self::default_message(),
            action: Self::default_action(),
            persistence: Self::default_persistence(),
            notification: Self::default_notification(),
        }
    }
}

/// What happens to a message whose rewrite failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentFailurePolicy {
    #[default]
    Drop,
    DeliverOriginal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "EnrichmentConfig::default_model")]
    pub model: String,
    /// Cumulative generation tokens a user may spend before rewrites are refused.
    #[serde(default = "EnrichmentConfig::default_token_ceiling")]
    pub token_ceiling: u32,
    #[serde(default)]
    pub failure_policy: EnrichmentFailurePolicy,
    #[serde(default)]
    pub openrouter: OpenRouterProviderConfig,
}

impl EnrichmentConfig {
    fn default_model() -> String {
        "openai/gpt-4o-mini".to_string()
    }

    const fn default_token_ceiling() -> u32 {
        20_000
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            model: Self::default_model(),
            token_ceiling: Self::default_token_ceiling(),
            failure_policy: EnrichmentFailurePolicy::default(),
            openrouter: OpenRouterProviderConfig::default(),
        }
    }
}

/// Configuration options for the OpenRouter text-generation provider.
///
/// ```
/// use parley_config::OpenRouterProviderConfig;
///
/// let provider = OpenRouterProviderConfig::default();
/// assert_eq!(provider.base_url, "https://openrouter.ai/api/v1");
/// assert_eq!(provider.request_timeout_seconds, 30);
/// assert!(provider.api_key.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "OpenRouterProviderConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "OpenRouterProviderConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default = "OpenRouterProviderConfig::default_title")]
    pub title: Option<String>,
}

impl OpenRouterProviderConfig {
    fn default_base_url() -> String {
        "https://openrouter.ai/api/v1".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    fn default_title() -> Option<String> {
        Some("Parley".to_string())
    }
}

impl Default for OpenRouterProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Self::default_base_url(),
            request_timeout_seconds: Self::default_request_timeout(),
            referer: None,
            title: Self::default_title(),
        }
    }
}

/// Firebase Cloud Messaging settings. Push is disabled unless both
/// `project_id` and `access_token` are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default = "PushConfig::default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "PushConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl PushConfig {
    fn default_endpoint() -> String {
        "https://fcm.googleapis.com".to_string()
    }

    const fn default_request_timeout() -> u64 {
        10
    }

    pub fn is_enabled(&self) -> bool {
        self.project_id.is_some() && self.access_token.is_some()
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            project_id: None,
            access_token: None,
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use parley_config::load;
///
/// std::env::remove_var("PARLEY_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())
        .context("invalid default for http.address")?
        .set_default("http.port", i64::from(defaults.http.port))
        .context("invalid default for http.port")?
        .set_default("database.url", defaults.database.url.clone())
        .context("invalid default for database.url")?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )
        .context("invalid default for database.max_connections")?;

    let mut builder = builder;
    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("PARLEY_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via PARLEY_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(config::Environment::with_prefix("PARLEY").separator("__"));

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.enrichment.openrouter.api_key.is_none() {
        config.enrichment.openrouter.api_key = std::env::var("OPENROUTER_API_KEY").ok();
    }

    debug!(
        http = ?config.http,
        database = ?config.database,
        realtime = ?config.realtime,
        pipeline = ?config.pipeline,
        push_enabled = config.push.is_enabled(),
        "loaded backend configuration"
    );
    Ok(config)
}
