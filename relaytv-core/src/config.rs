use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    pub playback: PlaybackConfig,
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Default browser-like user agent sent upstream. Many IPTV origins reject
/// generic HTTP clients.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Stream Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Path the gateway is mounted at; synthesized and rewritten playlists
    /// point back here.
    pub public_path: String,
    /// Maximum number of redirects followed per upstream exchange
    pub max_redirects: u32,
    /// Timeout for receiving the upstream response head
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Extra attempts on transient connection failures
    pub connect_retries: u32,
    pub user_agent: String,
    /// Reject loopback/private/link-local upstream hosts
    pub block_private_hosts: bool,
    pub pool_idle_timeout_secs: u64,
    /// Largest upstream playlist buffered for rewriting; bigger bodies are
    /// relayed unchanged
    pub max_playlist_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            public_path: "/relay".to_string(),
            max_redirects: 10,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            connect_retries: 1,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            block_private_hosts: true,
            pool_idle_timeout_secs: 90,
            max_playlist_bytes: 4 * 1024 * 1024,
        }
    }
}

impl GatewayConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// A public cross-origin relay. `template` must contain `{url}`, which is
/// replaced by the percent-encoded target URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEndpointConfig {
    pub name: String,
    pub template: String,
}

/// Source Resolution Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Budget for generic media-element errors per attempt
    pub max_media_retries: u32,
    pub retry_delay_ms: u64,
    /// Window after a source swap during which stale resume targets are ignored
    pub swap_guard_ms: u64,
    /// Playlist fetch timeout handed to the segmented engine
    pub manifest_timeout_secs: u64,
    /// Segment fetch timeout handed to the segmented engine
    pub segment_timeout_secs: u64,
    /// Historical proxy paths rewritten to the gateway path before playback
    pub legacy_proxy_paths: Vec<String>,
    /// Relays tried in order when a secure page targets an insecure stream
    pub relays: Vec<RelayEndpointConfig>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_media_retries: 5,
            retry_delay_ms: 1000,
            swap_guard_ms: 1500,
            manifest_timeout_secs: 20,
            segment_timeout_secs: 3600,
            legacy_proxy_paths: vec![
                "/proxy".to_string(),
                "/api/proxy".to_string(),
                "/stream-proxy".to_string(),
            ],
            relays: vec![
                RelayEndpointConfig {
                    name: "corsproxy".to_string(),
                    template: "https://corsproxy.io/?url={url}".to_string(),
                },
                RelayEndpointConfig {
                    name: "allorigins".to_string(),
                    template: "https://api.allorigins.win/raw?url={url}".to_string(),
                },
                RelayEndpointConfig {
                    name: "codetabs".to_string(),
                    template: "https://api.codetabs.com/v1/proxy?quest={url}".to_string(),
                },
            ],
        }
    }
}

impl PlaybackConfig {
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub const fn swap_guard(&self) -> Duration {
        Duration::from_millis(self.swap_guard_ms)
    }
}

/// Resume/Progress Coordinator thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Positions below this are never written
    pub min_position_secs: f64,
    /// Minimum spacing between unforced writes
    pub debounce_secs: u64,
    /// Watched fraction at which a record is removed instead of saved
    pub completion_ratio: f64,
    /// A previous position at or above this is protected by the regression guard
    pub regression_floor_secs: f64,
    /// Allowed backward drift before a save counts as a regression
    pub regression_tolerance_secs: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            min_position_secs: 5.0,
            debounce_secs: 5,
            completion_ratio: 0.9,
            regression_floor_secs: 45.0,
            regression_tolerance_secs: 15.0,
        }
    }
}

impl ProgressConfig {
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // RELAYTV_GATEWAY__MAX_REDIRECTS=5, RELAYTV_SERVER__HTTP_PORT=9000, ...
        builder = builder.add_source(
            Environment::with_prefix("RELAYTV")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    /// Check for misconfigurations. Returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !self.gateway.public_path.starts_with('/') {
            errors.push(format!(
                "gateway.public_path must start with '/': {}",
                self.gateway.public_path
            ));
        }
        if self.gateway.request_timeout_secs == 0 {
            errors.push("gateway.request_timeout_secs must be greater than 0".to_string());
        }
        if self.gateway.max_playlist_bytes == 0 {
            errors.push("gateway.max_playlist_bytes must be greater than 0".to_string());
        }
        if self.gateway.user_agent.trim().is_empty() {
            errors.push("gateway.user_agent must not be empty".to_string());
        }
        if self.playback.segment_timeout_secs < self.playback.manifest_timeout_secs {
            errors.push(
                "playback.segment_timeout_secs must not be shorter than playback.manifest_timeout_secs"
                    .to_string(),
            );
        }
        for relay in &self.playback.relays {
            if !relay.template.contains("{url}") {
                errors.push(format!(
                    "relay '{}' template is missing the {{url}} placeholder",
                    relay.name
                ));
            }
            if !relay.template.starts_with("https://") {
                errors.push(format!("relay '{}' must use https", relay.name));
            }
        }
        if !(0.0..=1.0).contains(&self.progress.completion_ratio) {
            errors.push("progress.completion_ratio must be within 0.0..=1.0".to_string());
        }
        if self.progress.min_position_secs < 0.0 || self.progress.regression_tolerance_secs < 0.0
        {
            errors.push("progress thresholds must not be negative".to_string());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be 'json' or 'pretty': {}",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
