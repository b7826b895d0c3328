//! Configuration loading and types for StreamRaft.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct, then environment overrides are applied on top.
//! The same file format serves both the replica node and the gateway;
//! each process reads the sections it needs.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Replica identity and election timing.
    #[serde(default)]
    pub node: NodeConfig,

    /// Front-door settings (replica list, timeouts, CORS).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Object store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Thumbnail worker settings.
    #[serde(default)]
    pub thumbnail: ThumbnailConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port. When absent, each binary picks its own default.
    #[serde(default)]
    pub port: Option<u16>,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl ServerConfig {
    /// `host:port`, falling back to `default_port` when none is configured.
    pub fn bind_addr(&self, default_port: u16) -> String {
        format!("{}:{}", self.host, self.port.unwrap_or(default_port))
    }
}

/// Replica identity and election timing.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// This replica's identity.
    #[serde(default = "default_node_id")]
    pub id: String,

    /// Raw comma-separated peer list.
    #[serde(default)]
    pub peers: String,

    /// Whether `peers` is parsed into the replica's peer list. Off by
    /// default: the replica behaves as if it had no peers.
    #[serde(default)]
    pub parse_peers: bool,

    /// Identity that wins the election even when peers are present.
    #[serde(default = "default_node_id")]
    pub bootstrap_id: String,

    /// Election tick period in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Follower heartbeat timeout in milliseconds.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            peers: String::new(),
            parse_peers: false,
            bootstrap_id: default_node_id(),
            tick_interval_ms: default_tick_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
        }
    }
}

impl NodeConfig {
    /// The in-memory peer list this replica starts with.
    pub fn peer_list(&self) -> Vec<String> {
        if self.parse_peers {
            split_list(&self.peers)
        } else {
            Vec::new()
        }
    }

    /// Reject timings the election loop cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_ms == 0 {
            anyhow::bail!("node.tick_interval_ms must be greater than zero");
        }
        Ok(())
    }
}

/// Front-door configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Replica base URLs, in polling order.
    #[serde(default = "default_node_urls")]
    pub node_urls: Vec<String>,

    /// Per-replica timeout for leader discovery, in milliseconds.
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,

    /// Per-replica timeout for cluster status polling, in milliseconds.
    #[serde(default = "default_status_timeout_ms")]
    pub status_timeout_ms: u64,

    /// Timeout for a proxied request to the leader, in milliseconds.
    #[serde(default = "default_proxy_timeout_ms")]
    pub proxy_timeout_ms: u64,

    /// Origins allowed by the CORS layer.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            node_urls: default_node_urls(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            status_timeout_ms: default_status_timeout_ms(),
            proxy_timeout_ms: default_proxy_timeout_ms(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl GatewayConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_millis(self.proxy_timeout_ms)
    }

    /// Node URLs with trailing slashes stripped and blanks dropped.
    pub fn normalized_node_urls(&self) -> Vec<String> {
        self.node_urls
            .iter()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .collect()
    }
}

/// Object store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `memory`, `local`, `s3`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Bucket that holds uploaded videos and thumbnails.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Local filesystem store configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,

    /// S3-compatible (MinIO) store configuration.
    #[serde(default)]
    pub s3: S3StorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            bucket: default_bucket(),
            local: LocalStorageConfig::default(),
            s3: S3StorageConfig::default(),
        }
    }
}

/// Local filesystem store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Root directory for stored objects.
    #[serde(default = "default_storage_root")]
    pub root_dir: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

/// S3-compatible store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct S3StorageConfig {
    /// Endpoint, e.g. `http://minio:9000`.
    #[serde(default = "default_s3_endpoint")]
    pub endpoint_url: String,
    /// Region to sign requests for.
    #[serde(default = "default_region")]
    pub region: String,
    /// Access key.
    #[serde(default = "default_minio_key")]
    pub access_key_id: String,
    /// Secret key.
    #[serde(default = "default_minio_key")]
    pub secret_access_key: String,
    /// Force path-style URL addressing (required by MinIO).
    #[serde(default = "default_true")]
    pub use_path_style: bool,
}

impl Default for S3StorageConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_s3_endpoint(),
            region: default_region(),
            access_key_id: default_minio_key(),
            secret_access_key: default_minio_key(),
            use_path_style: true,
        }
    }
}

/// Thumbnail worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ThumbnailConfig {
    /// Run the thumbnail worker inside the node process.
    #[serde(default)]
    pub enabled: bool,

    /// Path to the ffmpeg executable.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Offset into the video, in seconds, of the extracted frame.
    #[serde(default = "default_at_second")]
    pub at_second: u32,

    /// Time budget per message, in seconds.
    #[serde(default = "default_thumbnail_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ffmpeg_path: default_ffmpeg_path(),
            at_second: default_at_second(),
            timeout_seconds: default_thumbnail_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_node_id() -> String {
    "node-1".to_string()
}

fn default_tick_interval_ms() -> u64 {
    150
}

fn default_heartbeat_timeout_ms() -> u64 {
    500
}

fn default_node_urls() -> Vec<String> {
    vec![
        "http://node-1:9000".to_string(),
        "http://node-2:9000".to_string(),
        "http://node-3:9000".to_string(),
    ]
}

fn default_discovery_timeout_ms() -> u64 {
    5_000
}

fn default_status_timeout_ms() -> u64 {
    3_000
}

fn default_proxy_timeout_ms() -> u64 {
    30_000
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_bucket() -> String {
    "videos".to_string()
}

fn default_storage_root() -> String {
    "./data/objects".to_string()
}

fn default_s3_endpoint() -> String {
    "http://minio:9000".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_minio_key() -> String {
    "minioadmin".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_at_second() -> u32 {
    1
}

fn default_thumbnail_timeout() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Split a comma-separated list, trimming entries and dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load configuration from a YAML file at `path` and apply environment
/// overrides. A missing file yields the defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        parse_config(&contents)?
    } else {
        tracing::info!("No config file at {}, using defaults", path.display());
        Config::default()
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.node.validate()?;
    Ok(config)
}

/// Parse configuration from YAML text.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(contents)?;
    config.node.validate()?;
    Ok(config)
}

/// Apply the deployment environment variables on top of `config`.
///
/// `lookup` abstracts `std::env::var` so tests can supply their own map.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(port) = get("PORT").and_then(|p| p.parse().ok()) {
        config.server.port = Some(port);
    }
    if let Some(id) = get("NODE_ID") {
        config.node.id = id;
    }
    if let Some(peers) = get("RAFT_PEERS") {
        config.node.peers = peers;
    }
    if let Some(urls) = get("NODE_URLS") {
        config.gateway.node_urls = split_list(&urls);
    }
    if let Some(endpoint) = get("MINIO_ENDPOINT") {
        config.storage.s3.endpoint_url = if endpoint.contains("://") {
            endpoint
        } else {
            format!("http://{endpoint}")
        };
    }
    if let Some(key) = get("MINIO_ACCESS_KEY") {
        config.storage.s3.access_key_id = key;
    }
    if let Some(secret) = get("MINIO_SECRET_KEY") {
        config.storage.s3.secret_access_key = secret;
    }
    if let Some(bucket) = get("MINIO_BUCKET") {
        config.storage.bucket = bucket;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.node.id, "node-1");
        assert_eq!(config.node.tick_interval_ms, 150);
        assert_eq!(config.node.heartbeat_timeout_ms, 500);
        assert_eq!(config.gateway.discovery_timeout(), Duration::from_secs(5));
        assert_eq!(config.gateway.status_timeout(), Duration::from_secs(3));
        assert_eq!(config.gateway.proxy_timeout(), Duration::from_secs(30));
        assert_eq!(config.gateway.node_urls.len(), 3);
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.server.bind_addr(9000), "0.0.0.0:9000");
    }

    #[test]
    fn test_peers_not_parsed_by_default() {
        let yaml = "node:\n  id: node-2\n  peers: \"node-1:9000,node-3:9000\"\n";
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.node.id, "node-2");
        assert!(config.node.peer_list().is_empty());
    }

    #[test]
    fn test_peers_parsed_when_enabled() {
        let yaml = "node:\n  peers: \" a , b,,c \"\n  parse_peers: true\n";
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.node.peer_list(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8081"),
            ("NODE_ID", "node-3"),
            ("NODE_URLS", "http://a:1, http://b:2/ ,"),
            ("MINIO_ENDPOINT", "minio:9000"),
            ("MINIO_BUCKET", "clips"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, Some(8081));
        assert_eq!(config.node.id, "node-3");
        assert_eq!(
            config.gateway.normalized_node_urls(),
            vec!["http://a:1", "http://b:2"]
        );
        assert_eq!(config.storage.s3.endpoint_url, "http://minio:9000");
        assert_eq!(config.storage.bucket, "clips");
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| {
            (k == "NODE_ID").then(|| String::new())
        });
        assert_eq!(config.node.id, "node-1");
    }

    #[test]
    fn test_zero_tick_interval_rejected() {
        let err = parse_config("node:\n  tick_interval_ms: 0\n").unwrap_err();
        assert!(err.to_string().contains("tick_interval_ms"));

        let config = parse_config("node:\n  tick_interval_ms: 20\n").unwrap();
        assert_eq!(config.node.tick_interval_ms, 20);
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let config = parse_config(include_str!("../streamraft.example.yaml")).unwrap();
        assert_eq!(config.server.port, None);
        assert_eq!(config.node.bootstrap_id, "node-1");
        assert!(!config.node.parse_peers);
        assert_eq!(
            config.gateway.normalized_node_urls(),
            GatewayConfig::default().normalized_node_urls()
        );
        assert_eq!(config.storage.s3.endpoint_url, "http://minio:9000");
        assert_eq!(config.thumbnail.timeout_seconds, 120);
        assert_eq!(config.logging.format, "text");
    }
}
