//! Server configuration.
//!
//! Loads from a YAML file or from `KOMBU_*` environment variables.
//!
//! Example YAML:
//! ```yaml
//! listen_addr: "0.0.0.0:7871"
//! data_dir: "/var/lib/kombu"
//! snapshot:
//!   format: binary
//!   load_on_start: true
//!   save_on_shutdown: true
//! embedding:
//!   dimension: 384
//! index:
//!   hnsw:
//!     m: 16
//!     ef_search: 100
//!   lsh:
//!     tables: 10
//!     hash_bits: 16
//! ```

use kombu_store::{SnapshotFormat, StoreConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Directory for snapshots.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Snapshot behavior.
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Default index parameters for new libraries.
    #[serde(default)]
    pub index: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            data_dir: default_data_dir(),
            snapshot: SnapshotConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: StoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// `json` (portable) or `binary` (compact).
    #[serde(default = "default_snapshot_format")]
    pub format: SnapshotFormat,

    /// Restore from the snapshot file at startup when it exists.
    #[serde(default)]
    pub load_on_start: bool,

    /// Write a snapshot during graceful shutdown.
    #[serde(default)]
    pub save_on_shutdown: bool,

    /// Snapshot file name inside `data_dir`.
    #[serde(default = "default_snapshot_file")]
    pub file: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            format: default_snapshot_format(),
            load_on_start: false,
            save_on_shutdown: false,
            file: default_snapshot_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Dimension of the provider's vectors; also the dimension served to
    /// text queries.
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Seed for the deterministic local provider.
    #[serde(default)]
    pub seed: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_embedding_dimension(),
            seed: 0,
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:7871".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_snapshot_format() -> SnapshotFormat {
    SnapshotFormat::Json
}

fn default_snapshot_file() -> String {
    "kombu.snapshot".to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("failed to read config file: {}", e)))?;

        let config: ServerConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("failed to parse YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// Supported variables:
    /// - `KOMBU_LISTEN_ADDR`
    /// - `KOMBU_DATA_DIR`
    /// - `KOMBU_SNAPSHOT_FORMAT` (`json` | `binary`)
    /// - `KOMBU_SNAPSHOT_LOAD_ON_START` / `KOMBU_SNAPSHOT_SAVE_ON_SHUTDOWN`
    /// - `KOMBU_EMBED_DIMENSION` / `KOMBU_EMBED_SEED`
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = ServerConfig::default();

        if let Ok(addr) = std::env::var("KOMBU_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Ok(dir) = std::env::var("KOMBU_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(format) = std::env::var("KOMBU_SNAPSHOT_FORMAT") {
            config.snapshot.format = SnapshotFormat::from_str(&format)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if let Ok(v) = std::env::var("KOMBU_SNAPSHOT_LOAD_ON_START") {
            config.snapshot.load_on_start = parse_bool("KOMBU_SNAPSHOT_LOAD_ON_START", &v)?;
        }
        if let Ok(v) = std::env::var("KOMBU_SNAPSHOT_SAVE_ON_SHUTDOWN") {
            config.snapshot.save_on_shutdown = parse_bool("KOMBU_SNAPSHOT_SAVE_ON_SHUTDOWN", &v)?;
        }
        if let Ok(v) = std::env::var("KOMBU_EMBED_DIMENSION") {
            config.embedding.dimension = v
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("bad KOMBU_EMBED_DIMENSION '{}'", v)))?;
        }
        if let Ok(v) = std::env::var("KOMBU_EMBED_SEED") {
            config.embedding.seed = v
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("bad KOMBU_EMBED_SEED '{}'", v)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate and materialize the data directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid(format!("invalid listen_addr: {}", e)))?;

        if self.embedding.dimension == 0 {
            return Err(ConfigError::Invalid(
                "embedding.dimension must be >= 1".to_string(),
            ));
        }

        self.index
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("index defaults: {}", e)))?;

        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .map_err(|e| ConfigError::Invalid(format!("cannot create data_dir: {}", e)))?;
        } else if !self.data_dir.is_dir() {
            return Err(ConfigError::Invalid(
                "data_dir exists but is not a directory".to_string(),
            ));
        }

        Ok(())
    }

    /// Full path of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshot.file)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::Invalid(format!("bad {} '{}'", name, other))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
