//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};

use ark_types::{NetworkConfig, Slots};

use crate::{LogFormat, NodeError};

/// Configuration of the blockchain service.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Idle time after which the node checks the network for new blocks.
    #[serde(default = "default_wakeup_timeout_secs")]
    pub wakeup_timeout_secs: u64,

    /// A queue job is flushed once it holds this many transactions.
    #[serde(default = "default_max_transactions_per_chunk")]
    pub max_transactions_per_chunk: usize,

    #[serde(default = "default_max_blocks_per_chunk")]
    pub max_blocks_per_chunk: usize,

    /// Size of the in-memory window of recent blocks.
    #[serde(default = "default_max_last_blocks")]
    pub max_last_blocks: usize,

    /// Forger blocks arriving with less time left in their slot are dropped.
    #[serde(default = "default_forger_min_time_left_ms")]
    pub forger_min_time_left_ms: u64,

    /// Queued jobs above which downloading pauses.
    #[serde(default = "default_download_paused_queue_length")]
    pub download_paused_queue_length: usize,

    /// Failed download attempts before the network is considered halted.
    #[serde(default = "default_max_no_block_attempts")]
    pub max_no_block_attempts: u32,

    #[serde(default = "default_fork_recovery_min_blocks")]
    pub fork_recovery_min_blocks: u64,

    #[serde(default = "default_fork_recovery_max_blocks")]
    pub fork_recovery_max_blocks: u64,

    /// How far integrity recovery may rewind the persisted chain.
    #[serde(default = "default_database_rollback_max_block_rewind")]
    pub database_rollback_max_block_rewind: u64,

    /// Blocks removed per integrity recovery step.
    #[serde(default = "default_database_rollback_steps")]
    pub database_rollback_steps: u64,

    #[serde(default)]
    pub network: NetworkConfig,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_wakeup_timeout_secs() -> u64 {
    60
}

fn default_max_transactions_per_chunk() -> usize {
    150
}

fn default_max_blocks_per_chunk() -> usize {
    100
}

fn default_max_last_blocks() -> usize {
    100
}

fn default_forger_min_time_left_ms() -> u64 {
    2000
}

fn default_download_paused_queue_length() -> usize {
    100
}

fn default_max_no_block_attempts() -> u32 {
    5
}

fn default_fork_recovery_min_blocks() -> u64 {
    4
}

fn default_fork_recovery_max_blocks() -> u64 {
    102
}

fn default_database_rollback_max_block_rewind() -> u64 {
    10_000
}

fn default_database_rollback_steps() -> u64 {
    1_000
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<(), NodeError> {
        if self.fork_recovery_min_blocks > self.fork_recovery_max_blocks {
            return Err(NodeError::Config(format!(
                "fork_recovery_min_blocks ({}) exceeds fork_recovery_max_blocks ({})",
                self.fork_recovery_min_blocks, self.fork_recovery_max_blocks
            )));
        }
        if self.database_rollback_steps == 0 {
            return Err(NodeError::Config("database_rollback_steps must be positive".into()));
        }
        self.log_format()?;
        Ok(())
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        match self.log_format.as_str() {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(NodeError::Config(format!("unknown log format: {other}"))),
        }
    }

    /// Upper bound of blocks per queue job.
    pub fn max_blocks_per_job(&self) -> usize {
        self.max_last_blocks.min(self.max_blocks_per_chunk).max(1)
    }

    pub fn slots(&self) -> Slots {
        Slots::new(self.network.epoch, self.network.milestones.clone())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
            wakeup_timeout_secs: default_wakeup_timeout_secs(),
            max_transactions_per_chunk: default_max_transactions_per_chunk(),
            max_blocks_per_chunk: default_max_blocks_per_chunk(),
            max_last_blocks: default_max_last_blocks(),
            forger_min_time_left_ms: default_forger_min_time_left_ms(),
            download_paused_queue_length: default_download_paused_queue_length(),
            max_no_block_attempts: default_max_no_block_attempts(),
            fork_recovery_min_blocks: default_fork_recovery_min_blocks(),
            fork_recovery_max_blocks: default_fork_recovery_max_blocks(),
            database_rollback_max_block_rewind: default_database_rollback_max_block_rewind(),
            database_rollback_steps: default_database_rollback_steps(),
            network: NetworkConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.wakeup_timeout_secs, 60);
        assert_eq!(config.max_blocks_per_job(), 100);
        assert_eq!(config.log_format().unwrap(), LogFormat::Human);
        assert_eq!(config.network.milestones.at(1).active_delegates, 51);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            max_last_blocks = 20
            log_format = "json"

            [network]
            epoch = 1000

            [[network.milestones]]
            height = 1
            blocktime = 4
            active_delegates = 3
            reward = 0
            aip11 = false
            max_transactions = 50
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.max_blocks_per_job(), 20);
        assert_eq!(config.log_format().unwrap(), LogFormat::Json);
        assert_eq!(config.network.epoch, 1000);
        assert!(!config.network.milestones.at(5).aip11);
        assert_eq!(config.forger_min_time_left_ms, 2000);
    }

    #[test]
    fn invalid_values_rejected() {
        let err = NodeConfig::from_toml_str("log_format = \"xml\"").unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));

        let toml = "fork_recovery_min_blocks = 10\nfork_recovery_max_blocks = 5";
        assert!(NodeConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "wakeup_timeout_secs = 5").unwrap();
        let config = NodeConfig::from_toml_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.wakeup_timeout_secs, 5);
    }

    #[test]
    fn missing_file_returns_config_error() {
        let err = NodeConfig::from_toml_file("/nonexistent/ark.toml").unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }
}
