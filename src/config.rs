use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::PriorityRules;
use crate::error::{AppError, Result};
use crate::extract::StrategyKind;

const MIN_SNAPSHOT_DELAY_MS: u64 = 1_000;
const MIN_RECORD_DELAY_MS: u64 = 2_000;

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub priority: PriorityRules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,

    /// Tried in this order; the first strategy to clear the threshold wins.
    #[serde(default = "StrategyKind::default_order")]
    pub strategies: Vec<StrategyKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_snapshot_limit")]
    pub snapshot_limit: usize,

    #[serde(default = "default_snapshot_delay_ms")]
    pub snapshot_delay_ms: u64,

    #[serde(default = "default_record_delay_ms")]
    pub record_delay_ms: u64,

    #[serde(default = "default_cdx_endpoint")]
    pub cdx_endpoint: String,

    #[serde(default = "default_archive_base")]
    pub archive_base: String,
}

fn default_data_dir() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pocket-rescue");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.to_string_lossy().to_string()
}

fn default_concurrency() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    BROWSER_USER_AGENT.to_string()
}

fn default_min_content_chars() -> usize {
    100
}

fn default_snapshot_limit() -> usize {
    5
}

fn default_snapshot_delay_ms() -> u64 {
    MIN_SNAPSHOT_DELAY_MS
}

fn default_record_delay_ms() -> u64 {
    MIN_RECORD_DELAY_MS
}

fn default_cdx_endpoint() -> String {
    "http://web.archive.org/cdx/search/cdx".to_string()
}

fn default_archive_base() -> String {
    "http://web.archive.org/web".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            include_archived: false,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_content_chars: default_min_content_chars(),
            strategies: StrategyKind::default_order(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            snapshot_limit: default_snapshot_limit(),
            snapshot_delay_ms: default_snapshot_delay_ms(),
            record_delay_ms: default_record_delay_ms(),
            cdx_endpoint: default_cdx_endpoint(),
            archive_base: default_archive_base(),
        }
    }
}

impl RecoveryConfig {
    /// Pause between snapshot attempts for one record. Never below one second.
    pub fn snapshot_delay(&self) -> Duration {
        Duration::from_millis(self.snapshot_delay_ms.max(MIN_SNAPSHOT_DELAY_MS))
    }

    /// Pause between records. Never below two seconds.
    pub fn record_delay(&self) -> Duration {
        Duration::from_millis(self.record_delay_ms.max(MIN_RECORD_DELAY_MS))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            fetch: FetchConfig::default(),
            extraction: ExtractionConfig::default(),
            recovery: RecoveryConfig::default(),
            priority: PriorityRules::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        if config.extraction.strategies.is_empty() {
            return Err(AppError::Config(
                "extraction.strategies must name at least one strategy".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pocket-rescue")
            .join("config.toml")
    }

    pub fn db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("articles.db")
    }

    pub fn content_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("articles")
    }

    pub fn search_index_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("search_index.json")
    }
}
