use std::path::PathBuf;
use std::time::Duration;

use kce_adapters::{OLX_LISTING_URL, OLX_SOURCE_ID};
use kce_storage::{HttpClientConfig, StoreConfig};

pub const RAW_LOG_FILE: &str = "jobs.jsonl";
pub const DUPLICATE_LOG_FILE: &str = "duplicates.log";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub source_id: String,
    pub source_url: String,
    pub data_dir: PathBuf,
    pub store: StoreConfig,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub scheduler_enabled: bool,
    pub sync_crons: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_id: OLX_SOURCE_ID.to_string(),
            source_url: OLX_LISTING_URL.to_string(),
            data_dir: PathBuf::from("./data"),
            store: StoreConfig::default(),
            user_agent: "Mozilla/5.0".to_string(),
            http_timeout_secs: 30,
            scheduler_enabled: false,
            sync_crons: vec!["0 0 6,18 * * *".to_string()],
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            source_id: defaults.source_id,
            source_url: std::env::var("KCE_SOURCE_URL").unwrap_or(defaults.source_url),
            data_dir: std::env::var("KCE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            store: StoreConfig::from_env(),
            user_agent: std::env::var("KCE_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("KCE_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            scheduler_enabled: std::env::var("KCE_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(defaults.scheduler_enabled),
            sync_crons: std::env::var("KCE_SYNC_CRON")
                .map(|v| {
                    v.split(';')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or(defaults.sync_crons),
        }
    }

    /// Every processed candidate, whatever its outcome.
    pub fn raw_log_path(&self) -> PathBuf {
        self.data_dir.join(RAW_LOG_FILE)
    }

    /// Candidates rejected on fingerprint collision.
    pub fn duplicate_log_path(&self) -> PathBuf {
        self.data_dir.join(DUPLICATE_LOG_FILE)
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            ..Default::default()
        }
    }
}
