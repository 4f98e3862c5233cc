use crate::humanize::ByteSize;
use crate::url::DEFAULT_URL_TEMPLATE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub project: ProjectConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// The collection being downloaded
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectConfig {
    /// Used for the ledger file name and the output directory
    pub name: String,
    /// Contract identifier copied into every ledger row
    pub contract: String,
    /// Total number of items; ids run from 0 to size - 1
    pub size: u64,
}

/// Pipeline tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Maximum number of items scheduled per run
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of concurrent fetchers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Persist the ledger whenever an id divisible by this completes
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
    /// Pause after each item
    #[serde(default = "default_jitter")]
    pub jitter: DelayRange,
    /// Pause between spawning workers
    #[serde(default = "default_startup_stagger")]
    pub startup_stagger: DelayRange,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: PathBuf,
    /// Template with `{contract}` and `{id}` placeholders
    #[serde(default = "default_url_template")]
    pub url_template: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            checkpoint_interval: default_checkpoint_interval(),
            jitter: default_jitter(),
            startup_stagger: default_startup_stagger(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            output_root: default_output_root(),
            metadata_dir: default_metadata_dir(),
            url_template: default_url_template(),
        }
    }
}

impl DownloadConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Inclusive millisecond range a random delay is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange {
        min_ms: 0,
        max_ms: 0,
    };

    pub fn sample(&self) -> Duration {
        use rand::Rng;

        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        let ms = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }
}

fn default_batch_size() -> usize {
    1000
}

fn default_workers() -> usize {
    50
}

fn default_checkpoint_interval() -> u64 {
    100
}

fn default_jitter() -> DelayRange {
    DelayRange {
        min_ms: 20,
        max_ms: 80,
    }
}

fn default_startup_stagger() -> DelayRange {
    DelayRange {
        min_ms: 10,
        max_ms: 30,
    }
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_output_root() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_metadata_dir() -> PathBuf {
    PathBuf::from("metadata")
}

fn default_url_template() -> String {
    DEFAULT_URL_TEMPLATE.to_string()
}

/// HTTP client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    pub proxy: Option<String>,
    /// Responses larger than this are discarded and the item marked failed
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: ByteSize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            proxy: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    concat!("bulkfetch/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_body_bytes() -> ByteSize {
    ByteSize(50 * 1024 * 1024)
}

impl Config {
    /// `<metadata_dir>/<project>.csv`
    pub fn ledger_path(&self) -> PathBuf {
        self.download
            .metadata_dir
            .join(format!("{}.csv", self.project.name))
    }

    /// `<output_root>/<project>/`
    pub fn output_dir(&self) -> PathBuf {
        self.download.output_root.join(&self.project.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Config {
        toml::from_str(
            r#"
[project]
name = "punks"
contract = "0xb47e"
size = 10000
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = minimal();
        assert_eq!(config.download.batch_size, 1000);
        assert_eq!(config.download.workers, 50);
        assert_eq!(config.download.checkpoint_interval, 100);
        assert_eq!(config.download.jitter, DelayRange { min_ms: 20, max_ms: 80 });
        assert_eq!(config.http.max_body_bytes.as_u64(), 50 * 1024 * 1024);
        assert!(config.http.proxy.is_none());
    }

    #[test]
    fn test_derived_paths() {
        let config = minimal();
        assert_eq!(config.ledger_path(), PathBuf::from("metadata/punks.csv"));
        assert_eq!(config.output_dir(), PathBuf::from("downloads/punks"));
    }

    #[test]
    fn test_delay_sample_within_range() {
        let range = DelayRange { min_ms: 20, max_ms: 80 };
        for _ in 0..100 {
            let d = range.sample();
            assert!(d >= Duration::from_millis(20) && d <= Duration::from_millis(80));
        }
        assert_eq!(DelayRange::ZERO.sample(), Duration::ZERO);
    }
}
