use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "chflush.toml";

/// Prefix of structured environment overrides, e.g. `CHFLUSH__FLUSH__WORKERS`
pub const ENV_PREFIX: &str = "CHFLUSH__";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Worker pool and pacing settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushSettings {
    /// Number of concurrent workers per phase
    pub workers: usize,
    /// How long an idle worker waits for a task before exiting
    #[serde(with = "humantime_serde")]
    pub dequeue_timeout: Duration,
    /// Interval between two progress lines
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
    /// Wait after an election failure before retrying
    #[serde(with = "humantime_serde")]
    pub election_retry_delay: Duration,
}

impl Default for FlushSettings {
    fn default() -> Self {
        Self {
            workers: 20,
            dequeue_timeout: Duration::from_secs(5),
            report_interval: Duration::from_secs(60),
            election_retry_delay: Duration::from_secs(20),
        }
    }
}

/// Where the storage services live
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Namespace proxy, serving object listings and deletions
    pub proxy_url: String,
    /// Account service, serving container listings
    pub account_url: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            proxy_url: String::from("http://127.0.0.1:6000"),
            account_url: String::from("http://127.0.0.1:6009"),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Account owning the buckets to flush
    pub account: String,
    pub namespace: String,
    pub flush: FlushSettings,
    pub backend: BackendConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            account: String::from("demo"),
            namespace: String::from("OPENIO"),
            flush: FlushSettings::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl Configuration {
    /// Load from defaults, `chflush.toml` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::extract(Toml::file(DEFAULT_CONFIG_FILE))
    }

    /// Same as [`Configuration::load`] with an explicit file in place of
    /// `chflush.toml`.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::extract(Toml::file_exact(path))
    }

    fn extract(file: figment::providers::Data<Toml>) -> Result<Self, ConfigError> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(file)
            .merge(legacy_env())
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    /// Reject settings the flusher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.account.trim().is_empty() {
            return invalid("account cannot be empty");
        }
        if self.namespace.trim().is_empty() {
            return invalid("namespace cannot be empty");
        }
        if self.flush.workers == 0 {
            return invalid("at least one worker is required");
        }
        if self.flush.report_interval.is_zero() {
            return invalid("report interval must be greater than zero");
        }
        if self.backend.proxy_url.trim().is_empty() {
            return invalid("proxy URL cannot be empty");
        }
        if self.backend.account_url.trim().is_empty() {
            return invalid("account service URL cannot be empty");
        }

        Ok(())
    }
}

/// `OIO_ACCOUNT` and `OIO_NS`, as set by the storage tooling environment
fn legacy_env() -> Env {
    Env::raw().filter_map(|key| {
        if key.as_str().eq_ignore_ascii_case("OIO_ACCOUNT") {
            Some("account".into())
        } else if key.as_str().eq_ignore_ascii_case("OIO_NS") {
            Some("namespace".into())
        } else {
            None
        }
    })
}
