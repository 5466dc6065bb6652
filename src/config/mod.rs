// Configuration loading, validation and conversion into component options.

use crate::cache::{CacheFetcherOptions, CachePolicy, RememberTtls};
use crate::lock::{DEFAULT_FETCH_LOCK_TIMEOUT_MS, LOCK_SLACK_MS};
use crate::purge::{PurgeMethod, PurgeOptions};
use crate::upstream::tls::InvalidHttpsOption;
use crate::upstream::{
    HeaderRules, HttpsOptions, NetworkFetcherOptions, RateControlOptions, UNSPECIFIED_TIMEOUT_MS,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PROD: &str = "prod";
#[allow(dead_code)]
pub const DEV: &str = "dev";
pub const TEST: &str = "test";

pub const DEFAULT_CACHE_CAPACITY_BYTES: usize = 256 * 1024 * 1024;
pub const DEFAULT_IMPLICIT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: i64 },
    #[error(
        "rate_control.max_global_queue_size ({global}) must be at least \
         per_host_queued_threshold ({per_host})"
    )]
    QueueBudget { global: i64, per_host: i64 },
    #[error("fetcher.https_options: {0}")]
    HttpsOptions(#[from] InvalidHttpsOption),
    #[error("purge.rewrite_percentage_threshold must be within 0..=100, got {0}")]
    PurgeThreshold(u8),
    #[error("headers.add entry {0:?} has an empty name")]
    EmptyHeaderName(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(rename = "advfetch")]
    pub advfetch: ConfigBox,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigBox {
    pub env: String,
    pub logs: Option<Logs>,
    pub runtime: Option<Runtime>,
    pub fetcher: Fetcher,
    pub cache: Cache,
    pub rate_control: RateControl,
    pub lock: Option<Lock>,
    pub headers: Option<Headers>,
    pub purge: Option<Purge>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Runtime {
    /// Threads of the worker pool.
    pub workers: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Fetcher {
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub fetch_with_gzip: bool,
    /// Comma separated, e.g. `enable,allow_self_signed`.
    pub https_options: Option<String>,
    pub ssl_certificates_dir: Option<PathBuf>,
    pub ssl_certificates_file: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub track_original_content_length: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Cache {
    pub capacity_bytes: Option<usize>,
    pub respect_vary: bool,
    pub ignore_recent_fetch_failed: bool,
    pub serve_stale_if_fetch_error: bool,
    #[serde(with = "humantime_serde")]
    pub serve_stale_while_revalidate_threshold: Option<Duration>,
    pub default_cache_html: bool,
    pub proactively_freshen_user_facing_request: bool,
    #[serde(with = "humantime_serde")]
    pub remember_fetch_failed_ttl: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub remember_not_cacheable_ttl: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub remember_fetch_dropped_ttl: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub implicit_cache_ttl: Option<Duration>,
    pub max_cacheable_content_length: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateControl {
    pub max_global_queue_size: i64,
    pub per_host_outgoing_threshold: i64,
    pub per_host_queued_threshold: i64,
}

impl Default for RateControl {
    fn default() -> Self {
        let d = RateControlOptions::default();
        Self {
            max_global_queue_size: d.max_global_queue_size as i64,
            per_host_outgoing_threshold: d.per_host_outgoing_threshold as i64,
            per_host_queued_threshold: d.per_host_queued_threshold as i64,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Lock {
    #[serde(default, with = "humantime_serde")]
    pub fetch_lock_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub lock_slack: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeaderPair {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Headers {
    pub user_agent_override: Option<String>,
    pub add: Vec<HeaderPair>,
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Purge {
    pub downstream_cache_purge_prefix: Option<String>,
    pub method: PurgeMethod,
    pub rewrite_percentage_threshold: u8,
}

fn duration_ms(d: Option<Duration>, default_ms: i64) -> i64 {
    d.map(|d| d.as_millis() as i64).unwrap_or(default_ms)
}

impl Config {
    /// Loads configuration from a YAML file and validates it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        Self::from_yaml(&data).with_context(|| format!("load config from {:?}", abs_path))
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data).context("unmarshal yaml")?;
        cfg.validate().context("validate config")?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rc = &self.advfetch.rate_control;
        for (field, value) in [
            ("rate_control.max_global_queue_size", rc.max_global_queue_size),
            (
                "rate_control.per_host_outgoing_threshold",
                rc.per_host_outgoing_threshold,
            ),
            (
                "rate_control.per_host_queued_threshold",
                rc.per_host_queued_threshold,
            ),
        ] {
            if value <= 0 {
                return Err(ConfigError::NotPositive { field, value });
            }
        }
        if rc.max_global_queue_size < rc.per_host_queued_threshold {
            return Err(ConfigError::QueueBudget {
                global: rc.max_global_queue_size,
                per_host: rc.per_host_queued_threshold,
            });
        }
        self.https_options()?;
        if let Some(purge) = &self.advfetch.purge {
            if purge.rewrite_percentage_threshold > 100 {
                return Err(ConfigError::PurgeThreshold(purge.rewrite_percentage_threshold));
            }
        }
        if let Some(headers) = &self.advfetch.headers {
            if let Some(bad) = headers.add.iter().find(|h| h.name.trim().is_empty()) {
                return Err(ConfigError::EmptyHeaderName(bad.value.clone()));
            }
        }
        Ok(())
    }

    pub fn is_prod(&self) -> bool {
        self.advfetch.env == PROD
    }

    pub fn is_test(&self) -> bool {
        self.advfetch.env == TEST
    }

    pub fn log_level(&self) -> &str {
        self.advfetch
            .logs
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .unwrap_or("info")
    }

    pub fn workers(&self) -> usize {
        self.advfetch
            .runtime
            .as_ref()
            .map(|r| r.workers)
            .filter(|&w| w > 0)
            .unwrap_or_else(num_cpus::get)
    }

    pub fn https_options(&self) -> Result<HttpsOptions, ConfigError> {
        match &self.advfetch.fetcher.https_options {
            Some(raw) => Ok(raw.parse()?),
            None => Ok(HttpsOptions::default()),
        }
    }

    pub fn network_fetcher_options(&self) -> Result<NetworkFetcherOptions, ConfigError> {
        let f = &self.advfetch.fetcher;
        let defaults = NetworkFetcherOptions::default();
        Ok(NetworkFetcherOptions {
            timeout_ms: duration_ms(f.timeout, UNSPECIFIED_TIMEOUT_MS),
            fetch_with_gzip: f.fetch_with_gzip,
            https: self.https_options()?,
            ssl_certificates_file: f.ssl_certificates_file.clone(),
            ssl_certificates_dir: f.ssl_certificates_dir.clone(),
            user_agent: f.user_agent.clone().unwrap_or(defaults.user_agent),
            track_original_content_length: f
                .track_original_content_length
                .unwrap_or(defaults.track_original_content_length),
            success_check_period_ms: defaults.success_check_period_ms,
        })
    }

    pub fn cache_capacity_bytes(&self) -> usize {
        self.advfetch
            .cache
            .capacity_bytes
            .unwrap_or(DEFAULT_CACHE_CAPACITY_BYTES)
    }

    pub fn cache_fetcher_options(&self) -> CacheFetcherOptions {
        let c = &self.advfetch.cache;
        CacheFetcherOptions {
            policy: CachePolicy {
                respect_vary: c.respect_vary,
                default_cache_html: c.default_cache_html,
                max_cacheable_content_length: c.max_cacheable_content_length,
            },
            ignore_recent_fetch_failed: c.ignore_recent_fetch_failed,
            serve_stale_if_fetch_error: c.serve_stale_if_fetch_error,
            serve_stale_while_revalidate_threshold_ms: duration_ms(
                c.serve_stale_while_revalidate_threshold,
                0,
            ),
            proactively_freshen_user_facing_request: c.proactively_freshen_user_facing_request,
        }
    }

    pub fn remember_ttls(&self) -> RememberTtls {
        let c = &self.advfetch.cache;
        let d = RememberTtls::default();
        RememberTtls {
            fetch_failed_ms: duration_ms(c.remember_fetch_failed_ttl, d.fetch_failed_ms),
            not_cacheable_ms: duration_ms(c.remember_not_cacheable_ttl, d.not_cacheable_ms),
            dropped_ms: duration_ms(c.remember_fetch_dropped_ttl, d.dropped_ms),
        }
    }

    pub fn implicit_cache_ttl_ms(&self) -> i64 {
        duration_ms(
            self.advfetch.cache.implicit_cache_ttl,
            DEFAULT_IMPLICIT_CACHE_TTL.as_millis() as i64,
        )
    }

    /// Only meaningful after [`Config::validate`] accepted the thresholds.
    pub fn rate_control_options(&self) -> RateControlOptions {
        let rc = &self.advfetch.rate_control;
        RateControlOptions {
            max_global_queue_size: rc.max_global_queue_size.max(1) as usize,
            per_host_outgoing_threshold: rc.per_host_outgoing_threshold.max(1) as usize,
            per_host_queued_threshold: rc.per_host_queued_threshold.max(1) as usize,
        }
    }

    /// Fetch lock timeout and steal slack, in ms.
    pub fn lock_timeouts_ms(&self) -> (i64, i64) {
        let lock = self.advfetch.lock.clone().unwrap_or_default();
        (
            duration_ms(lock.fetch_lock_timeout, DEFAULT_FETCH_LOCK_TIMEOUT_MS),
            duration_ms(lock.lock_slack, LOCK_SLACK_MS),
        )
    }

    pub fn header_rules(&self) -> HeaderRules {
        let Some(h) = &self.advfetch.headers else {
            return HeaderRules::default();
        };
        HeaderRules {
            user_agent_override: h.user_agent_override.clone(),
            remove: h.remove.clone(),
            add: h
                .add
                .iter()
                .map(|p| (p.name.clone(), p.value.clone()))
                .collect(),
        }
    }

    pub fn purge_options(&self) -> PurgeOptions {
        let Some(p) = &self.advfetch.purge else {
            return PurgeOptions::default();
        };
        PurgeOptions {
            downstream_cache_purge_prefix: p.downstream_cache_purge_prefix.clone().unwrap_or_default(),
            method: p.method,
            rewrite_percentage_threshold: p.rewrite_percentage_threshold,
        }
    }
}

mod test_config;
#[allow(dead_code)]
pub use test_config::new_test_config;
