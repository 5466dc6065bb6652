use super::{Cache, Config, ConfigBox, Fetcher, Lock, Logs, RateControl, Runtime};
use std::time::Duration;

/// Creates a fully populated in-memory configuration for tests.
pub fn new_test_config() -> Config {
    Config {
        advfetch: ConfigBox {
            env: super::TEST.to_string(),
            logs: Some(Logs {
                level: Some("debug".to_string()),
            }),
            runtime: Some(Runtime { workers: 2 }),
            fetcher: Fetcher {
                timeout: Some(Duration::from_secs(5)),
                fetch_with_gzip: false,
                https_options: Some("enable".to_string()),
                ssl_certificates_dir: None,
                ssl_certificates_file: None,
                user_agent: None,
                track_original_content_length: Some(true),
            },
            cache: Cache {
                capacity_bytes: Some(16 * 1024 * 1024),
                respect_vary: false,
                ignore_recent_fetch_failed: false,
                serve_stale_if_fetch_error: true,
                serve_stale_while_revalidate_threshold: None,
                default_cache_html: false,
                proactively_freshen_user_facing_request: false,
                remember_fetch_failed_ttl: Some(Duration::from_secs(300)),
                remember_not_cacheable_ttl: Some(Duration::from_secs(300)),
                remember_fetch_dropped_ttl: Some(Duration::from_secs(10)),
                implicit_cache_ttl: Some(Duration::from_secs(300)),
                max_cacheable_content_length: None,
            },
            rate_control: RateControl {
                max_global_queue_size: 10,
                per_host_outgoing_threshold: 2,
                per_host_queued_threshold: 4,
            },
            lock: Some(Lock {
                fetch_lock_timeout: Some(Duration::from_secs(120)),
                lock_slack: Some(Duration::from_secs(120)),
            }),
            headers: None,
            purge: None,
        },
    }
}
