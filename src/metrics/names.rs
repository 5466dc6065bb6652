// HTTP cache.
pub const CACHE_HITS: &str = "cache_hits";
pub const CACHE_MISSES: &str = "cache_misses";
pub const CACHE_EXPIRATIONS: &str = "cache_expirations";
pub const CACHE_INSERTS: &str = "cache_inserts";
pub const CACHE_DELETES: &str = "cache_deletes";
pub const CACHE_FALLBACKS: &str = "cache_fallbacks";
pub const CACHE_BACKEND_HITS: &str = "cache_backend_hits";
pub const CACHE_BACKEND_MISSES: &str = "cache_backend_misses";
pub const CACHE_TIME_US: &str = "cache_time_us";
pub const CACHE_CORRUPTIONS: &str = "cache_corruptions";

// Cache fetcher.
pub const FALLBACK_RESPONSES_SERVED: &str = "fallback_responses_served";
pub const FALLBACK_RESPONSES_SERVED_WHILE_REVALIDATE: &str =
    "fallback_responses_served_while_revalidate";
pub const NUM_CONDITIONAL_REFRESHES: &str = "num_conditional_refreshes";
pub const NUM_PROACTIVELY_FRESHEN_USER_FACING_REQUEST: &str =
    "num_proactively_freshen_user_facing_request";

// Network fetcher.
pub const SERF_FETCH_REQUEST_COUNT: &str = "serf_fetch_request_count";
pub const SERF_FETCH_BYTES_COUNT: &str = "serf_fetch_bytes_count";
pub const SERF_FETCH_TIME_DURATION_MS: &str = "serf_fetch_time_duration_ms";
pub const SERF_FETCH_CANCEL_COUNT: &str = "serf_fetch_cancel_count";
pub const SERF_FETCH_ACTIVE_COUNT: &str = "serf_fetch_active_count";
pub const SERF_FETCH_TIMEOUT_COUNT: &str = "serf_fetch_timeout_count";
pub const SERF_FETCH_FAILURE_COUNT: &str = "serf_fetch_failure_count";
pub const SERF_FETCH_CERT_ERRORS: &str = "serf_fetch_cert_errors";
pub const SERF_FETCH_ULTIMATE_SUCCESS: &str = "serf_fetch_ultimate_success";
pub const SERF_FETCH_ULTIMATE_FAILURE: &str = "serf_fetch_ultimate_failure";
pub const SERF_FETCH_LAST_CHECK_TIMESTAMP_MS: &str = "serf_fetch_last_check_timestamp_ms";

// Rate controller.
pub const QUEUED_FETCH_COUNT: &str = "queued_fetch_count";
pub const DROPPED_FETCH_COUNT: &str = "dropped_fetch_count";
pub const CURRENT_GLOBAL_FETCH_QUEUE_SIZE: &str = "current_global_fetch_queue_size";

// Stats fetcher, prefixed per instance.
pub const FETCHES_SUFFIX: &str = "_fetches";
pub const BYTES_FETCHED_SUFFIX: &str = "_bytes_fetched";
pub const APPROX_HEADER_BYTES_FETCHED_SUFFIX: &str = "_approx_header_bytes_fetched";
pub const FETCH_LATENCY_US_SUFFIX: &str = "_fetch_latency_us";

// Named locks.
pub const NAMED_LOCK_STEALS: &str = "named_lock_steals";
pub const NAMED_LOCK_DENIALS: &str = "named_lock_denials";

// Downstream purge.
pub const DOWNSTREAM_CACHE_PURGE_ATTEMPTS: &str = "downstream_cache_purge_attempts";
pub const SUCCESSFUL_DOWNSTREAM_CACHE_PURGES: &str = "successful_downstream_cache_purges";
