// Command line fetcher: runs URLs through the caching fetch pipeline.

use advfetch::app::Pipeline;
use advfetch::config::Config;
use advfetch::dedlog;
use advfetch::fetch::{CollectedResponse, FetchError, SyncFetcherAdapter};
use advfetch::http::{names, RequestContext, RequestHeaders};
use advfetch::shutdown::GracefulShutdown;
use advfetch::upstream::UrlAsyncFetcher;
use advfetch::workers::make_function;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const CONFIG_PATH: &str = "cfg/advfetch.cfg.yaml";
const CONFIG_PATH_LOCAL: &str = "cfg/advfetch.cfg.local.yaml";

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// AdvFetch - caching, rate-controlled HTTP fetcher
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, value_name = "FILE")]
    cfg: Option<PathBuf>,

    /// Fetch as background work (subject to rate control and load shedding)
    #[arg(short, long)]
    background: bool,

    /// Fetch every URL this many times in a row
    #[arg(short, long, default_value_t = 1)]
    repeat: usize,

    /// URLs to fetch
    #[arg(required = true)]
    urls: Vec<String>,
}

/// Loads the configuration from `--cfg`, else the local override, else the
/// default file.
fn load_cfg(path: Option<PathBuf>) -> Result<Config> {
    if let Some(custom_path) = path {
        let cfg = Config::load(&custom_path)
            .with_context(|| format!("failed to load custom config from {:?}", custom_path))?;
        info!(component = "config", event = "load_success", path = ?custom_path, "config loaded");
        return Ok(cfg);
    }

    match Config::load(PathBuf::from(CONFIG_PATH_LOCAL)) {
        Ok(cfg) => {
            info!(component = "config", event = "load_success", path = CONFIG_PATH_LOCAL, "config loaded");
            Ok(cfg)
        }
        Err(_) => {
            let cfg = Config::load(PathBuf::from(CONFIG_PATH))
                .with_context(|| format!("failed to load config from {}", CONFIG_PATH))?;
            info!(component = "config", event = "load_success", path = CONFIG_PATH, "config loaded");
            Ok(cfg)
        }
    }
}

/// JSON logs in production, pretty console output otherwise.
fn configure_logger(cfg: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.log_level()));

    if cfg.is_prod() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}

struct Outcome {
    url: String,
    attempt: usize,
    result: Result<CollectedResponse, FetchError>,
}

fn report(outcome: &Outcome) {
    match &outcome.result {
        Ok(r) => {
            let mut notes = Vec::new();
            if let Some(w) = r.response_headers.lookup1(names::WARNING) {
                notes.push(format!("warning={w:?}"));
            }
            if r.extra_response_headers.has(names::X_PSA_LOAD_SHED)
                || r.response_headers.has(names::X_PSA_LOAD_SHED)
            {
                notes.push("load-shed".to_string());
            }
            println!(
                "{} #{} status={} success={} length={} {}",
                outcome.url,
                outcome.attempt,
                r.status(),
                r.success,
                r.body.len(),
                notes.join(" ")
            );
        }
        Err(e) => println!("{} #{} error={}", outcome.url, outcome.attempt, e),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = load_cfg(args.cfg.clone())?;
    configure_logger(&cfg);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("advfetch-io")
        .build()
        .context("failed to create tokio runtime")?;

    let shutdown_token = CancellationToken::new();
    let dedlog_token = shutdown_token.child_token();
    let dedlog_task = runtime.spawn(dedlog::start_dedup_logger(dedlog_token.clone()));

    let pipeline = Arc::new(Pipeline::from_config(&cfg, runtime.handle().clone())?);
    let gsh = GracefulShutdown::new(shutdown_token.clone(), SHUTDOWN_TIMEOUT);
    {
        let _guard = runtime.enter();
        gsh.listen_for_signals();
    }
    {
        // SIGINT stops the pipeline; blocked workers then see their fetches fail.
        let pipeline = pipeline.clone();
        let token = shutdown_token.clone();
        runtime.spawn(async move {
            token.cancelled().await;
            let _ = tokio::task::spawn_blocking(move || pipeline.shut_down()).await;
        });
    }

    let timeout = match pipeline.timeout_ms() {
        ms if ms > 0 => Duration::from_millis(ms as u64 * 2),
        _ => DEFAULT_FETCH_TIMEOUT,
    };
    let adapter = Arc::new(
        SyncFetcherAdapter::new(pipeline.clone(), runtime.handle().clone(), timeout)
            .background(args.background),
    );

    // One sequence per URL: repeats run in order, different URLs in parallel.
    let (tx, rx) = mpsc::channel::<Outcome>();
    let mut sequences = Vec::with_capacity(args.urls.len());
    for url in &args.urls {
        let seq = pipeline.workers().new_sequence();
        for attempt in 1..=args.repeat.max(1) {
            let adapter = adapter.clone();
            let tx = tx.clone();
            let url = url.clone();
            seq.add(make_function(move || {
                let result = adapter.fetch(&url, RequestHeaders::new(), RequestContext::new());
                let _ = tx.send(Outcome {
                    url,
                    attempt,
                    result,
                });
            }));
        }
        sequences.push(seq);
    }
    drop(tx);

    let mut failures = 0;
    for outcome in rx {
        if !matches!(&outcome.result, Ok(r) if r.success) {
            failures += 1;
        }
        report(&outcome);
    }
    for seq in &sequences {
        seq.wait_idle();
    }

    match serde_json::to_string_pretty(&pipeline.stats().dump()) {
        Ok(dump) => println!("{dump}"),
        Err(e) => warn!(component = "main", event = "stats_dump_failed", error = %e),
    }

    pipeline.shut_down();
    if let Err(e) = runtime.block_on(gsh.shut_down()) {
        error!(
            component = "main",
            event = "graceful_shutdown_failed",
            error = %e,
            "failed to gracefully shut down"
        );
    }
    dedlog_token.cancel();
    let _ = runtime.block_on(dedlog_task);
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);

    if failures > 0 {
        info!(component = "main", event = "done", failures, "some fetches failed");
        std::process::exit(1);
    }
    Ok(())
}
