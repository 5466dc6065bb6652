// The full pipeline over a mock origin, a mock clock and a mock scheduler.

use super::common::{collecting_fetch, take_done, Slot};
use super::fetchers::MockUrlFetcher;
use crate::app::Pipeline;
use crate::config::{new_test_config, Config};
use crate::fetch::CollectedResponse;
use crate::http::RequestHeaders;
use crate::scheduler::{MockScheduler, MockTimer, Timer};
use crate::upstream::UrlAsyncFetcher;
use std::sync::Arc;

pub struct FetchHarness {
    pub timer: Arc<MockTimer>,
    pub scheduler: MockScheduler,
    pub origin: Arc<MockUrlFetcher>,
    pub pipeline: Pipeline,
}

impl FetchHarness {
    pub fn new() -> Self {
        Self::with_config(new_test_config())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_origin_layer(config, |origin| origin)
    }

    /// Puts `layer` between the pipeline and the mock origin, e.g. to defer
    /// or count origin fetches.
    pub fn with_origin_layer<F>(config: Config, layer: F) -> Self
    where
        F: FnOnce(Arc<dyn UrlAsyncFetcher>) -> Arc<dyn UrlAsyncFetcher>,
    {
        let timer = Arc::new(MockTimer::new(MockTimer::APR_5_2010_MS));
        let scheduler = MockScheduler::new(timer.clone());
        let origin = MockUrlFetcher::new(Some(timer.clone() as Arc<dyn Timer>));
        let pipeline = Pipeline::with_origin(
            &config,
            layer(origin.clone() as Arc<dyn UrlAsyncFetcher>),
            timer.clone(),
            scheduler.scheduler(),
        )
        .expect("test pipeline");
        Self {
            timer,
            scheduler,
            origin,
            pipeline,
        }
    }

    /// Plain GET. The mock origin answers inline, so the result is ready on
    /// return.
    pub fn fetch(&self, url: &str) -> CollectedResponse {
        self.fetch_with(url, RequestHeaders::new())
    }

    pub fn fetch_with(&self, url: &str, request: RequestHeaders) -> CollectedResponse {
        let slot = self.start_fetch(url, request, false);
        take_done(&slot)
    }

    pub fn start_fetch(&self, url: &str, request: RequestHeaders, background: bool) -> Slot {
        let (sink, slot) = collecting_fetch(request, background);
        self.pipeline.fetch(url, sink);
        slot
    }

    pub fn stat(&self, name: &str) -> i64 {
        self.pipeline.stats().get(name)
    }

    pub fn clear_stats(&self) {
        self.pipeline.stats().clear();
    }

    pub fn advance_ms(&self, ms: i64) {
        self.scheduler.advance_time_ms(ms);
    }
}

impl Default for FetchHarness {
    fn default() -> Self {
        Self::new()
    }
}
