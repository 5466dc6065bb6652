// In-process fetchers standing in for the network.

use crate::fetch::{ContentLength, FetchSink};
use crate::http::{names, status, RequestHeaders, ResponseHeaders};
use crate::scheduler::Timer;
use crate::upstream::UrlAsyncFetcher;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Canned origin response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub headers: ResponseHeaders,
    pub body: Vec<u8>,
    pub success: bool,
}

impl MockResponse {
    pub fn new(headers: ResponseHeaders, body: &str) -> Self {
        Self {
            headers,
            body: body.as_bytes().to_vec(),
            success: true,
        }
    }

    /// 200 with `Cache-Control: max-age=<max_age_s>`.
    pub fn cacheable(max_age_s: i64, content_type: &str, body: &str) -> Self {
        let mut h = ResponseHeaders::with_status(status::OK);
        h.add(names::CACHE_CONTROL, format!("max-age={max_age_s}"));
        h.add(names::CONTENT_TYPE, content_type);
        Self::new(h, body)
    }

    pub fn with_status(code: u16, body: &str) -> Self {
        Self::new(ResponseHeaders::with_status(code), body)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.add(name.to_string(), value.to_string());
        self
    }

    /// Transport failure: no headers, `done(false)`.
    pub fn failure() -> Self {
        Self {
            headers: ResponseHeaders::new(),
            body: Vec::new(),
            success: false,
        }
    }
}

/// One request the mock origin saw.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub url: String,
    pub headers: RequestHeaders,
    pub background: bool,
}

/// Answers synchronously from a table of canned responses and honors
/// If-None-Match / If-Modified-Since like a real origin. Date headers are
/// stamped from the attached timer at fetch time.
pub struct MockUrlFetcher {
    responses: Mutex<HashMap<String, MockResponse>>,
    seen: Mutex<Vec<SeenRequest>>,
    timer: Option<Arc<dyn Timer>>,
    body_bytes: AtomicI64,
    shut_down: AtomicBool,
}

impl MockUrlFetcher {
    pub fn new(timer: Option<Arc<dyn Timer>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            seen: Mutex::new(Vec::new()),
            timer,
            body_bytes: AtomicI64::new(0),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn set_response(&self, url: &str, response: MockResponse) {
        self.responses.lock().insert(url.to_string(), response);
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn last_request(&self) -> Option<SeenRequest> {
        self.seen.lock().last().cloned()
    }

    /// Body bytes written into sinks so far.
    pub fn body_bytes(&self) -> i64 {
        self.body_bytes.load(Ordering::SeqCst)
    }

    fn not_modified(request: &RequestHeaders, response: &ResponseHeaders) -> bool {
        if let Some(inm) = request.if_none_match() {
            return response.etag() == Some(inm);
        }
        match request.if_modified_since() {
            Some(ims) => response.last_modified() == Some(ims),
            None => false,
        }
    }
}

impl UrlAsyncFetcher for MockUrlFetcher {
    fn fetch(&self, url: &str, mut sink: FetchSink) {
        self.seen.lock().push(SeenRequest {
            url: url.to_string(),
            headers: sink.request_headers().clone(),
            background: sink.is_background_fetch(),
        });
        if self.shut_down.load(Ordering::SeqCst) {
            sink.done(false);
            return;
        }
        let Some(response) = self.responses.lock().get(url).cloned() else {
            sink.fail_with_status(status::NOT_FOUND);
            return;
        };
        if !response.success {
            sink.done(false);
            return;
        }

        let mut headers = response.headers.clone();
        if let Some(timer) = &self.timer {
            headers.set_date_ms(timer.now_ms());
        }
        if Self::not_modified(sink.request_headers(), &headers) {
            let mut not_modified = ResponseHeaders::with_status(status::NOT_MODIFIED);
            for name in [names::DATE, names::ETAG, names::LAST_MODIFIED, names::CACHE_CONTROL] {
                if let Some(v) = headers.lookup1(name) {
                    not_modified.add(name, v.to_string());
                }
            }
            sink.response_headers_mut().copy_from(&not_modified);
            sink.done(true);
            return;
        }

        sink.response_headers_mut().copy_from(&headers);
        sink.set_content_length(ContentLength::known(response.body.len() as u64));
        sink.headers_complete();
        self.body_bytes
            .fetch_add(response.body.len() as i64, Ordering::SeqCst);
        sink.write(&response.body);
        sink.done(true);
    }

    fn shut_down(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

/// Counts calls and forwards them.
pub struct CountingFetcher {
    base: Arc<dyn UrlAsyncFetcher>,
    count: AtomicUsize,
}

impl CountingFetcher {
    pub fn new(base: Arc<dyn UrlAsyncFetcher>) -> Arc<Self> {
        Arc::new(Self {
            base,
            count: AtomicUsize::new(0),
        })
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl UrlAsyncFetcher for CountingFetcher {
    fn fetch(&self, url: &str, sink: FetchSink) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.base.fetch(url, sink);
    }

    fn shut_down(&self) {
        self.base.shut_down();
    }
}

/// Holds every fetch until the test releases it into `base`.
pub struct DeferredFetcher {
    base: Arc<dyn UrlAsyncFetcher>,
    held: Mutex<Vec<(String, FetchSink)>>,
}

impl DeferredFetcher {
    pub fn new(base: Arc<dyn UrlAsyncFetcher>) -> Arc<Self> {
        Arc::new(Self {
            base,
            held: Mutex::new(Vec::new()),
        })
    }

    pub fn pending(&self) -> usize {
        self.held.lock().len()
    }

    pub fn pending_urls(&self) -> Vec<String> {
        self.held.lock().iter().map(|(u, _)| u.clone()).collect()
    }

    /// Releases the oldest held fetch. Returns false when none is held.
    pub fn release_one(&self) -> bool {
        let next = {
            let mut held = self.held.lock();
            if held.is_empty() {
                None
            } else {
                Some(held.remove(0))
            }
        };
        match next {
            Some((url, sink)) => {
                self.base.fetch(&url, sink);
                true
            }
            None => false,
        }
    }

    /// Releases everything currently held, including fetches queued while
    /// releasing.
    pub fn release_all(&self) -> usize {
        let mut n = 0;
        while self.release_one() {
            n += 1;
        }
        n
    }
}

impl UrlAsyncFetcher for DeferredFetcher {
    fn fetch(&self, url: &str, sink: FetchSink) {
        self.held.lock().push((url.to_string(), sink));
    }

    /// Fails every held fetch.
    fn shut_down(&self) {
        let held = std::mem::take(&mut *self.held.lock());
        for (_, sink) in held {
            sink.done(false);
        }
        self.base.shut_down();
    }
}
