// Small helpers for building requests and collecting responses.

use crate::fetch::{CollectedResponse, FetchSink, StringAsyncFetch};
use crate::http::{RequestContext, RequestHeaders};
use parking_lot::Mutex;
use std::sync::Arc;

/// Where a collecting sink leaves its result once `done` runs.
pub type Slot = Arc<Mutex<Option<CollectedResponse>>>;

pub fn request_with(headers: &[(&str, &str)]) -> RequestHeaders {
    let mut req = RequestHeaders::new();
    for (name, value) in headers {
        req.add(name.to_string(), value.to_string());
    }
    req
}

/// Sink collecting into a [`Slot`].
pub fn collecting_fetch(request: RequestHeaders, background: bool) -> (FetchSink, Slot) {
    let slot: Slot = Arc::new(Mutex::new(None));
    let out = slot.clone();
    let sink = StringAsyncFetch::with_callback(RequestContext::new(), move |r| {
        *out.lock() = Some(r);
    })
    .with_request_headers(request)
    .background(background)
    .into_sink();
    (sink, slot)
}

/// Result of a finished fetch; panics if `done` has not run yet.
pub fn take_done(slot: &Slot) -> CollectedResponse {
    slot.lock().take().expect("fetch should be done")
}

pub fn is_done(slot: &Slot) -> bool {
    slot.lock().is_some()
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a thread-local subscriber and returns what it logged.
pub fn capture_logs<F: FnOnce()>(f: F) -> String {
    let buf = LogBuffer::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buf.0.lock().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}
