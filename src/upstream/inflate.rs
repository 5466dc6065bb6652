//! Gunzips a response for a caller that did not ask for gzip.

use crate::fetch::{delegate_state, AsyncFetch, ContentLength, FetchSink};
use crate::http::{names, ResponseHeaders};
use flate2::write::GzDecoder;
use std::io::Write;
use tracing::debug;

/// Sink interposed between the transport and the caller's sink when the
/// origin answered gzip but the caller cannot take it.
pub struct InflatingFetch {
    base: FetchSink,
    decoder: Option<GzDecoder<Vec<u8>>>,
    on_demand: bool,
    failed: bool,
}

impl InflatingFetch {
    pub fn new(base: FetchSink) -> Self {
        Self {
            base,
            decoder: Some(GzDecoder::new(Vec::new())),
            on_demand: false,
            failed: false,
        }
    }

    /// Decides at headers time: inflates only a gzipped response to a caller
    /// that did not ask for gzip, otherwise passes bytes through.
    pub fn on_demand(base: FetchSink) -> Self {
        Self {
            base,
            decoder: None,
            on_demand: true,
            failed: false,
        }
    }

    fn forward_decoded(&mut self) -> bool {
        let out = match self.decoder.as_mut() {
            Some(d) => std::mem::take(d.get_mut()),
            None => return true,
        };
        out.is_empty() || self.base.write(&out)
    }
}

impl AsyncFetch for InflatingFetch {
    delegate_state!(base);

    fn handle_headers_complete(&mut self) {
        if self.on_demand
            && self.base.response_headers().is_gzipped()
            && !self.base.request_headers().accepts_gzip()
        {
            self.decoder = Some(GzDecoder::new(Vec::new()));
        }
        if self.decoder.is_none() {
            self.base.headers_complete();
            return;
        }
        let headers = self.base.response_headers_mut();
        headers.remove_value(names::CONTENT_ENCODING, "gzip");
        headers.remove_all(names::CONTENT_LENGTH);
        self.base.set_content_length(ContentLength::UNKNOWN);
        self.base.headers_complete();
    }

    fn handle_write(&mut self, chunk: &[u8]) -> bool {
        if self.failed {
            return false;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return self.base.write(chunk);
        };
        if let Err(e) = decoder.write_all(chunk) {
            debug!(component = "upstream", event = "inflate_failed", error = %e);
            self.failed = true;
            return false;
        }
        self.forward_decoded()
    }

    fn handle_flush(&mut self) -> bool {
        if self.failed {
            return false;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return self.base.flush();
        };
        if decoder.flush().is_err() {
            self.failed = true;
            return false;
        }
        self.forward_decoded() && self.base.flush()
    }

    fn handle_done(self: Box<Self>, success: bool) {
        let mut this = *self;
        let mut ok = success && !this.failed;
        if ok {
            if let Some(decoder) = this.decoder.as_mut() {
                ok = decoder.try_finish().is_ok() && this.forward_decoded();
            }
        }
        this.base.done(ok);
    }

    fn is_cached_result_valid(&self, headers: &ResponseHeaders) -> bool {
        self.base.is_cached_result_valid(headers)
    }

    fn is_background_fetch(&self) -> bool {
        self.base.is_background_fetch()
    }

    fn is_alive(&self) -> bool {
        self.base.is_alive()
    }
}
