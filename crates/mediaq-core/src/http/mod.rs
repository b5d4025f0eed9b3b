//! HTTP(S) implementation of `RangeFetcher` on libcurl.
//!
//! Resolve probes the URL (HEAD, falling back to a one-byte ranged GET) for
//! `Content-Length`, `Accept-Ranges: bytes` and a Content-Disposition filename.
//! Chunk fetches are `Range` GETs that must come back as 206 with the exact
//! length; the sequential path is a plain GET streamed into a channel.

mod parse;
mod request;

pub use parse::HeadInfo;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::naming;
use crate::retry::FetchError;
use crate::transfer::{RangeFetcher, SourceHandle, TransferTarget};

/// libcurl options shared by every request of one fetcher.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    /// Bytes per second below which a transfer counts as stalled.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    /// Hard cap on one request.
    pub timeout: Duration,
    pub user_agent: String,
    /// Extra request headers (e.g. cookies, referer).
    pub headers: Vec<(String, String)>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            timeout: Duration::from_secs(3600),
            user_agent: format!("mediaq/{}", env!("CARGO_PKG_VERSION")),
            headers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpRangeFetcher {
    settings: Arc<HttpSettings>,
}

impl HttpRangeFetcher {
    pub fn new(settings: HttpSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }
}

fn check_url(source: &SourceHandle) -> Result<url::Url, FetchError> {
    let parsed = url::Url::parse(source.as_str())
        .map_err(|e| FetchError::Unreachable(format!("invalid URL {}: {}", source, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::Unreachable(format!(
            "unsupported scheme {:?} in {}",
            other, source
        ))),
    }
}

/// Run a blocking curl call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, FetchError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, FetchError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FetchError::Other(format!("http worker: {}", e)))?
}

#[async_trait]
impl RangeFetcher for HttpRangeFetcher {
    async fn resolve(&self, source: &SourceHandle) -> Result<TransferTarget, FetchError> {
        let url = check_url(source)?;
        let settings = Arc::clone(&self.settings);
        let info = blocking(move || request::probe(url.as_str(), &settings)).await?;
        tracing::debug!(
            %source,
            size = ?info.content_length,
            ranges = info.accept_ranges,
            "probed"
        );
        let mut target = TransferTarget::new(
            source.clone(),
            info.content_length,
            info.accept_ranges,
        );
        target.name_hint = info
            .content_disposition
            .as_deref()
            .and_then(naming::parse_content_disposition_filename);
        Ok(target)
    }

    async fn fetch(
        &self,
        target: &TransferTarget,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, FetchError> {
        let url = target.source.as_str().to_string();
        let settings = Arc::clone(&self.settings);
        blocking(move || request::fetch_range(&url, &settings, offset, length)).await
    }

    async fn stream(
        &self,
        target: &TransferTarget,
        sink: mpsc::Sender<Vec<u8>>,
    ) -> Result<u64, FetchError> {
        let url = target.source.as_str().to_string();
        let settings = Arc::clone(&self.settings);
        blocking(move || request::stream(&url, &settings, sink)).await
    }
}
