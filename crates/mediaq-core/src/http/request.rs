//! Blocking libcurl requests: metadata probe, ranged GET, streamed GET.
//!
//! Everything here runs on the calling thread; the async fetcher moves each
//! call onto the blocking pool.

use std::cell::Cell;
use std::str;

use curl::easy::{Easy, List};
use tokio::sync::mpsc;

use crate::retry::FetchError;

use super::parse::{self, status_from_line, HeadInfo};
use super::HttpSettings;

/// Map a libcurl error onto the transport-agnostic fetch error.
pub(crate) fn from_curl(e: curl::Error) -> FetchError {
    if e.is_operation_timedout() {
        return FetchError::Timeout(e.to_string());
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return FetchError::Connection(e.to_string());
    }
    if e.is_url_malformed() || e.is_unsupported_protocol() {
        return FetchError::Unreachable(e.to_string());
    }
    FetchError::Other(e.to_string())
}

fn status_error(code: u32) -> FetchError {
    match code {
        404 | 410 => FetchError::Unreachable(format!("HTTP {}", code)),
        _ => FetchError::Http(code),
    }
}

fn is_success(code: u32) -> bool {
    (200..300).contains(&code)
}

fn easy_for(url: &str, settings: &HttpSettings) -> Result<Easy, FetchError> {
    let mut easy = Easy::new();
    easy.url(url).map_err(from_curl)?;
    easy.follow_location(true).map_err(from_curl)?;
    easy.max_redirections(10).map_err(from_curl)?;
    easy.useragent(&settings.user_agent).map_err(from_curl)?;
    easy.connect_timeout(settings.connect_timeout)
        .map_err(from_curl)?;
    // Abort when throughput stays below the limit for the window instead of
    // relying only on the wall-clock timeout.
    easy.low_speed_limit(settings.low_speed_limit)
        .map_err(from_curl)?;
    easy.low_speed_time(settings.low_speed_time)
        .map_err(from_curl)?;
    easy.timeout(settings.timeout).map_err(from_curl)?;

    if !settings.headers.is_empty() {
        let mut list = List::new();
        for (k, v) in &settings.headers {
            list.append(&format!("{}: {}", k.trim(), v.trim()))
                .map_err(from_curl)?;
        }
        easy.http_headers(list).map_err(from_curl)?;
    }
    Ok(easy)
}

/// Size and ranged-access support of `url`. Tries HEAD first; servers that
/// reject HEAD get a one-byte ranged GET instead.
pub(crate) fn probe(url: &str, settings: &HttpSettings) -> Result<HeadInfo, FetchError> {
    let head = head(url, settings)?;
    match head.status {
        Some(code) if is_success(code) => Ok(head),
        Some(code @ (404 | 410)) => Err(status_error(code)),
        status => {
            tracing::debug!(?status, "HEAD rejected, probing with ranged GET");
            range_probe(url, settings)
        }
    }
}

fn head(url: &str, settings: &HttpSettings) -> Result<HeadInfo, FetchError> {
    let mut lines: Vec<String> = Vec::new();
    let mut easy = easy_for(url, settings)?;
    easy.nobody(true).map_err(from_curl)?;
    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    lines.push(s.trim_end().to_string());
                }
                true
            })
            .map_err(from_curl)?;
        transfer.perform().map_err(from_curl)?;
    }
    let mut info = parse::parse_headers(&lines);
    if info.status.is_none() {
        info.status = easy.response_code().ok();
    }
    Ok(info)
}

fn range_probe(url: &str, settings: &HttpSettings) -> Result<HeadInfo, FetchError> {
    let mut lines: Vec<String> = Vec::new();
    let received = Cell::new(0usize);
    let mut easy = easy_for(url, settings)?;
    easy.range("0-0").map_err(from_curl)?;
    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    lines.push(s.trim_end().to_string());
                }
                true
            })
            .map_err(from_curl)?;
        transfer
            .write_function(|data| {
                received.set(received.get() + data.len());
                // A server that ignores Range would send the whole body.
                if received.get() > 1 {
                    return Ok(0);
                }
                Ok(data.len())
            })
            .map_err(from_curl)?;
        transfer.perform()
    };
    match performed {
        Ok(()) => {}
        Err(e) if e.is_write_error() => {}
        Err(e) => return Err(from_curl(e)),
    }

    let mut info = parse::parse_headers(&lines);
    match info.status {
        Some(206) => {
            info.content_length = info.range_total;
            info.accept_ranges = info.range_total.is_some();
            Ok(info)
        }
        Some(code) if is_success(code) => {
            info.accept_ranges = false;
            Ok(info)
        }
        Some(code) => Err(status_error(code)),
        None => Err(FetchError::Other("no response status".into())),
    }
}

/// GET `[offset, offset + length)`. Requires a 206 answer with exactly
/// `length` bytes.
pub(crate) fn fetch_range(
    url: &str,
    settings: &HttpSettings,
    offset: u64,
    length: u64,
) -> Result<Vec<u8>, FetchError> {
    let status = Cell::new(None::<u32>);
    let overflow = Cell::new(false);
    let mut body: Vec<u8> = Vec::with_capacity(length as usize);

    let mut easy = easy_for(url, settings)?;
    let range = format!("{}-{}", offset, (offset + length).saturating_sub(1));
    easy.range(&range).map_err(from_curl)?;
    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Some(code) = str::from_utf8(data).ok().and_then(status_from_line) {
                    status.set(Some(code));
                }
                true
            })
            .map_err(from_curl)?;
        transfer
            .write_function(|data| {
                if (body.len() + data.len()) as u64 > length {
                    overflow.set(true);
                    return Ok(0);
                }
                body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(from_curl)?;
        transfer.perform()
    };

    let code = status
        .get()
        .or_else(|| easy.response_code().ok())
        .unwrap_or(0);
    if let Err(e) = performed {
        if !(e.is_write_error() && overflow.get()) {
            return Err(from_curl(e));
        }
    }
    match code {
        206 => {}
        200 if offset == 0 && !overflow.get() => {}
        200 => return Err(FetchError::RangeUnsupported),
        code => return Err(status_error(code)),
    }
    if overflow.get() || body.len() as u64 != length {
        return Err(FetchError::ShortRead {
            expected: length,
            received: body.len() as u64,
        });
    }
    Ok(body)
}

/// GET the whole object, sending each received block to `sink`. Returns the
/// number of bytes sent.
pub(crate) fn stream(
    url: &str,
    settings: &HttpSettings,
    sink: mpsc::Sender<Vec<u8>>,
) -> Result<u64, FetchError> {
    let status = Cell::new(None::<u32>);
    let closed = Cell::new(false);
    let sent = Cell::new(0u64);

    let mut easy = easy_for(url, settings)?;
    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Some(code) = str::from_utf8(data).ok().and_then(status_from_line) {
                    status.set(Some(code));
                }
                true
            })
            .map_err(from_curl)?;
        transfer
            .write_function(|data| {
                // Error bodies are not part of the object.
                if !status.get().map_or(true, is_success) {
                    return Ok(data.len());
                }
                if sink.blocking_send(data.to_vec()).is_err() {
                    closed.set(true);
                    return Ok(0);
                }
                sent.set(sent.get() + data.len() as u64);
                Ok(data.len())
            })
            .map_err(from_curl)?;
        transfer.perform()
    };

    if closed.get() {
        return Err(FetchError::Other("stream receiver closed".into()));
    }
    performed.map_err(from_curl)?;
    let code = status
        .get()
        .or_else(|| easy.response_code().ok())
        .unwrap_or(0);
    if !is_success(code) {
        return Err(status_error(code));
    }
    Ok(sent.get())
}
