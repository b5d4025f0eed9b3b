//! Minimal HTTP/1.1 server for integration tests: HEAD, plain GET and
//! `Range: bytes=a-b` GET over one static body.
//!
//! Every path serves the same body except `/missing`, which is a 404.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// If false, HEAD returns 405.
    pub head_allowed: bool,
    /// If false, GET ignores Range and returns 200 with the full body.
    pub support_ranges: bool,
    /// Ranged GETs starting at this offset always answer 500.
    pub fail_range_at: Option<u64>,
    /// Sent as `Content-Disposition` when set.
    pub content_disposition: Option<&'static str>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            fail_range_at: None,
            content_disposition: None,
        }
    }
}

/// One request the server saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub method: String,
    pub path: String,
    pub range: Option<(u64, u64)>,
}

pub struct RangeServer {
    pub base_url: String,
    hits: Arc<Mutex<Vec<Hit>>>,
}

impl RangeServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }

    /// Ranged GETs that started at `offset`.
    pub fn range_hits_at(&self, offset: u64) -> usize {
        self.hits()
            .iter()
            .filter(|h| h.method == "GET" && h.range.map(|r| r.0) == Some(offset))
            .count()
    }

    /// GETs without a Range header.
    pub fn plain_gets(&self) -> usize {
        self.hits()
            .iter()
            .filter(|h| h.method == "GET" && h.range.is_none())
            .count()
    }
}

pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, ServerOptions::default())
}

/// Serve `body` from a background thread until the process exits.
pub fn start_with_options(body: Vec<u8>, opts: ServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let hits = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&hits);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let seen = Arc::clone(&seen);
            thread::spawn(move || handle(stream, &body, opts, &seen));
        }
    });
    RangeServer {
        base_url: format!("http://127.0.0.1:{}/", port),
        hits,
    }
}

fn handle(mut stream: TcpStream, body: &[u8], opts: ServerOptions, hits: &Mutex<Vec<Hit>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(10)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let hit = parse_request(request);
    hits.lock().unwrap().push(hit.clone());

    let total = body.len() as u64;
    let disposition = opts
        .content_disposition
        .map(|d| format!("Content-Disposition: {}\r\n", d))
        .unwrap_or_default();
    let accept_ranges = if opts.support_ranges {
        "Accept-Ranges: bytes\r\n"
    } else {
        ""
    };

    if hit.path == "/missing" {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    match hit.method.as_str() {
        "HEAD" if !opts.head_allowed => {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        }
        "HEAD" => {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}{}\r\n",
                total, accept_ranges, disposition
            );
            let _ = stream.write_all(response.as_bytes());
        }
        "GET" => {
            let ranged = hit.range.filter(|_| opts.support_ranges);
            if let (Some((start, _)), Some(bad)) = (ranged, opts.fail_range_at) {
                if start == bad {
                    let _ = stream.write_all(
                        b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n",
                    );
                    return;
                }
            }
            let (status, content_range, slice) = match ranged {
                Some((start, end_incl)) => {
                    let end_incl = end_incl.min(total.saturating_sub(1));
                    if start > end_incl {
                        (
                            "416 Range Not Satisfiable",
                            Some(format!("bytes */{}", total)),
                            &body[0..0],
                        )
                    } else {
                        (
                            "206 Partial Content",
                            Some(format!("bytes {}-{}/{}", start, end_incl, total)),
                            &body[start as usize..=end_incl as usize],
                        )
                    }
                }
                None => ("200 OK", None, body),
            };
            let content_range = content_range
                .map(|v| format!("Content-Range: {}\r\n", v))
                .unwrap_or_default();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}{}{}\r\n",
                status,
                slice.len(),
                content_range,
                accept_ranges,
                disposition
            );
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.write_all(slice);
        }
        _ => {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        }
    }
}

fn parse_request(request: &str) -> Hit {
    let mut lines = request.lines();
    let mut first = lines.next().unwrap_or("").split_whitespace();
    let method = first.next().unwrap_or("").to_ascii_uppercase();
    let path = first.next().unwrap_or("/").to_string();
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("range") {
            continue;
        }
        let value = value.trim();
        if let Some(bounds) = value.strip_prefix("bytes=") {
            if let Some((a, b)) = bounds.split_once('-') {
                let start = a.trim().parse::<u64>().unwrap_or(0);
                let end = b.trim().parse::<u64>().unwrap_or(u64::MAX);
                range = Some((start, end));
            }
        }
    }
    Hit {
        method,
        path,
        range,
    }
}
