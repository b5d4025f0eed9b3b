//! Parse HTTP response header lines into `HeadInfo`.

/// Key headers of one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadInfo {
    /// Status code from the status line.
    pub status: Option<u32>,
    /// `Content-Length`, if present.
    pub content_length: Option<u64>,
    /// True if the server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
    /// Total size from `Content-Range: bytes a-b/TOTAL`.
    pub range_total: Option<u64>,
    /// Raw `Content-Disposition` value (filename hint).
    pub content_disposition: Option<String>,
}

/// Status code from a line like `HTTP/1.1 206 Partial Content`.
pub(crate) fn status_from_line(line: &str) -> Option<u32> {
    let rest = line.strip_prefix("HTTP/")?;
    rest.split_whitespace().nth(1)?.parse().ok()
}

/// Parse collected header lines. With redirects libcurl reports every
/// response; only the block after the last status line counts.
pub(crate) fn parse_headers(lines: &[String]) -> HeadInfo {
    let mut info = HeadInfo::default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(code) = status_from_line(line) {
            info = HeadInfo {
                status: Some(code),
                ..HeadInfo::default()
            };
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            info.content_length = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            info.accept_ranges = value.eq_ignore_ascii_case("bytes");
        } else if name.eq_ignore_ascii_case("content-range") {
            info.range_total = parse_content_range_total(value);
        } else if name.eq_ignore_ascii_case("content-disposition") {
            info.content_disposition = Some(value.to_string());
        }
    }

    info
}

/// `bytes 0-0/12345` → 12345. `*` (unknown total) yields None.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let rest = value.strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.split_once('/')?;
    total.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn content_length_and_ranges() {
        let r = parse_headers(&lines(&[
            "HTTP/1.1 200 OK",
            "Content-Length: 12345",
            "Accept-Ranges: bytes",
        ]));
        assert_eq!(r.status, Some(200));
        assert_eq!(r.content_length, Some(12345));
        assert!(r.accept_ranges);
    }

    #[test]
    fn no_ranges() {
        let r = parse_headers(&lines(&["Content-Length: 999", "Accept-Ranges: none"]));
        assert_eq!(r.content_length, Some(999));
        assert!(!r.accept_ranges);
    }

    #[test]
    fn content_range_total() {
        let r = parse_headers(&lines(&[
            "HTTP/1.1 206 Partial Content",
            "Content-Range: bytes 0-0/4096",
            "Content-Length: 1",
        ]));
        assert_eq!(r.status, Some(206));
        assert_eq!(r.range_total, Some(4096));
        assert_eq!(parse_content_range_total("bytes 0-0/*"), None);
    }

    #[test]
    fn redirect_headers_are_discarded() {
        let r = parse_headers(&lines(&[
            "HTTP/1.1 302 Found",
            "Content-Length: 0",
            "Location: https://cdn.example.com/clip.mp4",
            "",
            "HTTP/2 200",
            "content-length: 777",
            "content-disposition: attachment; filename=\"clip.mp4\"",
        ]));
        assert_eq!(r.status, Some(200));
        assert_eq!(r.content_length, Some(777));
        assert!(r.content_disposition.unwrap().contains("clip.mp4"));
    }

    #[test]
    fn status_line_forms() {
        assert_eq!(status_from_line("HTTP/1.1 404 Not Found"), Some(404));
        assert_eq!(status_from_line("HTTP/2 200"), Some(200));
        assert_eq!(status_from_line("Content-Length: 5"), None);
    }
}
