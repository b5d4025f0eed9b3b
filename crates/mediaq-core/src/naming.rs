//! Local file names for jobs: from a Content-Disposition filename or the
//! last URL path segment, sanitized for Linux filesystems.

/// Used when neither the remote nor the URL suggests anything usable.
pub const DEFAULT_NAME: &str = "media";

/// Pick a safe file name for a download of `url`.
///
/// `hint` (usually the Content-Disposition filename) wins over the URL path.
pub fn file_name_for(url: &str, hint: Option<&str>) -> String {
    let candidate = hint
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .or_else(|| name_from_url_path(url));

    let sanitized = candidate.map(|c| sanitize(&c)).unwrap_or_default();
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_NAME.to_string()
    } else {
        sanitized
    }
}

/// Last non-empty path segment of `url`, percent-decoded.
pub fn name_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = percent_decode(segment);
    if decoded == "." || decoded == ".." {
        return None;
    }
    Some(decoded)
}

/// Filename from a raw Content-Disposition value. `filename*=UTF-8''…`
/// takes precedence over `filename=`.
pub fn parse_content_disposition_filename(header_value: &str) -> Option<String> {
    let mut plain: Option<String> = None;

    for param in header_value.trim().split(';') {
        let Some((name, v)) = param.trim().split_once('=') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let v = v.trim();

        if name == "filename*" {
            let lower = v.to_ascii_lowercase();
            if lower.starts_with("utf-8''") {
                let decoded = percent_decode(&v["utf-8''".len()..]);
                if !decoded.is_empty() {
                    return Some(decoded);
                }
            }
        } else if name == "filename" {
            let unquoted = if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
                unescape_quoted(&v[1..v.len() - 1])
            } else {
                v.to_string()
            };
            if !unquoted.is_empty() {
                plain = Some(unquoted);
            }
        }
    }

    plain
}

/// Replace path separators, NUL and control characters; trim dots, spaces
/// and underscores at the ends; cap at 255 bytes.
pub fn sanitize(name: &str) -> String {
    const NAME_MAX: usize = 255;

    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;
    for c in name.chars() {
        let c = if c == '/' || c == '\\' || c.is_control() || c.is_whitespace() {
            '_'
        } else {
            c
        };
        if c == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut take = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}

fn unescape_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '"' || next == '\\' {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

fn percent_decode(input: &str) -> String {
    fn hex(b: u8) -> Option<u8> {
        (b as char).to_digit(16).map(|d| d as u8)
    }

    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_from_url() {
        assert_eq!(
            file_name_for("https://cdn.example.com/v/clip.mp4?sig=abc", None),
            "clip.mp4"
        );
        assert_eq!(
            file_name_for("https://example.com/my%20video.webm", None),
            "my_video.webm"
        );
    }

    #[test]
    fn hint_overrides_url() {
        assert_eq!(
            file_name_for("https://example.com/watch", Some("Real Title.mkv")),
            "Real_Title.mkv"
        );
    }

    #[test]
    fn falls_back_to_default() {
        assert_eq!(file_name_for("https://example.com/", None), DEFAULT_NAME);
        assert_eq!(file_name_for("https://example.com/..", None), DEFAULT_NAME);
        assert_eq!(file_name_for("garbage", None), DEFAULT_NAME);
    }

    #[test]
    fn content_disposition_forms() {
        assert_eq!(
            parse_content_disposition_filename("attachment; filename=\"report.mp4\"").as_deref(),
            Some("report.mp4")
        );
        assert_eq!(
            parse_content_disposition_filename("attachment; filename=plain.mov").as_deref(),
            Some("plain.mov")
        );
        assert_eq!(
            parse_content_disposition_filename(
                "attachment; filename=\"fallback.bin\"; filename*=UTF-8''caf%C3%A9.mp4"
            )
            .as_deref(),
            Some("café.mp4")
        );
        assert_eq!(parse_content_disposition_filename("inline"), None);
    }

    #[test]
    fn sanitize_strips_separators_and_dots() {
        assert_eq!(sanitize("a/b\\c.mp4"), "a_b_c.mp4");
        assert_eq!(sanitize("  ..clip.mp4.. "), "clip.mp4");
        assert_eq!(sanitize("x\x00y"), "x_y");
        assert_eq!(sanitize(&"a".repeat(300)).len(), 255);
    }
}
