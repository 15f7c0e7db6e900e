//! Mapping between absolute origin URLs and proxy re-entry paths.
//!
//! A target URL travels inside a proxy path as one percent-encoded path
//! segment: `/proxy/https%3A%2F%2Fcdn.example.com%2Flive%2Fseg0.ts`.

use tracing::debug;
use url::Url;

/// Route prefix every proxy path starts with
pub const PROXY_PREFIX: &str = "/proxy/";

/// Encode an absolute URL into a proxy path.
pub fn encode(target: &str) -> String {
    format!("{}{}", PROXY_PREFIX, urlencoding::encode(target))
}

/// Recover the target URL from a proxy path.
///
/// Returns `None` when the path has no target, carries an invalid percent
/// escape, or the target is not an absolute `http(s)` URL. A path whose
/// remainder was never encoded (`/proxy/https://...`) is accepted when it
/// looks absolute.
pub fn decode(path: &str) -> Option<String> {
    decode_request(path, None)
}

/// Recover the target URL from a request's path and query string.
///
/// An encoded target already carries its own query inside the path, so the
/// request query is ignored. Only a target sent unencoded gets `query`
/// re-attached, since the client's `?` then belonged to the target.
pub fn decode_request(path: &str, query: Option<&str>) -> Option<String> {
    let encoded = path.strip_prefix(PROXY_PREFIX)?;
    if encoded.is_empty() {
        return None;
    }

    let decoded = match urlencoding::decode(encoded) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!("Invalid percent escape in proxy path {}: {}", encoded, e);
            return None;
        }
    };

    if looks_absolute(encoded) {
        debug!("Proxy path was not encoded but looks like a URL: {}", encoded);
        let mut target = if is_valid_http_url(&decoded) {
            decoded.into_owned()
        } else {
            encoded.to_string()
        };
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }
        return Some(target);
    }

    if is_valid_http_url(&decoded) {
        return Some(decoded.into_owned());
    }

    debug!("Invalid target URL in proxy path: {}", encoded);
    None
}

/// True for strings starting with `http://` or `https://`, any case.
pub fn looks_absolute(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn is_valid_http_url(s: &str) -> bool {
    looks_absolute(s) && Url::parse(s).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_produces_single_segment() {
        let path = encode("https://cdn.example.com/live/seg0.ts?token=a/b");
        assert!(path.starts_with("/proxy/"));
        let segment = &path[PROXY_PREFIX.len()..];
        assert!(!segment.contains('/'), "segment must not contain '/': {segment}");
        assert!(!segment.contains('?'));
    }

    #[test]
    fn round_trip_preserves_url() {
        let urls = [
            "https://cdn.example.com/live/index.m3u8",
            "http://cdn.example.com:8080/a/b/c.ts?x=1&y=%20z",
            "https://cdn.example.com/key?id=abc#frag",
            "https://例え.jp/パス/seg.ts",
        ];
        for u in urls {
            assert_eq!(decode(&encode(u)).as_deref(), Some(u), "round trip of {u}");
        }
    }

    #[test]
    fn decode_accepts_unencoded_absolute_url() {
        assert_eq!(
            decode("/proxy/https://cdn.example.com/live.m3u8").as_deref(),
            Some("https://cdn.example.com/live.m3u8")
        );
    }

    #[test]
    fn decode_rejects_empty_target() {
        assert_eq!(decode("/proxy/"), None);
    }

    #[test]
    fn decode_rejects_relative_target() {
        assert_eq!(decode("/proxy/live%2Findex.m3u8"), None);
        assert_eq!(decode("/proxy/ftp%3A%2F%2Fhost%2Ffile"), None);
    }

    #[test]
    fn decode_rejects_missing_prefix() {
        assert_eq!(decode("/other/https%3A%2F%2Fcdn.example.com%2Fa.ts"), None);
    }

    #[test]
    fn decode_rejects_invalid_escape() {
        // %FF is not valid UTF-8 once decoded
        assert_eq!(decode("/proxy/https://cdn.example.com/a%FF.ts"), None);
        assert_eq!(decode("/proxy/https%3A%2F%2Fcdn.example.com%2Fa%FF.ts"), None);
    }

    #[test]
    fn request_query_ignored_for_encoded_target() {
        let path = encode("https://cdn.example.com/a.m3u8?token=abc");
        assert_eq!(
            decode_request(&path, Some("_=123")).as_deref(),
            Some("https://cdn.example.com/a.m3u8?token=abc")
        );
    }

    #[test]
    fn request_query_kept_for_unencoded_target() {
        assert_eq!(
            decode_request("/proxy/https://cdn.example.com/a.m3u8", Some("token=abc")).as_deref(),
            Some("https://cdn.example.com/a.m3u8?token=abc")
        );
        assert_eq!(
            decode_request("/proxy/https://cdn.example.com/a.m3u8", Some("")).as_deref(),
            Some("https://cdn.example.com/a.m3u8")
        );
    }

    #[test]
    fn looks_absolute_is_case_insensitive() {
        assert!(looks_absolute("HTTPS://cdn.example.com"));
        assert!(looks_absolute("http://x"));
        assert!(!looks_absolute("//cdn.example.com/a.ts"));
        assert!(!looks_absolute("seg.ts"));
    }
}
