//! Relative reference resolution against a playlist's location.

use crate::proxy_path::looks_absolute;
use tracing::debug;
use url::Url;

/// Directory part of `url`, always ending in `/`.
///
/// Query and fragment are dropped. An origin-only URL yields `origin/`.
pub fn base_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let path = parsed.path();
            let dir = match path.rfind('/') {
                Some(idx) => &path[..idx],
                None => "",
            };
            format!("{}{}/", parsed.origin().ascii_serialization(), dir)
        }
        Err(_) => {
            // Cut after the last slash, unless that slash belongs to "://"
            let scheme_end = url.find("://").map(|i| i + 2);
            match url.rfind('/') {
                Some(idx) if scheme_end.is_none_or(|end| idx > end) => url[..=idx].to_string(),
                _ => format!("{}/", url),
            }
        }
    }
}

/// Resolve `reference` against `base` into an absolute URL.
pub fn resolve(base: &str, reference: &str) -> String {
    if looks_absolute(reference) {
        return reference.to_string();
    }

    match Url::parse(base).and_then(|b| b.join(reference)) {
        Ok(joined) => joined.to_string(),
        Err(e) => {
            debug!(
                "URL resolution failed: base={}, reference={}, error={}",
                base, reference, e
            );
            if reference.starts_with('/') {
                format!("{}{}", origin_of(base), reference)
            } else {
                format!("{}{}", base, reference)
            }
        }
    }
}

/// `scheme://host[:port]` of `url`, or the text before the first path slash
/// when `url` does not parse.
fn origin_of(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        return parsed.origin().ascii_serialization();
    }
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(idx) => url[..after_scheme + idx].to_string(),
        None => url.trim_end_matches('/').to_string(),
    }
}
