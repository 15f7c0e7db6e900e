//! Media playlist rewriting.
//!
//! A line-oriented pass over the playlist body. Every segment, key and
//! initialization-section reference is resolved against the playlist's
//! directory and replaced by its proxy path, so the player only ever talks
//! to the proxy. Tags are never re-serialized: lines that need no rewrite
//! keep their original text.

use super::RewriteOptions;
use super::attributes::rewrite_quoted_uri;
use crate::{proxy_path, resolver};
use tracing::debug;

const DISCONTINUITY: &str = "#EXT-X-DISCONTINUITY";

/// Rewrite a media playlist fetched from `url`.
pub fn rewrite_media_playlist(url: &str, body: &str, options: &RewriteOptions) -> String {
    let base = resolver::base_of(url);
    let lines: Vec<&str> = body.split('\n').collect();
    let last = lines.len() - 1;
    let mut output: Vec<String> = Vec::with_capacity(lines.len());

    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.trim();

        if line.is_empty() {
            // Only a trailing blank line survives, keeping the final newline
            if idx == last {
                output.push(String::new());
            }
            continue;
        }

        if options.filter_discontinuity && line == DISCONTINUITY {
            debug!("Dropping discontinuity marker in {}", url);
            continue;
        }

        if line.starts_with("#EXT-X-KEY") || line.starts_with("#EXT-X-MAP") {
            output.push(rewrite_quoted_uri(line, |uri| {
                let absolute = resolver::resolve(&base, uri);
                debug!("Rewriting tag URI: '{}' -> '{}'", uri, absolute);
                proxy_path::encode(&absolute)
            }));
            continue;
        }

        if line.starts_with('#') {
            // #EXTINF and every other tag pass through untouched
            output.push(line.to_string());
            continue;
        }

        let absolute = resolver::resolve(&base, line);
        output.push(proxy_path::encode(&absolute));
    }

    output.join("\n")
}
