//! Master playlist resolution.
//!
//! A master playlist is collapsed into the rewritten media playlist of its
//! highest-bandwidth variant. Resolution recurses when a variant is itself
//! a master, bounded by [`RewriteOptions::max_recursion`].

use super::attributes::bandwidth;
use super::classify::{is_master, is_playlist};
use super::media::rewrite_media_playlist;
use super::RewriteOptions;
use crate::cache::ProxyCache;
use crate::error::{ProxyError, Result};
use crate::fetch::{ContentFetcher, FetchedResource};
use crate::resolver;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{debug, info};

const STREAM_INF: &str = "#EXT-X-STREAM-INF";

/// One `#EXT-X-STREAM-INF` entry of a master playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Declared `BANDWIDTH`, 0 when absent
    pub bandwidth: u64,
    /// URI exactly as written in the playlist
    pub uri: String,
}

/// The variant chosen for playback, resolved to an absolute URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedVariant {
    pub url: String,
    /// `None` when picked by the sub-playlist fallback scan
    pub bandwidth: Option<u64>,
}

/// Outcome of resolving a playlist
#[derive(Debug, Clone)]
pub enum Resolved {
    /// Fully rewritten media playlist
    Playlist(String),
    /// The selected variant was not a playlist; serve it verbatim
    Passthrough(FetchedResource),
}

/// Collect the stream declarations of a master playlist, in document order.
///
/// Each declaration takes the first following non-blank, non-comment line as
/// its URI; declarations without one are skipped.
pub fn parse_variants(body: &str) -> Vec<Variant> {
    let lines: Vec<&str> = body.split('\n').map(str::trim).collect();
    let mut variants = Vec::new();
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];
        if line.starts_with(STREAM_INF) {
            let uri_line = lines[idx + 1..]
                .iter()
                .position(|l| !l.is_empty() && !l.starts_with('#'))
                .map(|offset| idx + 1 + offset);

            if let Some(uri_idx) = uri_line {
                variants.push(Variant {
                    bandwidth: bandwidth(line),
                    uri: lines[uri_idx].to_string(),
                });
                idx = uri_idx;
            }
        }
        idx += 1;
    }

    variants
}

/// Pick the variant to serve from a master playlist at `url`.
///
/// Highest bandwidth wins and on equal bandwidth the later declaration wins.
/// Without any stream declaration, the first line that names a sub-playlist
/// (`.m3u8`, optionally followed by a query) is used instead.
pub fn select_variant(url: &str, body: &str) -> Option<SelectedVariant> {
    let base = resolver::base_of(url);

    let best = parse_variants(body)
        .into_iter()
        .fold(None::<Variant>, |best, candidate| match best {
            Some(current) if candidate.bandwidth < current.bandwidth => Some(current),
            _ => Some(candidate),
        });

    if let Some(variant) = best {
        return Some(SelectedVariant {
            url: resolver::resolve(&base, &variant.uri),
            bandwidth: Some(variant.bandwidth),
        });
    }

    debug!("No stream declarations in {}, looking for a sub-playlist reference", url);
    body.split('\n')
        .map(str::trim)
        .find(|line| {
            !line.is_empty()
                && !line.starts_with('#')
                && (line.ends_with(".m3u8") || line.contains("m3u8?"))
        })
        .map(|line| SelectedVariant {
            url: resolver::resolve(&base, line),
            bandwidth: None,
        })
}

/// Resolves playlists into their final rewritten form.
///
/// Holds only borrowed collaborators; one resolver is built per request.
pub struct PlaylistResolver<'a> {
    fetcher: &'a ContentFetcher,
    cache: &'a ProxyCache,
    options: &'a RewriteOptions,
    /// Caller's `Accept-Language`, forwarded on variant fetches
    accept_language: Option<&'a str>,
}

impl<'a> PlaylistResolver<'a> {
    pub fn new(
        fetcher: &'a ContentFetcher,
        cache: &'a ProxyCache,
        options: &'a RewriteOptions,
        accept_language: Option<&'a str>,
    ) -> Self {
        Self {
            fetcher,
            cache,
            options,
            accept_language,
        }
    }

    /// Classify the playlist `body` fetched from `url` and resolve it.
    ///
    /// `depth` counts master playlists already traversed; start at 0.
    pub fn resolve<'b>(
        &'b self,
        url: &'b str,
        body: &'b str,
        depth: usize,
    ) -> BoxFuture<'b, Result<Resolved>> {
        async move {
            if is_master(body) {
                debug!("Master playlist detected: {}", url);
                self.resolve_master(url, body, depth).await
            } else {
                debug!("Media playlist detected: {}", url);
                Ok(Resolved::Playlist(rewrite_media_playlist(
                    url,
                    body,
                    self.options,
                )))
            }
        }
        .boxed()
    }

    async fn resolve_master(&self, url: &str, body: &str, depth: usize) -> Result<Resolved> {
        if depth > self.options.max_recursion {
            return Err(ProxyError::RecursionLimit {
                limit: self.options.max_recursion,
                url: url.to_string(),
            });
        }

        let Some(selected) = select_variant(url, body) else {
            info!(
                "No usable variant in master playlist {}, rewriting it as a media playlist",
                url
            );
            return Ok(Resolved::Playlist(rewrite_media_playlist(
                url,
                body,
                self.options,
            )));
        };

        if let Some(cached) = self.cache.get_processed(&selected.url).await {
            debug!("Processed variant cache hit: {}", selected.url);
            return Ok(Resolved::Playlist(cached));
        }

        info!(
            "Selected variant (bandwidth: {}): {}",
            selected
                .bandwidth
                .map_or_else(|| "unknown".to_string(), |b| b.to_string()),
            selected.url
        );
        let variant = self
            .fetcher
            .fetch(&selected.url, self.accept_language)
            .await?;

        if !is_playlist(&variant.body, &variant.content_type) {
            info!(
                "Variant {} is not a playlist (type: '{}'), serving it directly",
                selected.url, variant.content_type
            );
            return Ok(Resolved::Passthrough(variant));
        }

        let text = variant.text();
        let resolved = self.resolve(&selected.url, &text, depth + 1).await?;

        if let Resolved::Playlist(ref rewritten) = resolved {
            self.cache.put_processed(&selected.url, rewritten.clone());
        }

        Ok(resolved)
    }
}
