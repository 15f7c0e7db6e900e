//! Request orchestration: raw-tier lookup, origin fetch, classification and
//! playlist resolution for a single proxied target.

use crate::cache::{ProxyCache, RawEntry};
use crate::error::Result;
use crate::fetch::{ContentFetcher, FetchedResource};
use crate::hls::{PlaylistResolver, Resolved, RewriteOptions, is_playlist};
use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Content type used when a passthrough origin declared none
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Non-playlist content served as fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passthrough {
    pub body: Bytes,
    /// Origin response headers, names lowercased
    pub headers: BTreeMap<String, String>,
}

impl Passthrough {
    fn from_resource(resource: FetchedResource) -> Self {
        let mut headers = resource.headers;
        if resource.content_type.is_empty() {
            headers.insert(
                "content-type".to_string(),
                FALLBACK_CONTENT_TYPE.to_string(),
            );
        }
        Self {
            body: resource.body,
            headers,
        }
    }

    pub fn content_type(&self) -> &str {
        self.headers
            .get("content-type")
            .map(String::as_str)
            .unwrap_or(FALLBACK_CONTENT_TYPE)
    }
}

/// What the HTTP layer should send back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyOutcome {
    /// Rewritten playlist text
    Playlist(String),
    Passthrough(Passthrough),
}

impl ProxyOutcome {
    /// Label used for request metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyOutcome::Playlist(_) => "playlist",
            ProxyOutcome::Passthrough(_) => "passthrough",
        }
    }
}

/// The proxy pipeline, shared by every request.
#[derive(Clone)]
pub struct ProxyService {
    fetcher: ContentFetcher,
    cache: ProxyCache,
    options: RewriteOptions,
}

impl ProxyService {
    pub fn new(fetcher: ContentFetcher, cache: ProxyCache, options: RewriteOptions) -> Self {
        Self {
            fetcher,
            cache,
            options,
        }
    }

    pub fn cache(&self) -> &ProxyCache {
        &self.cache
    }

    /// Serve `target`, an absolute origin URL.
    ///
    /// `accept_language` is the caller's header and is forwarded on every
    /// origin fetch this request makes.
    pub async fn handle(&self, target: &str, accept_language: Option<&str>) -> Result<ProxyOutcome> {
        let resolver =
            PlaylistResolver::new(&self.fetcher, &self.cache, &self.options, accept_language);

        if let Some(entry) = self.cache.get_raw(target).await
            && !entry.body.is_empty()
        {
            debug!("Raw cache hit: {}", target);
            if is_playlist(entry.body.as_bytes(), entry.content_type()) {
                // Cached bytes are origin text; links are always rewritten afresh
                let resolved = resolver.resolve(target, &entry.body, 0).await?;
                return Ok(outcome_of(resolved));
            }
            return Ok(ProxyOutcome::Passthrough(Passthrough {
                body: Bytes::from(entry.body),
                headers: entry.headers,
            }));
        }

        info!("Fetching target: {}", target);
        let resource = self.fetcher.fetch(target, accept_language).await?;

        match resource.utf8_text() {
            Some(text) => self.cache.put_raw(
                target,
                &RawEntry {
                    body: text.to_string(),
                    headers: resource.headers.clone(),
                },
            ),
            None => debug!("Not caching binary body of {}", target),
        }

        if !is_playlist(&resource.body, &resource.content_type) {
            debug!(
                "Passing through {} (type: '{}')",
                target, resource.content_type
            );
            return Ok(ProxyOutcome::Passthrough(Passthrough::from_resource(
                resource,
            )));
        }

        let text = resource.text();
        let resolved = resolver.resolve(target, &text, 0).await?;
        Ok(outcome_of(resolved))
    }
}

fn outcome_of(resolved: Resolved) -> ProxyOutcome {
    match resolved {
        Resolved::Playlist(text) => ProxyOutcome::Playlist(text),
        Resolved::Passthrough(resource) => {
            ProxyOutcome::Passthrough(Passthrough::from_resource(resource))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KvStore, MemoryStore};
    use crate::error::ProxyError;
    use crate::fetch::DEFAULT_ACCEPT_LANGUAGE;
    use crate::proxy_path;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_with(store: MemoryStore) -> ProxyService {
        ProxyService::new(
            ContentFetcher::new(DEFAULT_ACCEPT_LANGUAGE).unwrap(),
            ProxyCache::new(Arc::new(store), Duration::from_secs(60)),
            RewriteOptions::default(),
        )
    }

    #[tokio::test]
    async fn media_playlist_is_rewritten_and_raw_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live/index.m3u8"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("#EXTM3U\n#EXTINF:4,\nseg0.ts\n", "application/vnd.apple.mpegurl"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let service = service_with(MemoryStore::new());
        let target = format!("{}/live/index.m3u8", server.uri());

        let ProxyOutcome::Playlist(out) = service.handle(&target, None).await.unwrap() else {
            panic!("expected playlist");
        };
        assert!(out.contains(&proxy_path::encode(&format!("{}/live/seg0.ts", server.uri()))));

        service.cache().flush().await;
        let raw = service.cache().get_raw(&target).await.unwrap();
        assert_eq!(raw.body, "#EXTM3U\n#EXTINF:4,\nseg0.ts\n");

        // Second request is rebuilt from the raw tier without touching the origin
        let ProxyOutcome::Playlist(again) = service.handle(&target, None).await.unwrap() else {
            panic!("expected playlist");
        };
        assert_eq!(out, again);
    }

    #[tokio::test]
    async fn hls_content_type_alone_routes_to_rewriter() {
        let server = MockServer::start().await;
        // No #EXTM3U line: only the declared type marks this as a playlist
        Mock::given(method("GET"))
            .and(path("/bare/list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("#EXTINF:4,\nseg0.ts\n", "application/vnd.apple.mpegurl"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let service = service_with(MemoryStore::new());
        let target = format!("{}/bare/list", server.uri());

        let ProxyOutcome::Playlist(out) = service.handle(&target, None).await.unwrap() else {
            panic!("expected playlist");
        };
        assert_eq!(
            out,
            format!(
                "#EXTINF:4,\n{}\n",
                proxy_path::encode(&format!("{}/bare/seg0.ts", server.uri()))
            )
        );

        // The raw-tier replay keys off the cached content-type as well
        service.cache().flush().await;
        let raw = service.cache().get_raw(&target).await.unwrap();
        assert_eq!(raw.content_type(), "application/vnd.apple.mpegurl");
        let ProxyOutcome::Playlist(again) = service.handle(&target, None).await.unwrap() else {
            panic!("expected playlist from raw tier");
        };
        assert_eq!(out, again);
    }

    #[tokio::test]
    async fn binary_segment_passes_through_uncached() {
        let server = MockServer::start().await;
        let segment = vec![0x47u8, 0x40, 0x11, 0xff, 0xfe, 0x00];
        Mock::given(method("GET"))
            .and(path("/seg0.ts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "video/mp2t")
                    .set_body_bytes(segment.clone()),
            )
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let service = service_with(store.clone());
        let target = format!("{}/seg0.ts", server.uri());

        let ProxyOutcome::Passthrough(pass) = service.handle(&target, None).await.unwrap() else {
            panic!("expected passthrough");
        };
        assert_eq!(pass.body.as_ref(), segment.as_slice());
        assert_eq!(pass.content_type(), "video/mp2t");

        service.cache().flush().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn raw_hit_for_non_playlist_replays_cached_headers() {
        let store = MemoryStore::new();
        let entry = RawEntry {
            body: "WEBVTT\n".to_string(),
            headers: BTreeMap::from([("content-type".to_string(), "text/vtt".to_string())]),
        };
        store
            .put(
                "raw:https://cdn.example.com/subs.vtt",
                serde_json::to_string(&entry).unwrap(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let service = service_with(store);
        let outcome = service
            .handle("https://cdn.example.com/subs.vtt", None)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ProxyOutcome::Passthrough(Passthrough {
                body: Bytes::from_static(b"WEBVTT\n"),
                headers: entry.headers,
            })
        );
    }

    #[tokio::test]
    async fn empty_raw_entry_is_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n"))
            .expect(1)
            .mount(&server)
            .await;

        let target = format!("{}/empty.m3u8", server.uri());
        let store = MemoryStore::new();
        store
            .put(
                &format!("raw:{target}"),
                r#"{"body":"","headers":{}}"#.to_string(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let service = service_with(store);
        assert!(matches!(
            service.handle(&target, None).await.unwrap(),
            ProxyOutcome::Playlist(_)
        ));
    }

    #[tokio::test]
    async fn variant_without_content_type_gets_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/master.m3u8"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nblob.bin\n"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/blob.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let service = service_with(MemoryStore::new());
        let outcome = service
            .handle(&format!("{}/master.m3u8", server.uri()), None)
            .await
            .unwrap();

        let ProxyOutcome::Passthrough(pass) = outcome else {
            panic!("expected passthrough");
        };
        assert_eq!(pass.content_type(), FALLBACK_CONTENT_TYPE);
        assert_eq!(pass.body.as_ref(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn origin_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let service = service_with(MemoryStore::new());
        let err = service
            .handle(&format!("{}/missing.m3u8", server.uri()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Fetch(_)));
    }
}
