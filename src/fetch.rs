//! Origin fetching with a rotating client identity.
//!
//! Every request is a single GET: no retry, no application-level timeout.
//! A failed fetch propagates immediately as a [`FetchError`].

use crate::error::FetchError;
use bytes::Bytes;
use rand::seq::SliceRandom;
use reqwest::{Client, header};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Browser identities the fetcher rotates through.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
];

/// Accept-Language sent when the caller supplied none.
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// Number of error-body characters kept in a [`FetchError::Status`].
const ERROR_BODY_LIMIT: usize = 150;

/// A fetched origin resource.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub body: Bytes,
    /// Declared `Content-Type`, empty when the origin sent none
    pub content_type: String,
    /// Full response header set with lowercased names
    pub headers: BTreeMap<String, String>,
}

impl FetchedResource {
    /// Body as text. Invalid UTF-8 is replaced, which is fine for playlists.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Body as text only when it is valid UTF-8.
    pub fn utf8_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// HTTP client wrapper used for all origin requests.
#[derive(Clone, Debug)]
pub struct ContentFetcher {
    client: Client,
    default_accept_language: Arc<str>,
}

impl ContentFetcher {
    /// Build a fetcher with a pooled client that follows redirects.
    pub fn new(default_accept_language: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self::with_client(client, default_accept_language))
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client, default_accept_language: &str) -> Self {
        Self {
            client,
            default_accept_language: Arc::from(default_accept_language),
        }
    }

    /// GET `url` and return its body, content type and headers.
    ///
    /// `accept_language` is the caller's header, forwarded when present.
    ///
    /// # Errors
    ///
    /// [`FetchError::Status`] for non-2xx responses, [`FetchError::Transport`]
    /// for everything the client itself reports.
    pub async fn fetch(
        &self,
        url: &str,
        accept_language: Option<&str>,
    ) -> Result<FetchedResource, FetchError> {
        let referer = referer_for(url);
        let accept_language = accept_language
            .filter(|v| !v.is_empty())
            .unwrap_or(&*self.default_accept_language);

        debug!("Fetching origin: {}", url);

        let mut request = self
            .client
            .get(url)
            .header(header::USER_AGENT, random_user_agent())
            .header(header::ACCEPT, "*/*")
            .header(header::ACCEPT_LANGUAGE, accept_language);
        if let Some(referer) = referer {
            request = request.header(header::REFERER, referer);
        }

        let response = request.send().await.map_err(|source| {
            warn!("HTTP fetch failed for {}: {}", url, source);
            FetchError::Transport {
                url: url.to_string(),
                source,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            // Best effort: an unreadable error body is reported as empty
            let body = response.text().await.unwrap_or_default();
            warn!("HTTP fetch returned {} for {}", status, url);
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let content_type = headers.get("content-type").cloned().unwrap_or_default();

        let body = response.bytes().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        debug!(
            "Fetched {}: content-type='{}', {} bytes",
            url,
            content_type,
            body.len()
        );

        Ok(FetchedResource {
            body,
            content_type,
            headers,
        })
    }
}

/// Pick a User-Agent from the fixed pool.
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Origin of `url` used as the `Referer` header.
fn referer_for(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .map(|u| u.origin().ascii_serialization())
        .filter(|origin| origin != "null")
}
