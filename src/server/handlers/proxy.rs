use crate::{
    error::ProxyError,
    hls::HLS_CONTENT_TYPE,
    metrics,
    proxy::{Passthrough, ProxyOutcome},
    proxy_path,
    server::state::AppState,
};
use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Origin headers never replayed to the client
const STRIPPED_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
    "content-encoding",
    "cache-control",
];

/// Serve `/proxy/<encoded target>` for GET, HEAD and POST.
///
/// The target is taken from the raw request path so percent-decoding
/// happens exactly once, in [`proxy_path::decode_request`].
pub async fn serve_proxy(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    let start = Instant::now();
    let Some(target) = proxy_path::decode_request(uri.path(), uri.query()) else {
        warn!("Malformed proxy path: {}", uri);
        metrics::record_request("malformed", 400);
        metrics::record_duration("malformed", start);
        return ProxyError::MalformedProxyPath(uri.path().to_string()).into_response();
    };

    let accept_language = headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok());

    info!("Proxy request for: {}", target);

    match state.proxy.handle(&target, accept_language).await {
        Ok(outcome) => {
            let kind = outcome.kind();
            metrics::record_request(kind, 200);
            metrics::record_duration(kind, start);

            let cache_control = format!("public, max-age={}", state.config.cache_ttl_secs);
            match outcome {
                ProxyOutcome::Playlist(text) => (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, HLS_CONTENT_TYPE),
                        (header::CACHE_CONTROL, cache_control.as_str()),
                    ],
                    text,
                )
                    .into_response(),
                ProxyOutcome::Passthrough(pass) => passthrough_response(pass, &cache_control),
            }
        }
        Err(e) => {
            if matches!(e, ProxyError::Fetch(_)) {
                metrics::record_origin_error();
            }
            metrics::record_request("error", e.status_code().as_u16());
            metrics::record_duration("error", start);
            e.into_response()
        }
    }
}

/// `OPTIONS` on any proxy path. CORS headers are added by the router layers.
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

fn passthrough_response(pass: Passthrough, cache_control: &str) -> Response {
    let mut response = (StatusCode::OK, Body::from(pass.body)).into_response();
    let out = response.headers_mut();

    for (name, value) in &pass.headers {
        if !is_forwardable(name) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                out.insert(name, value);
            }
            _ => debug!("Skipping unrepresentable origin header: {}", name),
        }
    }

    if let Ok(value) = HeaderValue::from_str(cache_control) {
        out.insert(header::CACHE_CONTROL, value);
    }

    response
}

fn is_forwardable(name: &str) -> bool {
    !STRIPPED_HEADERS.contains(&name) && !name.starts_with("access-control-")
}
