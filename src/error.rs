use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Result alias used across the proxy pipeline
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Origin fetch failures
#[derive(Error, Debug)]
pub enum FetchError {
    /// Origin answered with a non-2xx status
    #[error("HTTP error {status}: {status_text}. URL: {url}. Body: {body}")]
    Status {
        url: String,
        status: u16,
        status_text: String,
        /// Leading part of the error body, kept for diagnostics
        body: String,
    },

    /// Connection, TLS, redirect or body read failure
    #[error("request to {url} failed: {}", source_chain(.source))]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// `err` followed by every underlying cause, joined with `": "`.
///
/// reqwest's own message stops at "error sending request"; the cause
/// (DNS, refused connection, TLS) sits further down the chain.
pub fn source_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        cause = inner.source();
    }
    message
}

/// Errors surfaced by the proxy to its HTTP caller
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The request path did not carry a decodable absolute target URL
    #[error("Invalid proxy request: {0}. Path must be /proxy/<encoded URL>")]
    MalformedProxyPath(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Master playlists referenced each other deeper than allowed
    #[error("Master playlist recursion exceeded {limit} levels at {url}")]
    RecursionLimit { limit: usize, url: String },

    #[error("Processing error: {0}")]
    Processing(String),
}

impl ProxyError {
    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MalformedProxyPath(_) => StatusCode::BAD_REQUEST,
            ProxyError::Fetch(_)
            | ProxyError::RecursionLimit { .. }
            | ProxyError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ProxyError::MalformedProxyPath(_) => self.to_string(),
            _ => {
                error!("Proxy request failed: {}", self);
                format!("Proxy processing error: {}", self)
            }
        };

        (status, message).into_response()
    }
}
