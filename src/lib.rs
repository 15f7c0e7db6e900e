//! hls-relay: an HLS playlist rewriting proxy.
//!
//! Playlists fetched through `/proxy/<encoded URL>` come back with every
//! segment, key and sub-playlist reference pointing at the proxy again.
//! Master playlists are collapsed into their highest-bandwidth variant.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod hls;
pub mod metrics;
pub mod proxy;
pub mod proxy_path;
pub mod resolver;
pub mod server;
