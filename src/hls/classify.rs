//! Playlist detection.

/// Content type served for rewritten playlists
pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// MIME types origins use for HLS playlists (matched as substrings)
const PLAYLIST_MIME_TYPES: &[&str] = &[
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "audio/mpegurl",
];

/// First tag of every playlist
const PLAYLIST_MAGIC: &[u8] = b"#EXTM3U";

/// How a fetched body should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Lists variant streams or renditions
    Master,
    /// Lists segments
    Media,
    NotPlaylist,
}

/// True if `content_type` is a known HLS type or `body` starts with `#EXTM3U`
/// after leading whitespace.
pub fn is_playlist(body: &[u8], content_type: &str) -> bool {
    if !content_type.is_empty() {
        let content_type = content_type.to_ascii_lowercase();
        if PLAYLIST_MIME_TYPES
            .iter()
            .any(|mime| content_type.contains(mime))
        {
            return true;
        }
    }

    body.trim_ascii_start().starts_with(PLAYLIST_MAGIC)
}

/// True if the playlist declares variant streams or rendition groups.
pub fn is_master(body: &str) -> bool {
    body.contains("#EXT-X-STREAM-INF") || body.contains("#EXT-X-MEDIA:")
}

/// Classify a fetched body. Playlists that are not masters are media playlists.
pub fn classify(body: &[u8], content_type: &str) -> Classification {
    if !is_playlist(body, content_type) {
        return Classification::NotPlaylist;
    }
    if is_master(&String::from_utf8_lossy(body)) {
        Classification::Master
    } else {
        Classification::Media
    }
}
