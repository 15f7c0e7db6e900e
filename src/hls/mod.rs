//! HLS playlist handling: detection, media rewriting, master resolution.

pub mod attributes;
pub mod classify;
pub mod master;
pub mod media;

pub use classify::{Classification, HLS_CONTENT_TYPE, classify, is_master, is_playlist};
pub use master::{PlaylistResolver, Resolved, SelectedVariant, Variant, parse_variants, select_variant};
pub use media::rewrite_media_playlist;

/// Default bound on nested master playlist resolution
pub const DEFAULT_MAX_RECURSION: usize = 5;

/// Knobs for playlist rewriting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Drop `#EXT-X-DISCONTINUITY` lines from media playlists
    pub filter_discontinuity: bool,
    /// Deepest master-to-master hop allowed before giving up
    pub max_recursion: usize,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            filter_discontinuity: true,
            max_recursion: DEFAULT_MAX_RECURSION,
        }
    }
}
