//! Playlist detection.

use url::Url;

/// Content type emitted for every rewritten playlist.
pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Whether an upstream response should be treated as an HLS playlist.
///
/// True when the target path ends in `.m3u8` (any case) or the content type
/// mentions `mpegurl` or `m3u8`.
pub fn is_playlist(target: &Url, content_type: Option<&str>) -> bool {
    if target.path().to_ascii_lowercase().ends_with(".m3u8") {
        return true;
    }

    content_type
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("mpegurl") || ct.contains("m3u8")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn suffix_match_is_case_insensitive() {
        assert!(is_playlist(&url("http://example.com/live/index.m3u8"), None));
        assert!(is_playlist(&url("http://example.com/live/INDEX.M3U8"), None));
    }

    #[test]
    fn query_string_does_not_count_as_suffix() {
        assert!(is_playlist(&url("http://example.com/a.m3u8?token=1"), None));
        assert!(!is_playlist(&url("http://example.com/seg.ts?x=a.m3u8"), None));
    }

    #[test]
    fn content_type_match() {
        let u = url("http://example.com/playlist");
        assert!(is_playlist(&u, Some("application/vnd.apple.mpegurl")));
        assert!(is_playlist(&u, Some("audio/x-mpegURL; charset=utf-8")));
        assert!(is_playlist(&u, Some("application/m3u8")));
        assert!(!is_playlist(&u, Some("video/mp2t")));
        assert!(!is_playlist(&u, None));
    }
}
