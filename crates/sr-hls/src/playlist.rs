//! Playlist parsing.
//!
//! Only master playlists are parsed into structure; media playlists are
//! rewritten line by line in [`crate::rewrite`].

use url::Url;

/// Tag that introduces a variant stream in a master playlist.
pub const STREAM_INF: &str = "#EXT-X-STREAM-INF";

/// Whether the playlist text is a master playlist.
pub fn is_master(text: &str) -> bool {
    text.lines()
        .any(|line| line.trim_start().starts_with(STREAM_INF))
}

/// One variant stream of a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// The `#EXT-X-STREAM-INF:` line as written upstream.
    pub info_line: String,
    /// Tag lines between the info line and the URI.
    pub extra_tags: Vec<String>,
    /// The variant URI resolved against the playlist URL.
    pub uri: Url,
    /// Peak bandwidth in bits per second.
    pub bandwidth: Option<u64>,
    /// Lower-cased `CODECS` attribute.
    pub codecs: Option<String>,
}

impl Variant {
    fn from_info_line(info_line: String, extra_tags: Vec<String>, uri: Url) -> Self {
        let mut bandwidth = None;
        let mut codecs = None;

        for (key, value) in parse_attributes(attribute_list(&info_line)) {
            if key.eq_ignore_ascii_case("BANDWIDTH") {
                bandwidth = value.trim().parse().ok();
            } else if key.eq_ignore_ascii_case("CODECS") {
                codecs = Some(value.to_ascii_lowercase());
            }
        }

        Self {
            info_line,
            extra_tags,
            uri,
            bandwidth,
            codecs,
        }
    }

    /// Whether the codec string contains any of the given tokens.
    pub fn matches_any_codec(&self, tokens: &[String]) -> bool {
        match self.codecs {
            Some(ref codecs) => tokens.iter().any(|t| codecs.contains(t.as_str())),
            None => false,
        }
    }
}

/// A master playlist split into its header lines and variants.
#[derive(Debug, Clone, Default)]
pub struct MasterPlaylist {
    /// Lines outside any stream block, in original order.
    pub header: Vec<String>,
    pub variants: Vec<Variant>,
}

impl MasterPlaylist {
    /// Parse `text`, resolving variant URIs against `base`.
    ///
    /// A variant whose URI cannot be resolved is dropped. A stream-info tag
    /// that is never followed by a URI is discarded together with its tags.
    pub fn parse(text: &str, base: &Url) -> Self {
        let mut playlist = Self::default();
        let mut pending: Option<(String, Vec<String>)> = None;

        for line in text.lines() {
            let trimmed = line.trim();

            if trimmed.starts_with(STREAM_INF) {
                if let Some((dangling, _)) = pending.take() {
                    tracing::debug!(line = %dangling, "Stream-info tag without URI");
                }
                pending = Some((trimmed.to_string(), Vec::new()));
                continue;
            }

            let Some((info_line, mut extra_tags)) = pending.take() else {
                playlist.header.push(line.to_string());
                continue;
            };

            if trimmed.is_empty() {
                pending = Some((info_line, extra_tags));
            } else if trimmed.starts_with('#') {
                extra_tags.push(trimmed.to_string());
                pending = Some((info_line, extra_tags));
            } else {
                match base.join(trimmed) {
                    Ok(uri) => playlist
                        .variants
                        .push(Variant::from_info_line(info_line, extra_tags, uri)),
                    Err(e) => {
                        tracing::warn!(uri = trimmed, error = %e, "Dropping unresolvable variant");
                    }
                }
            }
        }

        playlist
    }
}

/// The attribute list of a tag line: everything after the first `:`.
pub fn attribute_list(line: &str) -> &str {
    line.split_once(':').map(|(_, rest)| rest).unwrap_or("")
}

/// Parse an HLS attribute list (`KEY=VALUE,KEY="quoted, value"`).
///
/// Quoted values may contain commas; the quotes are removed from the
/// returned value.
pub fn parse_attributes(list: &str) -> Vec<(String, String)> {
    let mut attributes = Vec::new();
    let mut rest = list;

    loop {
        rest = rest.trim_start_matches([' ', ',']);
        if rest.is_empty() {
            break;
        }

        let Some(eq) = rest.find('=') else {
            break;
        };
        let key = rest[..eq].trim().to_string();
        rest = &rest[eq + 1..];

        let value;
        if let Some(quoted) = rest.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => {
                    value = quoted[..end].to_string();
                    rest = &quoted[end + 1..];
                }
                None => {
                    value = quoted.to_string();
                    rest = "";
                }
            }
            rest = rest.find(',').map_or("", |comma| &rest[comma + 1..]);
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].trim().to_string();
            rest = &rest[end..];
        }

        attributes.push((key, value));
    }

    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U\n\
#EXT-X-VERSION:3\n\
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360,CODECS=\"avc1.4d401e,mp4a.40.2\"\n\
low/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=2000000,CODECS=\"HVC1.1.6.L93.B0,mp4a.40.2\"\n\
#EXT-X-PROGRAM-DATE-TIME:2024-01-01T00:00:00Z\n\
\n\
https://other.example.com/high/index.m3u8\n";

    fn base() -> Url {
        Url::parse("http://example.com/live/master.m3u8").unwrap()
    }

    #[test]
    fn detects_master() {
        assert!(is_master(MASTER));
        assert!(!is_master("#EXTM3U\n#EXTINF:4,\nseg1.ts\n"));
        assert!(!is_master("#EXTM3U\n#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=1,URI=\"i.m3u8\"\n"));
    }

    #[test]
    fn parses_variants_in_order() {
        let master = MasterPlaylist::parse(MASTER, &base());
        assert_eq!(master.header, vec!["#EXTM3U", "#EXT-X-VERSION:3"]);
        assert_eq!(master.variants.len(), 2);

        let low = &master.variants[0];
        assert_eq!(low.uri.as_str(), "http://example.com/live/low/index.m3u8");
        assert_eq!(low.bandwidth, Some(800_000));
        assert_eq!(low.codecs.as_deref(), Some("avc1.4d401e,mp4a.40.2"));
        assert!(low.extra_tags.is_empty());

        let high = &master.variants[1];
        assert_eq!(high.uri.as_str(), "https://other.example.com/high/index.m3u8");
        assert_eq!(high.bandwidth, Some(2_000_000));
        assert_eq!(high.codecs.as_deref(), Some("hvc1.1.6.l93.b0,mp4a.40.2"));
        assert_eq!(high.extra_tags, vec!["#EXT-X-PROGRAM-DATE-TIME:2024-01-01T00:00:00Z"]);
    }

    #[test]
    fn quoted_commas_do_not_split_attributes() {
        let attrs = parse_attributes(
            "CODECS=\"avc1.64001f,mp4a.40.2\",BANDWIDTH=1280000,NAME=\"a, b\",AUDIO=\"aud\"",
        );
        assert_eq!(
            attrs,
            vec![
                ("CODECS".to_string(), "avc1.64001f,mp4a.40.2".to_string()),
                ("BANDWIDTH".to_string(), "1280000".to_string()),
                ("NAME".to_string(), "a, b".to_string()),
                ("AUDIO".to_string(), "aud".to_string()),
            ]
        );
    }

    #[test]
    fn missing_bandwidth_and_codecs() {
        let text = "#EXTM3U\n#EXT-X-STREAM-INF:RESOLUTION=1280x720\nhd.m3u8\n";
        let master = MasterPlaylist::parse(text, &base());
        assert_eq!(master.variants[0].bandwidth, None);
        assert_eq!(master.variants[0].codecs, None);
        assert!(!master.variants[0].matches_any_codec(&["avc1".to_string()]));
    }

    #[test]
    fn dangling_stream_inf_is_dropped() {
        let text = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\n#EXT-X-STREAM-INF:BANDWIDTH=2\nb.m3u8\n";
        let master = MasterPlaylist::parse(text, &base());
        assert_eq!(master.variants.len(), 1);
        assert_eq!(master.variants[0].bandwidth, Some(2));
    }

    #[test]
    fn crlf_line_endings() {
        let text = "#EXTM3U\r\n#EXT-X-STREAM-INF:BANDWIDTH=5\r\nv.m3u8\r\n";
        let master = MasterPlaylist::parse(text, &base());
        assert_eq!(master.variants[0].uri.as_str(), "http://example.com/live/v.m3u8");
    }
}
