//! The `/proxy` query-parameter schema.
//!
//! Every rewritten URI is a self-referential proxy URL whose query string
//! carries the continuation state for the next fetch. Decoding
//! ([`ProxyParams::from_query`]) and encoding ([`proxy_url`]) both live here so
//! the handler and the rewriter always agree on the key set.

use sr_core::{Error, Result};
use url::{form_urlencoded, Url};

/// Path of the proxy endpoint that rewritten URIs point back to.
pub const PROXY_PATH: &str = "/proxy";

mod keys {
    pub const URL: &str = "url";
    pub const HOST: &str = "host";
    pub const INSPECT: &str = "inspect";
    pub const UA: &str = "ua";
    pub const REFERER: &str = "referer";
    pub const ORIGIN: &str = "origin";
    pub const CAP_KBPS: &str = "cap_kbps";
    pub const FORCE_LOWEST: &str = "force_lowest";
    pub const AVOID_CODECS: &str = "avoid_codecs";
    pub const PREFER_CODECS: &str = "prefer_codecs";
}

/// Parameters that survive every rewritten URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Propagated {
    /// User-agent alias (or a literal user-agent string).
    pub ua: Option<String>,
    pub referer: Option<String>,
    pub origin: Option<String>,
    /// Soft bandwidth cap in kilobits per second.
    pub cap_kbps: Option<u64>,
    /// Keep only the lowest-bandwidth variant.
    pub force_lowest: bool,
    /// Lower-cased codec tokens whose variants are dropped.
    pub avoid_codecs: Vec<String>,
    /// Lower-cased codec tokens whose variants are preferred.
    pub prefer_codecs: Vec<String>,
}

impl Propagated {
    fn append_to(&self, query: &mut form_urlencoded::Serializer<'_, String>) {
        if let Some(ref ua) = self.ua {
            query.append_pair(keys::UA, ua);
        }
        if let Some(ref referer) = self.referer {
            query.append_pair(keys::REFERER, referer);
        }
        if let Some(ref origin) = self.origin {
            query.append_pair(keys::ORIGIN, origin);
        }
        if let Some(cap) = self.cap_kbps {
            query.append_pair(keys::CAP_KBPS, &cap.to_string());
        }
        if self.force_lowest {
            query.append_pair(keys::FORCE_LOWEST, "1");
        }
        if !self.avoid_codecs.is_empty() {
            query.append_pair(keys::AVOID_CODECS, &self.avoid_codecs.join(","));
        }
        if !self.prefer_codecs.is_empty() {
            query.append_pair(keys::PREFER_CODECS, &self.prefer_codecs.join(","));
        }
    }

    /// Whether any ABR constraint is active.
    pub fn has_abr_constraints(&self) -> bool {
        self.force_lowest
            || self.cap_kbps.is_some()
            || !self.avoid_codecs.is_empty()
            || !self.prefer_codecs.is_empty()
    }
}

/// A decoded `/proxy` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyParams {
    /// Raw `url` parameter; validated by [`ProxyParams::target`].
    pub url: Option<String>,
    /// `Host` header override for the outbound request.
    pub host: Option<String>,
    /// Return a JSON diagnostic instead of proxying.
    pub inspect: bool,
    pub propagated: Propagated,
}

impl ProxyParams {
    /// Decode a raw (still percent-encoded) query string. Unknown keys are
    /// ignored; for repeated keys the last occurrence wins.
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let value = value.trim();
            match key.as_ref() {
                keys::URL => params.url = non_empty(value),
                keys::HOST => params.host = non_empty(value),
                keys::INSPECT => params.inspect = is_truthy(value),
                keys::UA => params.propagated.ua = non_empty(value),
                keys::REFERER => params.propagated.referer = non_empty(value),
                keys::ORIGIN => params.propagated.origin = non_empty(value),
                // Non-numeric caps are ignored rather than rejected.
                keys::CAP_KBPS => params.propagated.cap_kbps = value.parse().ok(),
                keys::FORCE_LOWEST => params.propagated.force_lowest = is_truthy(value),
                keys::AVOID_CODECS => params.propagated.avoid_codecs = codec_list(value),
                keys::PREFER_CODECS => params.propagated.prefer_codecs = codec_list(value),
                _ => {}
            }
        }

        params
    }

    /// Parse and validate the target URL.
    pub fn target(&self) -> Result<Url> {
        let raw = self
            .url
            .as_deref()
            .ok_or_else(|| Error::Validation("missing url parameter".into()))?;
        parse_target(raw)
    }
}

/// Parse an absolute http(s) URL supplied by a client.
pub fn parse_target(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::Validation(format!("invalid url '{raw}': {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::Validation(format!(
                "unsupported url scheme '{other}' (expected http or https)"
            )))
        }
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::Validation(format!("url '{raw}' has no host")));
    }

    Ok(url)
}

/// Build a proxy URL that fetches `target` with the given continuation state.
pub fn proxy_url(endpoint: &str, target: &Url, host: Option<&str>, params: &Propagated) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair(keys::URL, target.as_str());
    if let Some(host) = host {
        query.append_pair(keys::HOST, host);
    }
    params.append_to(&mut query);
    format!("{endpoint}?{}", query.finish())
}

/// `host[:port]` of a URL, with the port only when it is not the scheme default.
pub fn host_with_port(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Interpret a query flag such as `force_lowest=1`.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn codec_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_full_query() {
        let q = "url=http%3A%2F%2Fexample.com%2Flive%2Findex.m3u8&ua=chrome\
                 &referer=http%3A%2F%2Fsite.tv%2F&cap_kbps=1500&force_lowest=1\
                 &avoid_codecs=HEVC,%20av01&prefer_codecs=avc1&inspect=1&host=cdn.example.com";
        let p = ProxyParams::from_query(q);
        assert_eq!(p.url.as_deref(), Some("http://example.com/live/index.m3u8"));
        assert_eq!(p.host.as_deref(), Some("cdn.example.com"));
        assert!(p.inspect);
        assert_eq!(p.propagated.ua.as_deref(), Some("chrome"));
        assert_eq!(p.propagated.referer.as_deref(), Some("http://site.tv/"));
        assert_eq!(p.propagated.cap_kbps, Some(1500));
        assert!(p.propagated.force_lowest);
        assert_eq!(p.propagated.avoid_codecs, vec!["hevc", "av01"]);
        assert_eq!(p.propagated.prefer_codecs, vec!["avc1"]);
    }

    #[test]
    fn non_numeric_cap_is_ignored() {
        let p = ProxyParams::from_query("url=http://a/b&cap_kbps=fast");
        assert_eq!(p.propagated.cap_kbps, None);
        assert!(!p.propagated.has_abr_constraints());
    }

    #[test]
    fn missing_url_is_validation_error() {
        let err = ProxyParams::from_query("ua=vlc").target().unwrap_err();
        assert_eq!(err.http_status(), 400);
        let err = ProxyParams::from_query("url=").target().unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn unparsable_or_non_http_url_is_rejected() {
        assert!(parse_target("not a url").is_err());
        assert!(parse_target("/relative/path.m3u8").is_err());
        assert!(parse_target("ftp://example.com/file").is_err());
        assert!(parse_target("https://example.com/ok.m3u8").is_ok());
    }

    #[test]
    fn proxy_url_round_trips_through_decoder() {
        let params = Propagated {
            ua: Some("vlc".into()),
            referer: Some("http://site.tv/page?a=1&b=2".into()),
            origin: Some("http://site.tv".into()),
            cap_kbps: Some(2000),
            force_lowest: false,
            avoid_codecs: vec!["hevc".into()],
            prefer_codecs: vec!["avc1".into(), "mp4a".into()],
        };
        let target = Url::parse("http://cdn.example.com:8081/v/seg 1.ts?tok=x&y=1").unwrap();

        let built = proxy_url(PROXY_PATH, &target, Some("cdn.example.com:8081"), &params);
        let query = built.strip_prefix("/proxy?").unwrap();
        let back = ProxyParams::from_query(query);

        assert_eq!(back.target().unwrap(), target);
        assert_eq!(back.host.as_deref(), Some("cdn.example.com:8081"));
        assert_eq!(back.propagated, params);
        assert!(!back.inspect);
    }

    #[test]
    fn host_with_port_omits_default_port() {
        let u = Url::parse("https://cdn.example.com:443/a").unwrap();
        assert_eq!(host_with_port(&u).as_deref(), Some("cdn.example.com"));
        let u = Url::parse("http://cdn.example.com:8080/a").unwrap();
        assert_eq!(host_with_port(&u).as_deref(), Some("cdn.example.com:8080"));
    }
}
