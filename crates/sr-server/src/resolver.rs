//! Outbound request construction.
//!
//! Turns a validated target URL plus the inbound request's parameters and
//! headers into the header set sent upstream on every hop.

use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, CONNECTION, HOST, ORIGIN, RANGE,
    REFERER, USER_AGENT,
};
use sr_core::{Error, Result};
use sr_hls::params::host_with_port;
use sr_hls::ProxyParams;
use url::Url;

static ICY_METADATA: HeaderName = HeaderName::from_static("icy-metadata");

/// Named user-agent strings selectable through the `ua` parameter.
pub const USER_AGENTS: &[(&str, &str)] = &[
    ("vlc", "VLC/3.0.20 LibVLC/3.0.20"),
    (
        "chrome",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/124.0.0.0 Safari/537.36",
    ),
    (
        "firefox",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    ),
    (
        "safari",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
         (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    ),
    (
        "android",
        "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/124.0.0.0 Mobile Safari/537.36",
    ),
    (
        "ios",
        "AppleCoreMedia/1.0.0.21E236 (iPhone; U; CPU OS 17_4 like Mac OS X; en_us)",
    ),
    ("exoplayer", "ExoPlayerLib/2.19.1"),
    ("kodi", "Kodi/21.0 (X11; Linux x86_64) App_Bitness/64 Version/21.0"),
    ("ffmpeg", "Lavf/60.16.100"),
];

/// Resolve a user-agent alias. Unknown aliases are sent verbatim; a missing
/// alias falls back to `default_alias`.
pub fn resolve_user_agent(alias: Option<&str>, default_alias: &str) -> String {
    let alias = alias.unwrap_or(default_alias);
    USER_AGENTS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(alias))
        .map(|(_, ua)| ua.to_string())
        .unwrap_or_else(|| alias.to_string())
}

/// Everything needed to issue one outbound GET.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: Url,
    pub headers: HeaderMap,
}

impl OutboundRequest {
    /// Build the first-hop request for a `/proxy` call.
    pub fn build(
        target: Url,
        params: &ProxyParams,
        inbound: &HeaderMap,
        default_user_agent: &str,
    ) -> Result<Self> {
        let propagated = &params.propagated;
        let mut headers = HeaderMap::new();

        let ua = resolve_user_agent(propagated.ua.as_deref(), default_user_agent);
        headers.insert(USER_AGENT, header_value("ua", &ua)?);
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        let host = match params.host {
            Some(ref host) => host.clone(),
            None => host_with_port(&target)
                .ok_or_else(|| Error::Validation(format!("url '{target}' has no host")))?,
        };
        headers.insert(HOST, header_value("host", &host)?);

        if let Some(ref referer) = propagated.referer {
            headers.insert(REFERER, header_value("referer", referer)?);
        }
        if let Some(ref origin) = propagated.origin {
            headers.insert(ORIGIN, header_value("origin", origin)?);
        }

        for name in [&RANGE, &ICY_METADATA] {
            if let Some(value) = inbound.get(name) {
                headers.insert(name.clone(), value.clone());
            }
        }

        Ok(Self {
            url: target,
            headers,
        })
    }

    /// The request for the next hop. The `Host` header always follows the
    /// new target; an explicit override only applies to the first hop.
    pub fn redirected(mut self, next: Url) -> Self {
        if let Some(value) = host_with_port(&next).and_then(|h| HeaderValue::from_str(&h).ok()) {
            self.headers.insert(HOST, value);
        }
        self.url = next;
        self
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Port, defaulting to 443/80 by scheme.
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }

    /// Target path plus the target's own query string.
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{query}", self.url.path()),
            None => self.url.path().to_string(),
        }
    }
}

fn header_value(param: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::Validation(format!("{param} contains characters not allowed in a header")))
}
