//! Playlist rewriting.
//!
//! Every URI in the playlist (variant lines, segment lines and `URI="..."`
//! tag attributes) is resolved against the playlist URL and replaced by a
//! proxy URL. URIs with a non-http(s) scheme, such as `skd://` key URIs or
//! `data:` URIs, are left untouched since the proxy cannot fetch them.

use sr_core::{Error, Result};
use url::Url;

use crate::abr;
use crate::params::{host_with_port, proxy_url, Propagated, PROXY_PATH};
use crate::playlist::{self, MasterPlaylist};

/// State carried across one playlist rewrite.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    /// URL the playlist was fetched from, after redirects.
    pub base: Url,
    pub params: Propagated,
    /// Path of the proxy endpoint emitted URIs point at.
    pub endpoint: String,
}

impl RewriteContext {
    pub fn new(base: Url, params: Propagated) -> Self {
        Self {
            base,
            params,
            endpoint: PROXY_PATH.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Resolve a playlist reference against the base URL.
    pub fn resolve(&self, reference: &str) -> std::result::Result<Url, url::ParseError> {
        self.base.join(reference.trim())
    }

    /// Proxy URL for an absolute target, or the target itself when the proxy
    /// cannot fetch it.
    fn proxied(&self, target: &Url, host: Option<&str>) -> String {
        if is_fetchable(target) {
            proxy_url(&self.endpoint, target, host, &self.params)
        } else {
            target.to_string()
        }
    }
}

fn is_fetchable(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Rewrite a buffered playlist body.
pub fn rewrite_playlist(body: &[u8], ctx: &RewriteContext) -> Result<String> {
    let text = std::str::from_utf8(body)
        .map_err(|e| Error::rewrite(format!("playlist body is not valid UTF-8: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let lines = if playlist::is_master(text) {
        rewrite_master(text, ctx)
    } else {
        rewrite_media(text, ctx)
    };

    let mut out = lines.join("\n");
    if text.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

fn rewrite_master(text: &str, ctx: &RewriteContext) -> Vec<String> {
    let master = MasterPlaylist::parse(text, &ctx.base);
    let total = master.variants.len();
    let selected = abr::select(master.variants, &ctx.params);

    tracing::debug!(
        total,
        kept = selected.len(),
        base = %ctx.base,
        "Rewriting master playlist"
    );
    if total > 0 && selected.is_empty() {
        tracing::warn!(base = %ctx.base, "Codec filters removed every variant");
    }

    let mut out: Vec<String> = master
        .header
        .iter()
        .filter_map(|line| rewrite_line(line, ctx))
        .collect();

    for variant in selected {
        out.push(rewrite_uri_attributes(&variant.info_line, ctx));
        out.extend(
            variant
                .extra_tags
                .iter()
                .map(|tag| rewrite_uri_attributes(tag, ctx)),
        );
        let host = host_with_port(&variant.uri);
        out.push(ctx.proxied(&variant.uri, host.as_deref()));
    }

    out
}

fn rewrite_media(text: &str, ctx: &RewriteContext) -> Vec<String> {
    text.lines()
        .filter_map(|line| rewrite_line(line, ctx))
        .collect()
}

/// Rewrite one line outside a variant block. Returns `None` for URI lines
/// that cannot be resolved.
fn rewrite_line(line: &str, ctx: &RewriteContext) -> Option<String> {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return Some(line.to_string());
    }

    if trimmed.starts_with('#') {
        return Some(rewrite_uri_attributes(line, ctx));
    }

    match ctx.resolve(trimmed) {
        Ok(target) => Some(ctx.proxied(&target, None)),
        Err(e) => {
            tracing::warn!(uri = trimmed, error = %e, "Dropping unresolvable playlist entry");
            None
        }
    }
}

const URI_ATTR: &str = "URI=\"";

/// Rewrite every `URI="..."` attribute of a tag line.
fn rewrite_uri_attributes(line: &str, ctx: &RewriteContext) -> String {
    if !line.trim_start().starts_with("#EXT") {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(at) = find_uri_attribute(rest) {
        let value_start = at + URI_ATTR.len();
        let Some(len) = rest[value_start..].find('"') else {
            break;
        };
        let value = &rest[value_start..value_start + len];

        out.push_str(&rest[..value_start]);
        match ctx.resolve(value) {
            Ok(target) => out.push_str(&ctx.proxied(&target, None)),
            Err(_) => out.push_str(value),
        }
        out.push('"');
        rest = &rest[value_start + len + 1..];
    }

    out.push_str(rest);
    out
}

/// Byte offset of the next `URI="` that starts an attribute (so `XURI="`
/// does not match).
fn find_uri_attribute(s: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(offset) = s[from..].find(URI_ATTR) {
        let at = from + offset;
        if at == 0 || matches!(s.as_bytes()[at - 1], b':' | b',' | b' ') {
            return Some(at);
        }
        from = at + URI_ATTR.len();
    }
    None
}
