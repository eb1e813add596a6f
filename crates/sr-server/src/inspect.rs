//! `inspect=1` diagnostics.
//!
//! Reports what the proxy would do with a target without proxying media:
//! the resolved URL after redirects, upstream status and headers, whether
//! the body would be rewritten, and a bounded preview of the body.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use sr_hls::is_playlist;
use url::Url;

use crate::fetcher::Fetched;

#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    /// URL that answered, after redirects.
    pub url: String,
    pub hops: u8,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub content_type: Option<String>,
    pub would_rewrite: bool,
    /// Lossy UTF-8 preview of the first bytes of the body.
    pub preview: String,
    pub preview_truncated: bool,
    pub chunks_read: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_error: Option<String>,
}

/// Limits applied while reading the body.
#[derive(Debug, Clone, Copy)]
pub struct InspectLimits {
    pub max_chunks: usize,
    pub preview_bytes: usize,
    /// Per-chunk read timeout.
    pub chunk_timeout: Duration,
}

/// Build a report from a fetched response. `requested` is the URL the client
/// asked for, before redirects.
pub async fn inspect(fetched: Fetched, requested: &Url, limits: InspectLimits) -> InspectReport {
    let Fetched {
        mut response,
        url,
        hops,
    } = fetched;

    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in response.headers() {
        let value = String::from_utf8_lossy(value.as_bytes()).to_string();
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    let content_type = headers.get("content-type").cloned();
    let would_rewrite = is_playlist(requested, content_type.as_deref())
        || is_playlist(&url, content_type.as_deref());

    let mut buffer: Vec<u8> = Vec::new();
    let mut chunks_read = 0usize;
    let mut exhausted = false;
    let mut body_error = None;

    while chunks_read < limits.max_chunks {
        match tokio::time::timeout(limits.chunk_timeout, response.chunk()).await {
            Ok(Ok(Some(chunk))) => {
                chunks_read += 1;
                if buffer.len() <= limits.preview_bytes {
                    buffer.extend_from_slice(&chunk);
                }
            }
            Ok(Ok(None)) => {
                exhausted = true;
                break;
            }
            Ok(Err(e)) => {
                body_error = Some(e.to_string());
                break;
            }
            Err(_elapsed) => {
                body_error = Some(format!("no body data within {:?}", limits.chunk_timeout));
                break;
            }
        }
    }

    let preview_truncated = buffer.len() > limits.preview_bytes || !exhausted;
    buffer.truncate(limits.preview_bytes);

    tracing::debug!(url = %url, hops, chunks_read, would_rewrite, "Inspected upstream");

    InspectReport {
        url: url.to_string(),
        hops,
        status: response.status().as_u16(),
        headers,
        content_type,
        would_rewrite,
        preview: String::from_utf8_lossy(&buffer).to_string(),
        preview_truncated,
        chunks_read,
        body_error,
    }
}
