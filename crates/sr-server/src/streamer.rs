//! Response assembly for proxied bodies.
//!
//! Non-playlist bodies are forwarded chunk by chunk as they arrive. Rewritten
//! playlists are sent as a single buffered body.

use axum::body::Body;
use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE,
    PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use axum::http::StatusCode;
use axum::response::Response;
use futures::TryStreamExt;
use sr_hls::HLS_CONTENT_TYPE;
use url::Url;

/// RFC 7230 hop-by-hop headers, managed by the HTTP server itself.
static HOP_BY_HOP: [HeaderName; 8] = [
    CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    UPGRADE,
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove(TRANSFER_ENCODING);
}

/// Forward an upstream response without buffering.
///
/// `content-encoding` is dropped since the upstream was asked for identity.
/// An upstream error mid-body aborts the client connection.
pub fn passthrough(response: reqwest::Response, url: &Url) -> Response {
    let status = response.status();
    let mut headers = response.headers().clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(CONTENT_ENCODING);

    let url = url.clone();
    let stream = response.bytes_stream().inspect_err(move |e| {
        tracing::warn!(url = %url, error = %e, "Upstream body failed mid-stream");
    });

    let mut out = Response::new(Body::from_stream(stream));
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out
}

/// Build the response for a rewritten playlist, keeping the upstream status
/// and the headers that still describe the new body.
pub fn playlist_response(status: StatusCode, upstream: &HeaderMap, body: String) -> Response {
    let mut headers = upstream.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(CONTENT_ENCODING);
    headers.remove(CONTENT_LENGTH);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(HLS_CONTENT_TYPE));

    let mut out = Response::new(Body::from(body));
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out
}
