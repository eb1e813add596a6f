//! `GET /proxy`: the streaming reverse proxy.
//!
//! Playlists are buffered, rewritten and sent whole; everything else is
//! streamed through chunk by chunk. Dropping the handler future (client
//! disconnect) drops the outbound request with it.

use axum::extract::{RawQuery, State};
use axum::http::header::HOST;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sr_core::Error;
use sr_hls::{is_playlist, rewrite_playlist, ProxyParams, RewriteContext, PROXY_PATH};
use url::Url;

use crate::context::AppContext;
use crate::error::AppError;
use crate::fetcher::Fetched;
use crate::inspect::inspect;
use crate::resolver::OutboundRequest;
use crate::streamer::{passthrough, playlist_response};

/// GET /proxy?url=...
pub async fn proxy(
    State(ctx): State<AppContext>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let params = ProxyParams::from_query(query.as_deref().unwrap_or_default());
    let target = params.target()?;
    reject_self_recursion(&target, &headers)?;

    let request = OutboundRequest::build(
        target.clone(),
        &params,
        &headers,
        &ctx.config.proxy.default_user_agent,
    )?;
    tracing::debug!(
        scheme = request.scheme(),
        host = request.host(),
        port = request.port(),
        path = %request.path_and_query(),
        "Proxying"
    );

    let fetched = ctx.fetcher.fetch(request).await?;

    if params.inspect {
        let report = inspect(fetched, &target, ctx.inspect_limits()).await;
        return Ok(Json(report).into_response());
    }

    let playlist = {
        let content_type = fetched.content_type();
        is_playlist(&target, content_type) || is_playlist(&fetched.url, content_type)
    };
    if !playlist {
        return Ok(passthrough(fetched.response, &fetched.url));
    }

    let Fetched { response, url, hops } = fetched;
    let status = response.status();
    let upstream_headers = response.headers().clone();
    let timeout = ctx.fetcher.request_timeout();
    let body = tokio::time::timeout(timeout, response.bytes())
        .await
        .map_err(|_| Error::Timeout(timeout))?
        .map_err(|e| Error::upstream(format!("reading playlist from {url}: {e}")))?;

    let rewrite_ctx = RewriteContext::new(url, params.propagated);
    let rewritten = rewrite_playlist(&body, &rewrite_ctx)?;
    tracing::debug!(
        url = %rewrite_ctx.base,
        hops,
        bytes_in = body.len(),
        bytes_out = rewritten.len(),
        "Rewrote playlist"
    );

    Ok(playlist_response(status, &upstream_headers, rewritten))
}

/// Refuse targets that point back at this proxy's own endpoint.
///
/// Only the URL a client sends is checked; a redirect or a rewritten URI that
/// leads back here arrives as a fresh request and is checked then.
fn reject_self_recursion(target: &Url, inbound: &HeaderMap) -> Result<(), Error> {
    if target.path() != PROXY_PATH {
        return Ok(());
    }
    let Some(own_host) = inbound
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(hostname)
    else {
        return Ok(());
    };
    let Some(target_host) = target.host_str() else {
        return Ok(());
    };

    if target_host.eq_ignore_ascii_case(own_host) {
        return Err(Error::Validation(
            "url points back at this proxy; refusing to proxy to itself".into(),
        ));
    }
    Ok(())
}

/// Host part of a `Host` header value, without the port.
fn hostname(host_header: &str) -> &str {
    let host = host_header.trim();
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    host.split(':').next().unwrap_or(host)
}
