//! Redirect-following upstream fetcher.
//!
//! Each hop is a fresh connection (no pooling, `Connection: close`) with its
//! own header timeout. Redirects are followed manually so the hop bound and
//! the `Location` resolution stay under our control.

use std::time::Duration;

use axum::http::header::LOCATION;
use axum::http::StatusCode;
use futures::StreamExt;
use sr_core::config::ProxyConfig;
use sr_core::{Error, Result};
use url::Url;

use crate::resolver::OutboundRequest;

/// Bytes of a redirect body read before the connection is dropped.
const MAX_REDIRECT_DRAIN: usize = 64 * 1024;

/// A successful (non-redirect) upstream response.
#[derive(Debug)]
pub struct Fetched {
    pub response: reqwest::Response,
    /// The URL that produced `response`, after redirects.
    pub url: Url,
    /// Redirects followed to get here.
    pub hops: u8,
}

impl Fetched {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Issues outbound requests and follows redirects up to a hop bound.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    request_timeout: Duration,
    max_hops: u8,
}

impl Fetcher {
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(0)
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            request_timeout: config.request_timeout(),
            max_hops: config.max_hops,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Fetch `request`, following redirects.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if a hop's headers do not arrive in time.
    /// - [`Error::Upstream`] on transport failures.
    /// - [`Error::Redirect`] for a redirect without a usable `Location`.
    /// - [`Error::HopLimit`] once more than `max_hops` redirects were needed.
    pub async fn fetch(&self, mut request: OutboundRequest) -> Result<Fetched> {
        let mut hops: u8 = 0;

        loop {
            let response = self.send(&request).await?;
            let status = response.status();

            if !is_redirect(status) {
                tracing::debug!(url = %request.url, hops, status = status.as_u16(), "Upstream responded");
                return Ok(Fetched {
                    response,
                    url: request.url,
                    hops,
                });
            }

            let location = response
                .headers()
                .get(LOCATION)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).trim().to_string());
            drain(response).await;

            let location = location.filter(|l| !l.is_empty()).ok_or_else(|| {
                Error::Redirect(format!("{status} from {} without a Location header", request.url))
            })?;
            let next = request.url.join(&location).map_err(|e| {
                Error::Redirect(format!("unusable Location '{location}' from {}: {e}", request.url))
            })?;
            if !matches!(next.scheme(), "http" | "https") {
                return Err(Error::Redirect(format!(
                    "redirect to unsupported scheme '{}'",
                    next.scheme()
                )));
            }

            hops = hops.saturating_add(1);
            if hops > self.max_hops {
                return Err(Error::HopLimit { hops });
            }

            tracing::debug!(from = %request.url, to = %next, hops, status = status.as_u16(), "Following redirect");
            request = request.redirected(next);
        }
    }

    async fn send(&self, request: &OutboundRequest) -> Result<reqwest::Response> {
        let pending = self
            .client
            .get(request.url.clone())
            .headers(request.headers.clone())
            .send();

        match tokio::time::timeout(self.request_timeout, pending).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) if e.is_timeout() => Err(Error::Timeout(self.request_timeout)),
            Ok(Err(e)) => Err(Error::upstream(format!(
                "{} {}: {}",
                request.host(),
                request.path_and_query(),
                error_chain(&e)
            ))),
            Err(_elapsed) => Err(Error::Timeout(self.request_timeout)),
        }
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Read and discard a bounded amount of a redirect body.
async fn drain(response: reqwest::Response) {
    let mut body = response.bytes_stream();
    let mut read = 0usize;
    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(Ok(chunk)) = body.next().await {
            read += chunk.len();
            if read >= MAX_REDIRECT_DRAIN {
                break;
            }
        }
    })
    .await;
    if drained.is_err() {
        tracing::trace!("Gave up draining redirect body");
    }
}

/// Render an error with its source chain, since reqwest's top-level message
/// rarely names the underlying cause.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
