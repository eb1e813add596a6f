//! Compatibility rendition routes.

use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use sr_av::HeaderHints;
use sr_core::config::CompatConfig;
use sr_core::{Bitrate, CompatMode, Result};
use sr_hls::params::{is_truthy, parse_target};

use crate::context::AppContext;
use crate::error::AppError;
use crate::jobs::{EnsureOutcome, EnsureRequest, JobSnapshot};
use crate::resolver::resolve_user_agent;

/// Query parameters for `GET /start-compat`. Everything arrives as text so
/// malformed values produce our own 400 body.
#[derive(Debug, Default, Deserialize)]
pub struct StartCompatQuery {
    pub url: Option<String>,
    pub mode: Option<String>,
    pub vbr: Option<String>,
    pub abr: Option<String>,
    pub wait: Option<String>,
    pub auto_fallback: Option<String>,
    pub ua: Option<String>,
    pub referer: Option<String>,
    pub origin: Option<String>,
}

impl StartCompatQuery {
    /// Validate and fill defaults from `config`.
    pub fn into_request(self, config: &CompatConfig, default_ua: &str) -> Result<EnsureRequest> {
        let raw_url = non_empty(self.url)
            .ok_or_else(|| sr_core::Error::Validation("missing url parameter".into()))?;
        let source = parse_target(&raw_url)?;

        let mode = match non_empty(self.mode) {
            Some(mode) => mode.parse::<CompatMode>()?,
            None => config.default_mode,
        };
        let video_bitrate = match non_empty(self.vbr) {
            Some(vbr) => vbr.parse::<Bitrate>()?,
            None => config.default_video_bitrate,
        };
        let audio_bitrate = match non_empty(self.abr) {
            Some(abr) => abr.parse::<Bitrate>()?,
            None => config.default_audio_bitrate,
        };

        Ok(EnsureRequest {
            source: source.to_string(),
            mode,
            video_bitrate,
            audio_bitrate,
            headers: HeaderHints {
                user_agent: non_empty(self.ua).map(|ua| resolve_user_agent(Some(&ua), default_ua)),
                referer: non_empty(self.referer),
                origin: non_empty(self.origin),
            },
            wait: non_empty(self.wait).map_or(true, |v| is_truthy(&v)),
            auto_fallback: non_empty(self.auto_fallback).map_or(true, |v| is_truthy(&v)),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// GET /start-compat
pub async fn start_compat(
    State(ctx): State<AppContext>,
    Query(query): Query<StartCompatQuery>,
) -> std::result::Result<Json<EnsureOutcome>, AppError> {
    let request = query.into_request(&ctx.config.compat, &ctx.config.proxy.default_user_agent)?;
    tracing::debug!(
        source = %request.source,
        mode = %request.mode,
        wait = request.wait,
        auto_fallback = request.auto_fallback,
        "Compat job requested"
    );
    let outcome = ctx.jobs.ensure(&request).await?;
    Ok(Json(outcome))
}

/// GET /api/compat/jobs
pub async fn list_jobs(State(ctx): State<AppContext>) -> Json<Vec<JobSnapshot>> {
    Json(ctx.jobs.list())
}

/// Touches and pins the job whose directory a compat file request addresses,
/// until the response body has been sent. Runs inside the nested file
/// service, so the path starts with the job id.
pub async fn touch_job(State(ctx): State<AppContext>, request: Request, next: Next) -> Response {
    let id = request
        .uri()
        .path()
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string();

    let Some(pin) = ctx.jobs.pin(&id) else {
        tracing::trace!(job_id = %id, "Compat file requested for unknown job");
        return next.run(request).await;
    };
    let response = next.run(request).await;
    hold_until_body_ends(response, pin)
}

/// Moves `guard` into the response body so it drops once the body is fully
/// sent or abandoned.
fn hold_until_body_ends<G: Send + 'static>(response: Response, guard: G) -> Response {
    let (parts, body) = response.into_parts();
    let stream = body.into_data_stream().map(move |chunk| {
        let _held = &guard;
        chunk
    });
    Response::from_parts(parts, Body::from_stream(stream))
}
