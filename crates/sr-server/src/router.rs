//! Axum router construction.
//!
//! Builds the application router with the proxy and compat routes, the
//! compat file service, middleware layers and optional static file serving.

use axum::http::Method;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers(Any);

    let compat = &ctx.config.compat;
    let prefix = match compat.serve_prefix.trim_matches('/') {
        "" => "/compat".to_string(),
        trimmed => format!("/{trimmed}"),
    };
    let compat_files = ServiceBuilder::new()
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            routes::compat::touch_job,
        ))
        .service(ServeDir::new(&compat.output_root));

    let static_dir = ctx.config.server.static_dir.clone();

    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/proxy", get(routes::proxy::proxy))
        .route("/start-compat", get(routes::compat::start_compat))
        .route("/api/compat/jobs", get(routes::compat::list_jobs))
        .nest_service(&prefix, compat_files)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    // Static file serving for a bundled player page.
    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {}", dir.display());
            let index_path = dir.join("index.html");
            app = app.fallback_service(
                ServeDir::new(&dir)
                    .append_index_html_on_directories(true)
                    .not_found_service(ServeFile::new(index_path)),
            );
        }
    }

    app
}
