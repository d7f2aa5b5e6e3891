//! # HTTP Server Module
//!
//! Assembles the daemon's `axum::Router`: shared [`AppState`], the
//! middleware stack (CORS, tracing, timeout, auth gate), and the route
//! table from spec.md §6. Grounded in the teacher's `create_server`
//! (`server.rs`), with the provider/cache/metrics machinery replaced by the
//! resolver pipeline and its background sweep task.

use crate::auth::{self, SharedTokenStore};
use crate::config::Config;
use crate::handlers;
use axum::routing::get;
use axum::Router;
use playdar_resolver::ResolverPipeline;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared application state, cloned cheaply (every field is an `Arc`) into
/// each handler and middleware invocation.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<ResolverPipeline>,
    pub token_store: SharedTokenStore,
    pub shutting_down: Arc<AtomicBool>,
}

fn cors_layer(config: &crate::config::CorsConfig) -> CorsLayer {
    if !config.enabled {
        return CorsLayer::new();
    }
    if config.allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
    }
}

/// Build the router and spawn the registry's periodic sweep task.
pub fn create_server(
    config: Config,
    pipeline: Arc<ResolverPipeline>,
    token_store: SharedTokenStore,
) -> Router {
    if config.server.cors.enabled && config.server.cors.allowed_origins.iter().any(|o| o == "*") {
        tracing::warn!(
            "CORS is enabled with wildcard origins; restrict allowed_origins for anything beyond a local listening daemon"
        );
    }

    let sweep_interval = config.registry.sweep_interval();
    let registry = pipeline.registry().clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let evicted = registry.sweep().await;
            if evicted > 0 {
                tracing::debug!(evicted, "registry sweep evicted stale queries");
            }
        }
    });

    let cors = cors_layer(&config.server.cors);
    let timeout = config.server.timeout();

    let state = AppState {
        config: Arc::new(config),
        pipeline,
        token_store,
        shutting_down: Arc::new(AtomicBool::new(false)),
    };

    Router::new()
        .route("/", get(handlers::status_page))
        .route("/crossdomain.xml", get(handlers::crossdomain))
        .route("/auth_1", get(handlers::auth_1).post(handlers::auth_1))
        .route("/auth_2", get(handlers::auth_2).post(handlers::auth_2))
        .route("/shutdown", get(handlers::shutdown))
        .route("/settings", get(handlers::settings))
        .route("/settings/config", get(handlers::settings_config))
        .route("/settings/auth", get(handlers::settings_auth))
        .route("/queries", get(handlers::list_queries).post(handlers::new_query))
        .route(
            "/queries/{qid}",
            get(handlers::get_query).post(handlers::cancel_query),
        )
        .route(
            "/quickplay/{artist}/{album}/{track}",
            get(handlers::quickplay),
        )
        .route("/sid/{sid}", get(handlers::stream_sid))
        .route("/comet", get(handlers::comet))
        .route("/{plugin}/{*rest}", get(handlers::plugin_passthrough))
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn_with_state(state.clone(), auth::auth_gate))
                .layer(TimeoutLayer::new(timeout)),
        )
        .with_state(state)
}
