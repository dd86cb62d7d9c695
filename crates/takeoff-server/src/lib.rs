pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use takeoff_core::engine::TakeoffEngine;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(engine: TakeoffEngine) -> Router {
    let app_state = state::AppState::new(engine);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health))
        // Versions
        .route(
            "/api/takeoff/{project_id}/create-version",
            post(routes::versions::create_version),
        )
        .route(
            "/api/takeoff/{project_id}/versions",
            get(routes::versions::list_versions)
                .put(routes::versions::update_version)
                .post(routes::versions::copy_version)
                .delete(routes::versions::delete_version),
        )
        // Setup + takeoff tab
        .route(
            "/api/takeoff/{project_id}/setup-config",
            get(routes::setup::get_setup_config),
        )
        .route(
            "/api/takeoff/{project_id}/sheet-config",
            get(routes::sheet::get_sheet_config),
        )
        // Tools
        .route(
            "/api/takeoff/{project_id}/tools",
            get(routes::tools::get_tools),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the takeoff API server on `0.0.0.0:{port}`.
pub async fn serve(engine: TakeoffEngine, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(engine, listener).await
}

/// Start the server on a pre-bound listener, so a caller binding port 0 can
/// read the actual port first.
pub async fn serve_on(
    engine: TakeoffEngine,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(engine);

    tracing::info!("takeoff API listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
