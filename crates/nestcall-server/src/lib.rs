pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use nestcall_core::config::ServiceConfig;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", post(routes::envelope::nested_call))
        .route("/health", get(routes::health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Connect backends, then serve the nested-call endpoint on `0.0.0.0:port`.
pub async fn serve(config: ServiceConfig, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(config, listener).await
}

/// Serve on a pre-bound listener.
///
/// Lets the caller read the actual port before starting (useful when
/// `port = 0` and the OS picks a free port).
pub async fn serve_on(
    config: ServiceConfig,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(AppState::from_config(&config).await?);

    tracing::info!(
        service = %config.service_name,
        "nestcall listening on http://localhost:{actual_port}"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
