//! HTTP server initialization and routing

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::configure_auth_routes;
use crate::common_issues::configure_common_issues_routes;
use crate::dashboards::configure_dashboards_routes;
use crate::notifications::overdue::OverdueWatcher;
use crate::shared::state::AppState;
use crate::tickets::configure_tickets_routes;

use super::{health_check, shutdown_signal};

pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {o}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

pub fn build_router(app_state: Arc<AppState>) -> Router {
    let cors = create_cors_layer(&app_state.config.server.cors_allowed_origins);

    Router::new()
        .route("/health", get(health_check))
        .merge(configure_auth_routes())
        .merge(configure_tickets_routes())
        .merge(configure_dashboards_routes())
        .merge(configure_common_issues_routes())
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serves until a shutdown signal, running the overdue watcher alongside
/// when notifications are enabled.
pub async fn run_server(app_state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = app_state.config.bind_address();
    let shutdown = CancellationToken::new();

    let watcher = if app_state.config.notifications.enabled {
        let interval = Duration::from_secs(app_state.config.notifications.poll_interval_secs.max(1));
        let watcher = OverdueWatcher::new(
            Arc::clone(&app_state.tickets),
            Arc::clone(&app_state.notifier),
            app_state.overdue,
        );
        Some(watcher.spawn(interval, shutdown.clone()))
    } else {
        info!("Notifications disabled, overdue watcher not started");
        None
    };

    let app = build_router(app_state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {addr}: {e} - is another instance running?");
            return Err(e.into());
        }
    };
    info!("HTTP server listening on {addr}");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = watcher {
        if let Err(e) = handle.await {
            warn!("Overdue watcher ended abnormally: {e}");
        }
    }
    info!("Server stopped");
    Ok(())
}
