use axum::{routing::get, Router};
use std::panic;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use cosync_doc::config::Config;
use cosync_doc::docs::ApiDoc;
use cosync_doc::routes::create_api_routes;
use cosync_doc::state::AppState;
use cosync_doc::ws;
use cosync_doc::ws::handler::collaboration_handler;

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "cosync_doc=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    if config.server_secret.is_none() {
        warn!("No server secret configured - store calls will be unauthenticated");
    }
    info!(
        "Auto-save debounce: {}ms (max wait {}ms)",
        config.save_debounce_ms, config.save_max_wait_ms
    );

    let server_address = config.server_address();
    let app_state = AppState::new(config);

    // Combine all routes
    let app_routes = Router::new()
        // Mount API routes
        .nest("/api", create_api_routes())
        // Mount the collaboration WebSocket endpoint
        .route("/collaboration/:channel", get(collaboration_handler))
        .with_state(app_state.clone())
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&server_address)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", server_address));

    info!("Server running on http://{}", server_address);
    info!("Collaboration endpoint at ws://{}/collaboration/doc-{{id}}", server_address);
    info!("Swagger UI available at http://{}/swagger", server_address);

    axum::serve(listener, app_routes)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed to start");

    // Final flush so no dirty document is lost on shutdown
    info!("Shutting down, flushing open documents...");
    ws::coordinator::flush_all(&app_state).await;
    info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
