use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::handler::{
    check_in, check_out, create_batch, create_challenge, get_batch, health_check, list_batches,
    list_employees, list_sessions, login, process_batch, register_employee, update_employee,
    AppState,
};

pub async fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        // API v1 routes
        .nest(
            "/api/v1",
            Router::new()
                // Wallet login
                .route("/auth/challenge", post(create_challenge))
                .route("/auth/login", post(login))
                // Employee management
                .route("/employees", get(list_employees).post(register_employee))
                .route("/employees/:wallet", put(update_employee))
                // Work sessions
                .route("/sessions", get(list_sessions))
                .route("/sessions/check-in", post(check_in))
                .route("/sessions/check-out", post(check_out))
                // Payroll batches
                .route("/batches", get(list_batches).post(create_batch))
                .route("/batches/:batch_id", get(get_batch))
                .route("/batches/:batch_id/process", post(process_batch)),
        )
        .layer(CompressionLayer::new())
        // CORS is wide open for the dashboard in dev; restrict in prod
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
