//! TrashToCash REST API.

use std::{path::Path, sync::Arc};

use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod services;

use error::AppError;
use middleware::auth::require_admin;
use services::{mailer::Mailer, storage::StorageService};

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
    pub mailer: Arc<dyn Mailer>,
    pub storage: StorageService,
}

impl AppState {
    pub fn new(db: db::Database, config: config::Config, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            storage: StorageService::new(&config.upload_path),
            db,
            config,
            mailer,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let admin_only = from_fn_with_state(state.clone(), require_admin);

    let api_router = Router::new()
        .nest("/auth", routes::auth::router(state.clone()))
        .nest("/services", routes::services::router(state.clone()))
        .nest("/bookings", routes::bookings::router(state.clone()))
        .nest("/contact", routes::contact::router(state.clone()))
        .nest("/users", routes::users::router().route_layer(admin_only.clone()))
        .nest("/dashboard", routes::dashboard::router().route_layer(admin_only))
        .fallback(api_not_found);

    // Unknown paths outside /api get the SPA shell
    let static_dir = Path::new(&state.config.static_path);
    let spa = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_router)
        .nest_service("/uploads", ServeDir::new(&state.config.upload_path))
        .fallback_service(spa)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn health_check() -> &'static str {
    "OK"
}

async fn api_not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}
