use std::{net::SocketAddr, sync::Arc};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trashtocash_server::{
    build_router, config::Config, db::Database, routes::auth::seed_admin,
    services::mailer::LogMailer, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trashtocash_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    // Initialize database
    let db = Database::connect(&config.database_url).await?;
    db.run_migrations().await?;

    if let Some(seed) = &config.admin_seed {
        seed_admin(&db, seed).await?;
    }

    // Build application state
    let mailer = Arc::new(LogMailer::new(config.mail_from.clone()));
    let state = AppState::new(db, config.clone(), mailer);
    state.storage.init().await?;

    let app = build_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
