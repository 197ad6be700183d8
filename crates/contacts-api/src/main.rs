//! Contacts API Server
//!
//! REST API server for user accounts and personal contacts.
//!
//! Author: hephaex@gmail.com

use contacts_api::services::{AvatarStore, CloudinaryStore, LogMailer, MemoryAvatarStore};
use contacts_api::{create_router, state::AppState};
use contacts_core::{AppConfig, LoggingConfig, MemoryStore, PgStore};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config.logging);

    if config.uses_default_secret() {
        tracing::warn!("JWT_SECRET is not set, using the development secret");
    }

    let mailer = Arc::new(LogMailer::new(&config.mail));
    let avatars: Arc<dyn AvatarStore> = if config.upload.is_configured() {
        Arc::new(CloudinaryStore::from_config(&config.upload)?)
    } else {
        tracing::warn!("Cloudinary credentials missing, avatars are kept in memory");
        Arc::new(MemoryAvatarStore::new())
    };

    // Create application state
    let state = match config.database.url.clone() {
        Some(url) => {
            let store = PgStore::connect(&url, config.database.pool_size).await?;
            store.migrate().await?;
            tracing::info!("Connected to PostgreSQL");
            AppState::new(config, Arc::new(store), mailer, avatars)?
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, using the in-memory store");
            AppState::new(config, Arc::new(MemoryStore::new()), mailer, avatars)?
        }
    };
    let state = Arc::new(state);

    tracing::info!(
        cache_enabled = state.sessions.is_enabled(),
        rate_limit_enabled = state.config.rate_limit.enabled,
        "Authentication configured"
    );

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Contacts API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "contacts_api={level},contacts_core={level},audit=info,tower_http=info",
            level = logging.level
        )
        .into()
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}
