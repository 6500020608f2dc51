//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        DbAdapter, GoogleIdentityAdapter, MemoryAdapter, OpenRouterAdapter, RetryPolicy,
        RetryingGenerator,
    },
    config::{Config, Environment},
    error::ApiError,
    web::{build_router, state::AppState},
};
use english_coach_core::ports::{
    ContentGenerationService, DatabaseService, ExternalIdentityService,
};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Connects eagerly with a few attempts, then runs migrations.
async fn connect_with_retry(database_url: &str) -> Result<DbAdapter, sqlx::Error> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match DbAdapter::connect(database_url).await {
            Ok(db) => {
                info!("Running database migrations...");
                db.run_migrations().await?;
                info!("Database migrations complete.");
                return Ok(db);
            }
            Err(e) if attempt >= CONNECT_ATTEMPTS => return Err(e),
            Err(e) => {
                warn!(attempt, error = %e, "Database connection failed, retrying");
                tokio::time::sleep(CONNECT_BACKOFF * attempt).await;
            }
        }
    }
}

/// Picks the persistence backend for this environment.
///
/// Production keeps serving on a lazy pool when startup cannot reach the
/// database; development without `DATABASE_URL` runs in memory.
async fn database(config: &Config) -> Result<Arc<dyn DatabaseService>, ApiError> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set; using the in-memory store. Data will not persist.");
        return Ok(Arc::new(MemoryAdapter::new()));
    };

    info!("Connecting to database...");
    match connect_with_retry(url).await {
        Ok(db) => Ok(Arc::new(db)),
        Err(e) if config.environment == Environment::Production => {
            error!(error = %e, "Database unreachable at startup; serving with a lazy pool");
            Ok(Arc::new(DbAdapter::connect_lazy(url)?))
        }
        Err(e) => {
            error!(error = %e, "Database unreachable at startup");
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!(environment = ?config.environment, "Configuration loaded. Starting server...");

    if config.environment.is_development() {
        // A panic in development stops the process.
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_hook(info);
            std::process::exit(1);
        }));
    }

    // --- 2. Persistence ---
    let db = database(&config).await?;

    // --- 3. Initialize Service Adapters ---
    let openrouter = OpenRouterAdapter::new(
        config.llm_api_key.as_deref(),
        &config.llm_api_base,
        config.llm_model.clone(),
    );
    if !openrouter.is_configured() {
        warn!("No LLM API key configured; generation requests will fail.");
    }
    let generator: Arc<dyn ContentGenerationService> =
        Arc::new(RetryingGenerator::new(openrouter, RetryPolicy::default()));

    let identity: Option<Arc<dyn ExternalIdentityService>> = match config.google.clone() {
        Some(google) => Some(Arc::new(GoogleIdentityAdapter::new(google))),
        None => {
            info!("Google sign-in is not configured.");
            None
        }
    };

    // --- 4. Build the Shared AppState & Router ---
    let app_state = Arc::new(AppState::new(db, config.clone(), generator, identity));
    let app = build_router(app_state);

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
