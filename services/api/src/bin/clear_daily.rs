//! services/api/src/bin/clear_daily.rs
//!
//! Maintenance command: removes today's cached word of the day so the next
//! request regenerates the week.

use api_lib::{adapters::DbAdapter, config::Config, error::ApiError};
use chrono::Utc;
use english_coach_core::ports::DatabaseService;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| ApiError::Internal("DATABASE_URL is required".to_string()))?;
    let db = DbAdapter::connect(url).await?;

    let today = Utc::now().date_naive();
    match db.delete_daily_word(today).await? {
        Some(word) => info!(date = %today, word = %word.word, "Deleted today's daily word"),
        None => info!(date = %today, "No daily word stored for today"),
    }
    Ok(())
}
