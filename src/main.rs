use dotenv::dotenv;
use user_bootstrap::{config, database, jobs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = config::AppConfig::from_env()?;

    log::info!("🚀 Starting User Bootstrap Service...");

    // Initialize MongoDB connection
    let db = database::MongoDB::new(&config.database_url).await?;
    log::info!("✅ MongoDB connected successfully");

    db.ensure_collections().await?;

    let listener = jobs::user_created_listener::start_user_created_listener(db, config.listener_retry_delay);

    tokio::select! {
        result = listener => {
            if let Err(e) = result {
                log::error!("❌ User created listener stopped: {}", e);
                return Err(e.into());
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            log::info!("👋 Shutdown signal received");
        }
    }

    Ok(())
}
