use finance_chat_agent::{
    api::{start_server, ApiState},
    config::AppConfig,
    gemini::GeminiClient,
    tools::NseQuoteClient,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();
    let config = AppConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    if config.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not set; chat turns that reach the model will fail");
    }

    info!("Finance Chat Agent - API Server");
    info!(port = config.port, model = %config.gemini_model, "Configuration loaded");

    let model = Arc::new(GeminiClient::from_config(&config)?);
    let quotes = Arc::new(NseQuoteClient::new(&config.nse_base_url, config.http_timeout)?);

    info!("Starting API server...");
    start_server(ApiState::new(model, quotes), config.port).await?;

    Ok(())
}
