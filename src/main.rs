//! # Unitrack API Main Entry Point

use unitrack::{config::ConfigLoader, server::run_server, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables; a missing
    // or malformed crypto key fails here, before anything else starts.
    let config = ConfigLoader::new().load()?;

    telemetry::init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "effective configuration");
    }

    run_server(config).await
}
