//! `tabhive serve` — Start the HTTP gateway over an in-process host.

use std::path::PathBuf;
use std::sync::Arc;

use tabhive_bridge::ExternalBridge;
use tabhive_config::AppConfig;
use tabhive_engine::{Engine, InMemoryHost, ReplaySource};
use tabhive_gateway::GatewayState;

pub async fn run(
    port_override: Option<u16>,
    seed: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let host = Arc::new(InMemoryHost::new());
    let engine = Arc::new(Engine::from_host(&config, host.clone()));

    if let Some(path) = seed {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        let source = ReplaySource::from_jsonl(&text)?;
        tracing::info!(events = source.len(), "Seeding in-process host");
        host.seed(source.into_events());
    }

    // Host-side effects of focus and close flow back through the event stream
    let pump = engine.clone();
    tokio::spawn(async move {
        if let Err(e) = pump.run(host.as_ref()).await {
            tracing::error!(error = %e, "Host event stream failed");
        }
    });

    println!("TabHive Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Allowed origins: {}", config.bridge.allowed_origins.len());

    let bridge = Arc::new(ExternalBridge::from_config(engine, &config.bridge));
    tabhive_gateway::start(GatewayState::new(bridge, config)).await?;

    Ok(())
}
