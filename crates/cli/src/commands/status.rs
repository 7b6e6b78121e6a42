//! `tabhive status` — Show the effective configuration.

use tabhive_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("TabHive Status");
    println!("==============");
    println!("  Config dir:        {}", AppConfig::config_dir().display());
    println!("  History capacity:  {}", config.engine.history_capacity);
    println!("  Snapshot history:  {}", config.engine.snapshot_history_limit);
    println!(
        "  Dispatch attempts: {} generic, {} page-state",
        config.dispatch.generic_max_attempts, config.dispatch.page_state_max_attempts
    );
    println!("  Resolver floor:    {}", config.resolver.floor);
    if config.bridge.allowed_origins.is_empty() {
        println!("  Allowed origins:   (none, every external caller is rejected)");
    } else {
        println!("  Allowed origins:   {}", config.bridge.allowed_origins.join(", "));
    }
    println!("  Gateway:           {}:{}", config.gateway.host, config.gateway.port);

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `tabhive onboard` first");
    }

    Ok(())
}
