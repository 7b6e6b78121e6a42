//! `tabhive replay` — Run recorded host events through a fresh engine.

use std::path::Path;
use std::sync::Arc;

use tabhive_config::AppConfig;
use tabhive_engine::{Engine, InMemoryHost, ReplaySource, TargetQuery};

pub async fn run(file: &Path, find: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let text = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let source = ReplaySource::from_jsonl(&text)?;

    let host = Arc::new(InMemoryHost::new());
    let engine = Engine::from_host(&config, host);
    let applied = engine.run(&source).await?;
    tracing::info!(events = source.len(), applied, "Replay finished");

    let snapshot = engine.request_snapshot();
    println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);

    if let Some(query) = find {
        let matches = engine.resolve_targets(&TargetQuery::all(query));
        println!("{}", serde_json::to_string_pretty(&matches)?);
    }

    Ok(())
}
