//! Nova gateway server binary.
//!
//! Usage:
//!   nova-server [CONFIG_PATH]
//!   nova-server --write-default-config PATH

use std::path::PathBuf;

use anyhow::Context;
use nova::config::NovaConfig;
use nova::server::{AppState, NovaServer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nova=info,tower_http=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = match args.get(1).map(String::as_str) {
        Some("--write-default-config") => {
            let path = args
                .get(2)
                .map(PathBuf::from)
                .unwrap_or_else(NovaConfig::default_config_path);
            NovaConfig::write_default(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("wrote default config to {}", path.display());
            return Ok(());
        }
        Some("help" | "--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(path) => PathBuf::from(path),
        None => NovaConfig::default_config_path(),
    };

    let mut config = NovaConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.apply_env();
    config.validate()?;
    if config.llm.api_key.is_empty() {
        warn!("no generation API key configured; set GEMINI_API_KEY");
    }
    if config.stt.api_key.is_empty() {
        warn!(
            "no speech API key configured; transcription will fail until \
             GOOGLE_SPEECH_API_KEY (or GEMINI_API_KEY) names a key with Cloud Speech-to-Text enabled"
        );
    }

    let state = AppState::from_config(&config)?;
    let server = NovaServer::start(state, &config.server).await?;
    info!(
        "nova v{} ready on http://{} (model {}, voice {})",
        env!("CARGO_PKG_VERSION"),
        server.addr(),
        config.llm.model,
        config.tts.voice
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");
    server.shutdown();
    Ok(())
}

fn print_usage() {
    println!("Usage:");
    println!("  nova-server [CONFIG_PATH]                  run the gateway");
    println!("  nova-server --write-default-config [PATH]  write a default config file");
    println!();
    println!("Environment: GEMINI_API_KEY, GOOGLE_SPEECH_API_KEY, NOVA_HOST, NOVA_PORT, NOVA_CONFIG");
}
