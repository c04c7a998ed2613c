//! Start a responses-bridge server programmatically.
//!
//! Usage:
//!   export OPENAI_API_KEY=sk-your-key
//!   cargo run --example basic_bridge

use responses_bridge::translate::usage::TiktokenCounter;
use responses_bridge::{build_router, AppState, BridgeConfig, SharedJournal, SmartRouter};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = BridgeConfig::find_and_load(None)?;
    config.validate()?;
    let base_url = config.effective_base_url()?;

    let router = SmartRouter::from_config(&config, Arc::new(TiktokenCounter))?;
    println!("Channel: {} ({}, {})", config.channel.name, base_url, router.channel());
    println!("Models mapped: {}", config.models.len());

    let journal = SharedJournal::new("bridge-example.jsonl")?;
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let port = config.port;
    let state = Arc::new(AppState {
        config,
        client,
        journal,
        router,
    });

    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("Listening on http://{}", addr);
    println!();
    println!("  POST http://localhost:{}/v1/messages", port);
    println!("  POST http://localhost:{}/v1/chat/completions", port);

    axum::serve(listener, app).await?;
    Ok(())
}
