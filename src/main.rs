use clap::Parser;
use responses_bridge::config::config_search_paths;
use responses_bridge::translate::usage::TiktokenCounter;
use responses_bridge::{build_router, AppState, BridgeConfig, SharedJournal, SmartRouter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "responses-bridge",
    about = "LLM gateway that serves Messages and Chat Completions clients from a Responses backend",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Channel name (overrides config)
    #[arg(long)]
    channel: Option<String>,

    /// Relay journal path (JSONL)
    #[arg(long, default_value = "responses-bridge.jsonl")]
    journal_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "responses_bridge=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = BridgeConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(channel) = cli.channel {
        // A different channel brings its own preset defaults.
        config.channel.name = channel;
        config.channel.base_url = None;
        config.channel.api_key_env = None;
        config.channel.dialect = None;
    }

    config.validate()?;
    let base_url = config.effective_base_url()?;
    let _api_key = config.resolve_api_key()?;

    let journal = SharedJournal::new(&cli.journal_file)?;
    journal.compact()?;

    let router = SmartRouter::from_config(&config, Arc::new(TiktokenCounter))?;

    info!(version = env!("CARGO_PKG_VERSION"), "responses-bridge starting");
    info!(
        channel = %config.channel.name,
        base_url = %base_url,
        dialect = %router.channel(),
        "channel"
    );
    info!(
        port = config.port,
        models = config.models.len(),
        smart_routing = config.smart_routing.enabled,
        responses_models = config.smart_routing.responses_models.len(),
        journal = %cli.journal_file.display(),
        "settings"
    );

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
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
