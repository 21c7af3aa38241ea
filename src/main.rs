use clap::Parser;
use provider_gateway::{build_router, AppState, GatewayConfig, SharedJournal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "provider-gateway",
    about = "Request-shaping gateway: normalizes paths, injects providers, relays to the upstream API",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides PROXY_PORT and config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream base URL (overrides API_BASE_URL and config)
    #[arg(long)]
    upstream: Option<String>,

    /// Provider used for unknown models (overrides DEFAULT_PROVIDER and config)
    #[arg(long)]
    default_provider: Option<String>,

    /// Append one JSON line per exchange to this file
    #[arg(long, env = "GATEWAY_JOURNAL")]
    journal: Option<PathBuf>,

    /// Print the model to provider table and exit
    #[arg(long)]
    show_models: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "provider_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = GatewayConfig::resolve(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(upstream) = cli.upstream {
        config.upstream_base_url = upstream;
    }
    if let Some(provider) = cli.default_provider {
        config.default_provider = provider;
    }

    if cli.show_models {
        for (model, provider) in config.model_map().sorted() {
            println!("{provider:<16} {model}");
        }
        println!("{:<16} <any other model>", config.default_provider);
        return Ok(());
    }

    // Validate config eagerly
    let upstream = config.upstream_url()?;

    let journal = cli.journal.as_ref().map(SharedJournal::open).transpose()?;

    info!("Starting provider-gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream:          {}", upstream);
    info!("  Default provider:  {}", config.default_provider);
    info!("  Port:              {}", config.port);
    info!("  Models:            {} mapped", config.model_map().len());
    info!("  Upstream timeout:  {}s", config.upstream_timeout_secs);
    if let Some(path) = &cli.journal {
        info!("  Journal:           {}", path.display());
    }

    let port = config.port;
    let state = Arc::new(AppState::new(config, journal)?);

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  Point the client's OpenAI-compatible base URL at http://localhost:{}", port);
    info!("  Change the fallback provider with DEFAULT_PROVIDER=HuggingSpace");

    axum::serve(listener, app).await?;

    Ok(())
}
