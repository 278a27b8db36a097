use std::sync::Arc;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    ticklist_gateway::{AppState, config, server},
    ticklist_oidc::{AuthFlow, store},
    ticklist_todos::SqliteTodoStore,
};

#[derive(Parser)]
#[command(name = "ticklist", about = "Todo list API with OIDC login")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API gateway.
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "ticklist starting");

    match cli.command {
        Commands::Serve { bind, port } => serve(bind, port).await,
    }
}

async fn serve(bind: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut gateway_config = config::GatewayConfig::from_env();
    if let Some(bind) = bind {
        gateway_config.bind = bind;
    }
    if let Some(port) = port {
        gateway_config.port = port;
    }

    let provider = config::provider_from_env(&gateway_config)?;
    let flow = AuthFlow::new(provider);

    let todos = SqliteTodoStore::connect(&gateway_config.database_url).await?;
    let state = AppState::new(flow, Arc::new(todos), gateway_config);

    // Periodic cleanup of abandoned login attempts, stopped at shutdown.
    let sweeper = store::spawn_sweeper(state.flow.pending_store(), store::SWEEP_INTERVAL);

    let result = tokio::select! {
        r = server::start(state) => r,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        },
    };

    sweeper.abort();
    result
}
