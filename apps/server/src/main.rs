//! pitchmatch HTTP server.
//!
//! Serves `POST /client_search`, `POST /upload_problem` and `GET /health`
//! over the same matching pipeline the CLI uses.

mod error;
mod routes;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;

use pitchmatch_core::Gateways;
use pitchmatch_shared::{load_config, load_config_from, validate_api_keys, validate_config};

#[derive(Parser)]
#[command(
    name = "pitchmatch-server",
    version,
    about = "HTTP API for matching founder interviews against collected problem posts."
)]
struct ServerCli {
    /// Address to bind (overrides server.bind).
    #[arg(long, env = "PITCHMATCH_BIND")]
    bind: Option<String>,

    /// Config file to use instead of ~/.pitchmatch/pitchmatch.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(cli: &ServerCli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pitchmatch=info,tower_http=info",
        1 => "pitchmatch=debug,tower_http=debug",
        _ => "pitchmatch=trace,tower_http=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => fmt().with_env_filter(env_filter).with_target(false).init(),
        LogFormat::Json => fmt().json().with_env_filter(env_filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = ServerCli::parse();
    init_tracing(&cli);

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    validate_config(&config)?;
    validate_api_keys(&config)?;

    let gateways = Gateways::from_config(&config)?;
    let app = routes::router(routes::AppState::new(gateways, &config));

    let bind = cli.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .wrap_err_with(|| format!("failed to bind {bind}"))?;
    info!(%bind, collection = %config.index.problem_collection, "pitchmatch server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
