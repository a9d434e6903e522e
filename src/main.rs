//! CLI entry point for scubaduck.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Interactive ad-hoc query service over a read-only tabular dataset
#[derive(Debug, Parser)]
#[command(name = "scubaduck", version, about)]
struct Cli {
    /// Path to the dataset (CSV, SQLite, or native DuckDB file); omit to
    /// load the bundled sample dataset
    #[arg(long, env = "SCUBADUCK_DB")]
    db: Option<PathBuf>,

    /// Address to bind the HTTP server to
    #[arg(long, env = "SCUBADUCK_BIND", default_value = "127.0.0.1:8000")]
    bind: String,

    /// Directory of static assets to serve at `/`; omit to serve the API only
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> scubaduck::Result<()> {
    let dataset = scubaduck::Dataset::open(cli.db.as_deref())?;
    tracing::info!(bind = %cli.bind, db = ?cli.db, "starting scubaduck");

    let state = Arc::new(scubaduck::http::AppState::new(dataset));
    let app = scubaduck::http::app(state, cli.static_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
}
