//! Mockport CLI - serve mock definitions from YAML/JSON files.
//!
//! Usage:
//!   mockport start -f users.yml -f orders.yml [--output-json]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mockport::{MemoryStore, MockDefinition, ServerManager, Store};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "mockport",
    about = "Programmable HTTP stub server for integration testing",
    version
)]
struct Args {
    /// Log filter used when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, env = "MOCKPORT_LOG", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start one mock server per definition file and serve until interrupted
    Start {
        /// Mock definition file, may be repeated
        #[arg(short = 'f', long = "filename", required = true)]
        filenames: Vec<PathBuf>,

        /// Print the server URLs as a JSON object
        #[arg(long)]
        output_json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Start {
            filenames,
            output_json,
        } => start(filenames, output_json).await,
    }
}

async fn start(filenames: Vec<PathBuf>, output_json: bool) -> Result<()> {
    let shutdown = shutdown_signal()?;
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let manager = ServerManager::new(Arc::clone(&store));

    let urls = match start_all(&manager, &store, &filenames, output_json).await {
        Ok(urls) => urls,
        Err(e) => {
            manager.stop_all_servers().await;
            return Err(e);
        }
    };

    if output_json {
        println!("{}", serde_json::json!({ "urls": urls }));
    }

    let signal = shutdown.await?;
    info!("Received {}, shutting down mock servers", signal);
    manager.stop_all_servers().await;
    Ok(())
}

/// Load and serve every file with its own session, returning the URLs in file order
async fn start_all(
    manager: &ServerManager,
    store: &Arc<dyn Store>,
    filenames: &[PathBuf],
    output_json: bool,
) -> Result<Vec<String>> {
    let mut urls = Vec::with_capacity(filenames.len());
    for filename in filenames {
        let mock = MockDefinition::from_file(filename)
            .with_context(|| format!("failed to load {}", filename.display()))?;

        store
            .set_active_session(&mock.id, &Uuid::new_v4().to_string())
            .await?;
        let state = manager
            .new_mock_server(mock)
            .await
            .with_context(|| format!("failed to start mock from {}", filename.display()))?;

        if !output_json {
            println!("{} -> {}", filename.display(), state.url);
        }
        urls.push(state.url);
    }
    Ok(urls)
}

/// Install the stop handlers and return a future resolving with the first signal.
///
/// Ctrl-C everywhere, plus SIGTERM, SIGHUP and SIGQUIT on unix.
fn shutdown_signal() -> Result<impl Future<Output = Result<&'static str>>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("failed to listen for SIGTERM")?;
        let mut hangup = signal(SignalKind::hangup()).context("failed to listen for SIGHUP")?;
        let mut quit = signal(SignalKind::quit()).context("failed to listen for SIGQUIT")?;

        Ok(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.map(|_| "SIGINT").context("failed to listen for Ctrl-C")
                }
                _ = terminate.recv() => Ok("SIGTERM"),
                _ = hangup.recv() => Ok("SIGHUP"),
                _ = quit.recv() => Ok("SIGQUIT"),
            }
        })
    }

    #[cfg(not(unix))]
    {
        Ok(async {
            tokio::signal::ctrl_c()
                .await
                .map(|_| "Ctrl-C")
                .context("failed to listen for Ctrl-C")
        })
    }
}
