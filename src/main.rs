mod cli;
mod engine;
mod error;
mod metrics;
mod model;
mod orchestrator;
mod prefs;
mod storage;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;
mod variation;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logs go to stderr. Under the TUI the terminal belongs to the UI, so logging
/// stays off unless RUST_LOG asks for it.
fn init_tracing(headless: bool) {
    let default = if headless { "cfdg_studio=info" } else { "off" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = args.json || args.text || cfg!(not(feature = "tui"));
    init_tracing(is_non_tui);

    cli::run(args).await?;
    if is_non_tui {
        // The Ctrl-C listener may still hold the runtime open.
        std::process::exit(0);
    }
    Ok(())
}
