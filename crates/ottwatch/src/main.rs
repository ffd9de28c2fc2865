mod adapters;
mod cli;
mod commands;
mod config;
mod wiring;

use clap::Parser;

use ottwatch_monitor::{EventHub, LiveLogLayer};

use cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_new(cli.log_directive())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Log records also go to live subscribers through this hub.
    let hub = EventHub::new();

    // Hold the non-blocking guards for the lifetime of main so logs flush on exit.
    let _log_guards = init_logging(env_filter, cli.log_file.as_deref(), hub.clone())?;

    // ── Synchronous subcommands (no runtime needed) ──────────────────
    match &cli.command {
        Command::Version => {
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "version": env!("CARGO_PKG_VERSION"),
                        "platform": std::env::consts::OS,
                    })
                );
            } else {
                println!("ottwatch {}", env!("CARGO_PKG_VERSION"));
            }
            return Ok(());
        }
        Command::Init => return commands::inspect::init(&cli),
        Command::Events { limit } => return commands::inspect::events(&cli, *limit),
        Command::Reputation => return commands::inspect::reputation(&cli),
        Command::Run | Command::Once => {}
    }

    // ── Everything below needs a Tokio runtime ──────────────────────
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main(cli, hub))
}

async fn async_main(cli: Cli, hub: EventHub) -> anyhow::Result<()> {
    match cli.command {
        Command::Run => commands::monitor::run(&cli, hub).await,
        Command::Once => commands::monitor::once(&cli, hub).await,
        // Handled in main()
        _ => Ok(()),
    }
}

// ── Logging setup ───────────────────────────────────────────────────

/// Initialize tracing with stderr + optional file output, plus forwarding
/// to live event subscribers.
/// Returns guards that must be held for the lifetime of the program
/// to ensure the non-blocking writers flush on shutdown.
fn init_logging(
    env_filter: tracing_subscriber::EnvFilter,
    log_file: Option<&std::path::Path>,
    hub: EventHub,
) -> anyhow::Result<Vec<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    // Non-blocking stderr so a redirected pipe nobody reads cannot stall the loop.
    let (nb_stderr, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(nb_stderr);
    let live_layer = LiveLogLayer::new(hub);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let (nb_file, file_guard) = tracing_appender::non_blocking(file);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(nb_file);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .with(live_layer)
            .init();

        Ok(vec![stderr_guard, file_guard])
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(live_layer)
            .init();

        Ok(vec![stderr_guard])
    }
}
