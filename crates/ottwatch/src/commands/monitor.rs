use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ottwatch_monitor::{EventHub, MonitorRuntime, StatusSnapshot, TickOutcome};

use crate::adapters;
use crate::cli::Cli;
use crate::config::AppConfig;
use crate::wiring;

use super::print_json;

/// Maximum time to wait for orderly shutdown before forcing exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(20);

/// Brief pause after the loop stops so the adapter can write the last events.
const SHUTDOWN_DRAIN: Duration = Duration::from_millis(500);

pub async fn run(cli: &Cli, hub: EventHub) -> anyhow::Result<()> {
    let config = AppConfig::load(&cli.config_path())?;
    startup_diagnostics(cli, &config);

    let orchestrator = wiring::build_orchestrator(&config, hub)?;
    let runtime = MonitorRuntime::new(orchestrator);
    let cancel = CancellationToken::new();

    let adapter = {
        let control = runtime.control();
        let token = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = adapters::stdio::start(control, token).await {
                tracing::error!(error = %e, "Stdio adapter failed");
            }
        })
    };

    runtime.start().await;
    tracing::info!("Ready.");

    shutdown_signal().await;
    tracing::info!("Shutting down...");

    // Ordered shutdown with hard timeout
    let shutdown = async {
        runtime.stop().await;
        tokio::time::sleep(SHUTDOWN_DRAIN).await;
        cancel.cancel();
        let _ = adapter.await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown)
        .await
        .is_err()
    {
        tracing::warn!(
            "Shutdown timed out after {:?}, forcing exit",
            SHUTDOWN_TIMEOUT
        );
    }

    Ok(())
}

pub async fn once(cli: &Cli, hub: EventHub) -> anyhow::Result<()> {
    let config = AppConfig::load(&cli.config_path())?;
    let orchestrator = wiring::build_orchestrator(&config, hub)?;

    let outcome = orchestrator.tick().await;
    let status = orchestrator.status().await;

    if cli.json {
        print_json(&serde_json::json!({
            "outcome": outcome_label(outcome),
            "status": status,
        }));
    } else {
        println!("Tick: {}", outcome_label(outcome));
        print_status(&status);
    }
    Ok(())
}

fn outcome_label(outcome: TickOutcome) -> &'static str {
    match outcome {
        TickOutcome::Suspended => "suspended",
        TickOutcome::SafeModeEntered => "safe_mode_entered",
        TickOutcome::Rotated => "rotated",
        TickOutcome::Checked { passed: true } => "passed",
        TickOutcome::Checked { passed: false } => "failed",
        TickOutcome::Faulted => "faulted",
    }
}

fn print_status(status: &StatusSnapshot) {
    println!("Mode:       {:?}", status.mode);
    println!("Identity:   {}", status.current_identity);
    println!(
        "Last good:  {}",
        status.last_known_good_identity.as_deref().unwrap_or("-")
    );
    println!("Retries:    {}", status.retry_count);
}

/// Wait for Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

// ── Startup diagnostics ─────────────────────────────────────────────

fn startup_diagnostics(cli: &Cli, config: &AppConfig) {
    tracing::info!("ottwatch v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Platform: {}", std::env::consts::OS);
    tracing::info!("Config: {}", cli.config_path().display());
    tracing::info!(
        "Services: {} ({})",
        config.services.len(),
        config
            .services
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    tracing::info!("Identity pool: {} entries", config.identity.pool.len());
    match &config.identity.probe {
        Some(target) => tracing::info!("Link probe: tcp {target}"),
        None => tracing::info!("Link probe: disabled"),
    }
    tracing::info!("Checker: {:?}", config.checker.kind);
    tracing::info!(
        "Notifications: {}",
        if config.telegram.is_some() {
            "telegram"
        } else {
            "log only"
        }
    );
    tracing::info!("Events: {}", config.events_path().display());
}
