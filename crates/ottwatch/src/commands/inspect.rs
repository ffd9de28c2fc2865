use ottwatch_identity::{Identity, ReputationCache};
use ottwatch_monitor::{Event, EventDetails, JsonlEventStore};

use crate::cli::Cli;
use crate::config::{self, AppConfig};

use super::print_json;

pub fn events(cli: &Cli, limit: usize) -> anyhow::Result<()> {
    let config = AppConfig::load_or_default(&cli.config_path())?;
    let store = JsonlEventStore::new(config.events_path());
    let events = store.read_recent(limit)?;

    if cli.json {
        for event in &events {
            print_json(event);
        }
        return Ok(());
    }

    if events.is_empty() {
        println!("No events in {}", store.path().display());
        return Ok(());
    }
    for event in &events {
        println!(
            "{}  {:<13} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event_type_label(event),
            summarize(&event.details)
        );
    }
    Ok(())
}

pub fn reputation(cli: &Cli) -> anyhow::Result<()> {
    let config = AppConfig::load_or_default(&cli.config_path())?;
    let state = ReputationCache::open(config.reputation_path()).snapshot();

    if cli.json {
        print_json(&state);
        return Ok(());
    }
    println!("Good: {}", join(state.good.iter()));
    println!("Bad:  {}", join(state.bad.iter()));
    Ok(())
}

pub fn init(cli: &Cli) -> anyhow::Result<()> {
    let path = cli.config_path();
    let written = config::write_default(&path)?;

    if cli.json {
        print_json(&serde_json::json!({
            "path": path.display().to_string(),
            "created": written,
        }));
    } else if written {
        println!("Wrote {}", path.display());
    } else {
        println!("Config already exists at {}", path.display());
    }
    Ok(())
}

fn event_type_label(event: &Event) -> String {
    // The serde tag doubles as the display label.
    serde_json::to_value(event.event_type())
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn summarize(details: &EventDetails) -> String {
    match details {
        EventDetails::Lifecycle { message } => message.clone(),
        EventDetails::Control { message, .. } => message.clone(),
        EventDetails::Rotation { identity, reason } => {
            format!("rotated away from {identity} ({reason:?})")
        }
        EventDetails::Error { reason, message } => format!("{message} ({reason:?})"),
        EventDetails::OttCheck {
            service,
            identity,
            passed,
            score,
            drm_detected,
            error,
            ..
        } => {
            let mut line = format!(
                "{service} on {identity}: {} score={score}",
                if *passed { "PASS" } else { "FAIL" }
            );
            if *drm_detected {
                line.push_str(" drm");
            }
            if let Some(error) = error {
                line.push_str(&format!(" error={error}"));
            }
            line
        }
        EventDetails::DrmHandshake {
            service,
            identity,
            artifact,
        } => format!("{service} on {identity}: {artifact}"),
    }
}

fn join<'a>(ids: impl Iterator<Item = &'a Identity>) -> String {
    let ids: Vec<&str> = ids.map(Identity::as_str).collect();
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.join(", ")
    }
}
