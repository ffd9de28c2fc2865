//! Builds the monitor's collaborators from `config.toml`.

use std::sync::Arc;
use std::time::Duration;

use ottwatch_identity::{Identity, IdentityPool, IdentityProvider, LinkProbe, ReputationCache};
use ottwatch_monitor::{
    Checker, CommandChecker, EventHub, HttpChecker, JsonlEventStore, LogNotifier, Notifier,
    Orchestrator, TelegramNotifier,
};

use crate::config::{AppConfig, CheckerKind};

pub(crate) fn build_orchestrator(config: &AppConfig, hub: EventHub) -> anyhow::Result<Orchestrator> {
    let orchestrator = Orchestrator::builder(config.monitor_config())
        .identity(build_identity(config)?)
        .checker(build_checker(config)?)
        .reputation(Arc::new(ReputationCache::open(config.reputation_path())))
        .store(Arc::new(JsonlEventStore::new(config.events_path())))
        .notifier(build_notifier(config))
        .hub(hub)
        .build()?;
    Ok(orchestrator)
}

fn build_identity(config: &AppConfig) -> anyhow::Result<Arc<dyn IdentityProvider>> {
    let identities = config
        .identity
        .pool
        .iter()
        .map(|id| Identity::new(id.trim()))
        .collect();
    let probe = match &config.identity.probe {
        Some(target) => LinkProbe::Tcp {
            target: target.clone(),
            timeout: Duration::from_secs(config.identity.probe_timeout_secs),
        },
        None => LinkProbe::Always,
    };
    Ok(Arc::new(IdentityPool::with_probe(identities, probe)?))
}

fn build_checker(config: &AppConfig) -> anyhow::Result<Arc<dyn Checker>> {
    let artifacts = config.artifacts_dir();
    let timeout = config.check_timeout();
    let checker: Arc<dyn Checker> = match config.checker.kind {
        CheckerKind::Http => Arc::new(HttpChecker::new(artifacts, timeout)?),
        CheckerKind::Command => Arc::new(CommandChecker::new(
            &config.checker.command,
            timeout,
            artifacts,
        )?),
    };
    Ok(checker)
}

fn build_notifier(config: &AppConfig) -> Arc<dyn Notifier> {
    match &config.telegram {
        Some(telegram) => Arc::new(TelegramNotifier::new(
            telegram.bot_token.clone(),
            telegram.chat_id.clone(),
        )),
        None => Arc::new(LogNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ottwatch_monitor::Mode;

    fn config_in(dir: &std::path::Path, extra: &str) -> AppConfig {
        let raw = format!(
            "[identity]\npool = [\"a\", \"b\"]\n[paths]\nartifacts = {:?}\nreputation = {:?}\nevents = {:?}\n{extra}",
            dir.join("artifacts"),
            dir.join("reputation.json"),
            dir.join("events.jsonl"),
        );
        AppConfig::parse(&raw).unwrap()
    }

    #[tokio::test]
    async fn builds_from_minimal_config() {
        let dir = ottwatch_common::test::temp_dir("ottwatch-wiring");
        let config = config_in(&dir, "");

        let orchestrator = build_orchestrator(&config, EventHub::new()).unwrap();

        let status = orchestrator.status().await;
        assert_eq!(status.mode, Mode::Running);
        assert_eq!(status.current_identity, "a");
        assert!(dir.join("reputation.json").exists());
    }

    #[test]
    fn command_checker_is_selected() {
        let dir = ottwatch_common::test::temp_dir("ottwatch-wiring-cmd");
        let config = config_in(&dir, "[checker]\nkind = \"command\"\ncommand = [\"true\"]\n");
        assert!(build_checker(&config).is_ok());
    }
}
