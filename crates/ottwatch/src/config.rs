//! `config.toml` loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use ottwatch_monitor::config::{
    DEFAULT_LOOP_INTERVAL_SECS, DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL_SECS,
};
use ottwatch_monitor::{MonitorConfig, ServiceCheckSpec};

const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 3;
const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 120;
const REPUTATION_FILENAME: &str = "reputation.json";

/// Starter config written by `ottwatch init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# ottwatch configuration

[monitor]
max_retries = 3
loop_interval_secs = 300
poll_interval_secs = 5

[identity]
# Outbound identities, rotated in order.
pool = ["default"]
# TCP target that must be reachable for the link to count as healthy.
# probe = "8.8.8.8:53"
probe_timeout_secs = 3

[checker]
# "http" checks browser targets directly; "command" hands every check to an
# external automation program (JSON request on stdin, outcome on stdout).
kind = "http"
# command = ["python3", "check.py"]
timeout_secs = 120

# [telegram]
# bot_token = "123456:ABC"
# chat_id = "-100123456"

# [paths]
# artifacts = "/var/lib/ottwatch/artifacts"
# reputation = "/var/lib/ottwatch/state/reputation.json"
# events = "/var/lib/ottwatch/logs/events.jsonl"

[[services]]
name = "example"
mode = "browser"
url = "https://www.example.com"

# [[services]]
# name = "zee5-app"
# mode = "mobile"
# device = "emulator-5554"
# package = "com.graymatrix.did"
# activity = ".MainActivity"
"#;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub monitor: MonitorSection,
    pub identity: IdentitySection,
    pub checker: CheckerSection,
    pub telegram: Option<TelegramSection>,
    pub paths: PathsSection,
    pub services: Vec<ServiceCheckSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorSection {
    pub max_retries: u32,
    pub loop_interval_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            loop_interval_secs: DEFAULT_LOOP_INTERVAL_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentitySection {
    pub pool: Vec<String>,
    pub probe: Option<String>,
    pub probe_timeout_secs: u64,
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            pool: Vec::new(),
            probe: None,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckerKind {
    #[default]
    Http,
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckerSection {
    pub kind: CheckerKind,
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for CheckerSection {
    fn default() -> Self {
        Self {
            kind: CheckerKind::Http,
            command: Vec::new(),
            timeout_secs: DEFAULT_CHECK_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramSection {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsSection {
    pub artifacts: Option<PathBuf>,
    pub reputation: Option<PathBuf>,
    pub events: Option<PathBuf>,
}

impl AppConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| {
            format!(
                "cannot read config {} (run `ottwatch init` to create one)",
                path.display()
            )
        })?;
        let config = Self::parse(&raw).with_context(|| format!("in {}", path.display()))?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    /// For commands that only need paths.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw).context("invalid config TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.identity.pool.is_empty() {
            anyhow::bail!("identity.pool must list at least one identity");
        }
        if self.identity.pool.iter().any(|id| id.trim().is_empty()) {
            anyhow::bail!("identity.pool entries must not be blank");
        }
        if self.identity.probe.is_some() && self.identity.probe_timeout_secs == 0 {
            anyhow::bail!("identity.probe_timeout_secs must be greater than zero");
        }
        if self.checker.timeout_secs == 0 {
            anyhow::bail!("checker.timeout_secs must be greater than zero");
        }
        if self.checker.kind == CheckerKind::Command && self.checker.command.is_empty() {
            anyhow::bail!("checker.command is required when checker.kind = \"command\"");
        }
        if let Some(telegram) = &self.telegram {
            if telegram.bot_token.trim().is_empty() || telegram.chat_id.trim().is_empty() {
                anyhow::bail!("telegram.bot_token and telegram.chat_id are both required");
            }
        }
        self.monitor_config()
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid [monitor] or [[services]]")?;
        Ok(())
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            services: self.services.clone(),
            max_retries: self.monitor.max_retries,
            loop_interval: Duration::from_secs(self.monitor.loop_interval_secs),
            poll_interval: Duration::from_secs(self.monitor.poll_interval_secs),
        }
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.paths
            .artifacts
            .clone()
            .unwrap_or_else(ottwatch_common::paths::artifacts_dir)
    }

    pub fn reputation_path(&self) -> PathBuf {
        self.paths
            .reputation
            .clone()
            .unwrap_or_else(|| ottwatch_common::paths::state_dir().join(REPUTATION_FILENAME))
    }

    pub fn events_path(&self) -> PathBuf {
        self.paths
            .events
            .clone()
            .unwrap_or_else(ottwatch_monitor::store::events_path)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.checker.timeout_secs)
    }
}

/// Write [`DEFAULT_CONFIG_TOML`] to `path` unless a file is already there.
/// Returns whether a file was written.
pub fn write_default(path: &Path) -> anyhow::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    std::fs::write(path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ottwatch_monitor::CheckTarget;

    #[test]
    fn default_template_is_valid() {
        let config = AppConfig::parse(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(config.identity.pool, vec!["default"]);
        assert_eq!(config.checker.kind, CheckerKind::Http);
        assert_eq!(config.services.len(), 1);
        assert!(config.telegram.is_none());
    }

    #[test]
    fn parses_full_config() {
        let raw = r#"
[monitor]
max_retries = 5
loop_interval_secs = 60

[identity]
pool = ["203.0.113.10", "203.0.113.11"]
probe = "8.8.8.8:53"

[checker]
kind = "command"
command = ["python3", "check.py"]

[telegram]
bot_token = "T"
chat_id = "C"

[[services]]
name = "hotstar"
mode = "browser"
url = "https://www.hotstar.com"

[[services]]
name = "zee5-app"
mode = "mobile"
device = "emulator-5554"
package = "com.graymatrix.did"
activity = ".MainActivity"
"#;
        let config = AppConfig::parse(raw).unwrap();
        let monitor = config.monitor_config();
        assert_eq!(monitor.max_retries, 5);
        assert_eq!(monitor.loop_interval, Duration::from_secs(60));
        assert_eq!(monitor.poll_interval, Duration::from_secs(5));
        assert_eq!(config.identity.probe_timeout_secs, 3);
        assert_eq!(config.checker.timeout_secs, 120);
        assert!(matches!(
            &config.services[1].target,
            CheckTarget::Mobile { activity: Some(a), .. } if a == ".MainActivity"
        ));
    }

    #[test]
    fn rejects_empty_pool() {
        let err = AppConfig::parse("[identity]\npool = []\n").unwrap_err();
        assert!(format!("{err:#}").contains("identity.pool"));
    }

    #[test]
    fn rejects_duplicate_services() {
        let raw = r#"
[identity]
pool = ["a"]

[[services]]
name = "hotstar"
mode = "browser"
url = "https://www.hotstar.com"

[[services]]
name = "hotstar"
mode = "browser"
url = "https://www.hotstar.com/in"
"#;
        let err = AppConfig::parse(raw).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate service name"));
    }

    #[test]
    fn rejects_non_http_browser_url() {
        let raw = r#"
[identity]
pool = ["a"]

[[services]]
name = "x"
mode = "browser"
url = "file:///etc/passwd"
"#;
        assert!(AppConfig::parse(raw).is_err());
    }

    #[test]
    fn rejects_zero_retries() {
        let raw = "[monitor]\nmax_retries = 0\n[identity]\npool = [\"a\"]\n";
        let err = AppConfig::parse(raw).unwrap_err();
        assert!(format!("{err:#}").contains("max_retries"));
    }

    #[test]
    fn command_checker_needs_command() {
        let raw = "[identity]\npool = [\"a\"]\n[checker]\nkind = \"command\"\n";
        assert!(AppConfig::parse(raw).is_err());
    }

    #[test]
    fn rejects_unknown_keys() {
        let raw = "[identity]\npool = [\"a\"]\n[monitor]\nmax_retry = 2\n";
        assert!(AppConfig::parse(raw).is_err());
    }

    #[test]
    fn path_overrides_win() {
        let raw = "[identity]\npool = [\"a\"]\n[paths]\nevents = \"/tmp/ev.jsonl\"\n";
        let config = AppConfig::parse(raw).unwrap();
        assert_eq!(config.events_path(), PathBuf::from("/tmp/ev.jsonl"));
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let path = ottwatch_common::test::temp_dir("ottwatch-init").join("config.toml");
        assert!(write_default(&path).unwrap());
        std::fs::write(&path, "# mine\n").unwrap();
        assert!(!write_default(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine\n");
    }
}
