use std::path::PathBuf;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "OTTWATCH_DATA_DIR";

/// Root data directory for ottwatch.
///
/// Holds the config file, reputation cache, event log and check artifacts.
///
/// - `OTTWATCH_DATA_DIR` when set
/// - Linux: `~/.ottwatch/`
/// - macOS: `~/Library/Application Support/ottwatch/`
/// - Windows: `%LOCALAPPDATA%\ottwatch\`
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("ottwatch");
        }
    }

    #[cfg(windows)]
    {
        if let Some(local) = std::env::var_os("LOCALAPPDATA") {
            return PathBuf::from(local).join("ottwatch");
        }
    }

    #[cfg(not(any(target_os = "macos", windows)))]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".ottwatch");
        }
    }

    // Fallback
    PathBuf::from(".ottwatch")
}

/// Default config file location.
pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Runtime state directory (reputation cache).
pub fn state_dir() -> PathBuf {
    data_dir().join("state")
}

/// Log directory (event log, optional tracing log).
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Check artifacts (page snapshots, screenshots handed back by checkers).
pub fn artifacts_dir() -> PathBuf {
    data_dir().join("artifacts")
}
