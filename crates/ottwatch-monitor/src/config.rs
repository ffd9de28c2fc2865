use std::collections::HashSet;
use std::time::Duration;

use crate::service::{validate_spec, ServiceCheckSpec};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_LOOP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Orchestrator tuning and the ordered list of services to check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub services: Vec<ServiceCheckSpec>,
    /// Consecutive failing iterations tolerated before safe mode.
    pub max_retries: u32,
    /// Sleep after a tick that ran checks.
    pub loop_interval: Duration,
    /// Sleep after a tick that did not (suspended, rotated, faulted).
    pub poll_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            loop_interval: Duration::from_secs(DEFAULT_LOOP_INTERVAL_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl MonitorConfig {
    pub fn with_services(services: Vec<ServiceCheckSpec>) -> Self {
        Self {
            services,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }
        if self.loop_interval.is_zero() {
            return Err("loop interval must be greater than zero".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("poll interval must be greater than zero".to_string());
        }

        let mut seen = HashSet::new();
        for spec in &self.services {
            validate_spec(spec)?;
            if !seen.insert(spec.name.as_str()) {
                return Err(format!("duplicate service name: {}", spec.name));
            }
        }
        Ok(())
    }
}
