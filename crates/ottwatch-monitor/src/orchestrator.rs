use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use ottwatch_identity::{IdentityProvider, Reputation, ReputationCache};

use crate::checker::Checker;
use crate::config::MonitorConfig;
use crate::control::ControlSurface;
use crate::event::{ErrorReason, Event, RotationReason};
use crate::hub::{EventHub, EventSink};
use crate::notify::{Alerter, LogNotifier, Notifier};
use crate::pipeline::CheckPipeline;
use crate::state::{OrchestratorState, StatusSnapshot};
use crate::store::{EventStore, MemoryEventStore};
use crate::MonitorError;

/// What one tick of the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Paused or in safe mode; nothing ran.
    Suspended,
    /// The link was unhealthy or retries ran out.
    SafeModeEntered,
    /// The identity was flagged or a rotation was requested; no checks ran.
    Rotated,
    /// Every configured service was checked.
    Checked { passed: bool },
    /// The tick hit an unexpected error or panic and entered safe mode.
    Faulted,
}

/// State and collaborators shared by the loop and the control surface.
pub(crate) struct MonitorShared {
    config: MonitorConfig,
    pub(crate) state: Mutex<OrchestratorState>,
    identity: Arc<dyn IdentityProvider>,
    reputation: Arc<ReputationCache>,
    pipeline: CheckPipeline,
    pub(crate) sink: EventSink,
    alerts: Alerter,
}

impl MonitorShared {
    pub(crate) async fn status(&self) -> StatusSnapshot {
        let state = self.state.lock().await;
        state.snapshot(&self.identity.current())
    }

    pub(crate) async fn publish_status(&self) {
        let snapshot = self.status().await;
        self.sink.status(snapshot);
    }

    async fn tick_body(&self) -> Result<TickOutcome, MonitorError> {
        if self.state.lock().await.is_suspended() {
            tracing::debug!("Monitor suspended, skipping tick");
            return Ok(TickOutcome::Suspended);
        }

        if !self.identity.healthy().await {
            self.state.lock().await.safe_mode = true;
            tracing::error!("Link health check failed. Entering SAFE MODE");
            self.sink.record(Event::error(
                ErrorReason::LinkUnhealthy,
                "Link health check failed",
            ))?;
            self.alerts
                .text("Link health check failed. Entering SAFE MODE.")
                .await;
            self.publish_status().await;
            return Ok(TickOutcome::SafeModeEntered);
        }

        let current = self.identity.current();
        let flagged = self.reputation.is_flagged(&current);
        let forced = {
            let mut state = self.state.lock().await;
            if state.is_suspended() {
                return Ok(TickOutcome::Suspended);
            }
            state.force_rotate_requested
        };

        if flagged || forced {
            let reason = if forced {
                RotationReason::Forced
            } else {
                RotationReason::Flagged
            };
            tracing::warn!(identity = %current, ?reason, "Rotating identity");
            self.sink.record(Event::rotation(&current, reason))?;
            let next = self.identity.rotate().await?;
            if forced {
                // Cleared only once acted upon; a failed rotation keeps the request.
                self.state.lock().await.force_rotate_requested = false;
            }
            tracing::info!(from = %current, to = %next, "Identity rotated");
            self.publish_status().await;
            return Ok(TickOutcome::Rotated);
        }

        let report = self
            .pipeline
            .run_iteration(&self.config.services, &current)
            .await?;

        if report.passed() {
            self.reputation.classify(&current, Reputation::Good);
            self.identity.record_last_good(&current);
            {
                let mut state = self.state.lock().await;
                state.last_known_good = Some(current.clone());
                state.retry_count = 0;
            }
            tracing::info!(identity = %current, services = report.results.len(), "All checks passed");
            self.publish_status().await;
            return Ok(TickOutcome::Checked { passed: true });
        }

        self.reputation.classify(&current, Reputation::Bad);
        let (retries, exhausted) = {
            let mut state = self.state.lock().await;
            state.retry_count += 1;
            let exhausted = state.retry_count >= self.config.max_retries;
            if exhausted {
                state.safe_mode = true;
            }
            (state.retry_count, exhausted)
        };
        tracing::warn!(
            identity = %current,
            failed = ?report.failed_services(),
            retries,
            "Checks failed. Rotating identity"
        );
        self.sink
            .record(Event::rotation(&current, RotationReason::ChecksFailed))?;
        let next = self.identity.rotate().await?;
        tracing::info!(from = %current, to = %next, "Identity rotated");

        if exhausted {
            tracing::error!(retries, "Max retries reached. Entering SAFE MODE");
            self.sink.record(Event::error(
                ErrorReason::RetriesExhausted,
                format!("Max retries reached ({retries})"),
            ))?;
            self.alerts
                .text("Max retries reached. Entering SAFE MODE.")
                .await;
            self.publish_status().await;
            return Ok(TickOutcome::SafeModeEntered);
        }

        self.publish_status().await;
        Ok(TickOutcome::Checked { passed: false })
    }

    async fn enter_fault(&self, message: &str) {
        self.state.lock().await.safe_mode = true;
        tracing::error!(error = %message, "Unexpected error. Entering SAFE MODE");
        self.sink.record_lossy(Event::error(
            ErrorReason::Unexpected,
            format!("Unexpected error: {message}"),
        ));
        self.alerts
            .text(&format!("UNEXPECTED ERROR: {message}. Entering SAFE MODE."))
            .await;
        self.publish_status().await;
    }
}

/// The monitoring loop. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<MonitorShared>,
}

impl Orchestrator {
    pub fn builder(config: MonitorConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Run one state-machine step.
    ///
    /// The step runs in its own task; any error or panic inside it puts the
    /// monitor into safe mode and is recorded, so this never fails.
    pub async fn tick(&self) -> TickOutcome {
        let shared = Arc::clone(&self.shared);
        let joined = tokio::spawn(async move { shared.tick_body().await }).await;

        let error = match joined {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(e)) => e,
            Err(e) => MonitorError::TaskPanicked(crate::join_error_message(e)),
        };
        self.shared.enter_fault(&error.to_string()).await;
        TickOutcome::Faulted
    }

    /// Tick until `cancel` fires. A tick in progress always completes;
    /// cancellation is observed while sleeping between ticks.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            services = self.shared.config.services.len(),
            max_retries = self.shared.config.max_retries,
            "Monitor started"
        );
        self.shared.sink.record_lossy(Event::lifecycle("Monitor started"));
        self.shared.alerts.text("Monitor started").await;

        while !cancel.is_cancelled() {
            let outcome = self.tick().await;
            let pause = self.pause_after(outcome);
            tracing::debug!(?outcome, pause_secs = pause.as_secs_f64(), "Tick finished");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        self.shared.sink.record_lossy(Event::lifecycle("Monitor stopped"));
        tracing::info!("Monitor stopped");
    }

    fn pause_after(&self, outcome: TickOutcome) -> Duration {
        match outcome {
            TickOutcome::Checked { .. } => self.shared.config.loop_interval,
            _ => self.shared.config.poll_interval,
        }
    }

    pub fn control(&self) -> ControlSurface {
        ControlSurface::new(Arc::clone(&self.shared))
    }

    pub async fn status(&self) -> StatusSnapshot {
        self.shared.status().await
    }

    pub fn hub(&self) -> &EventHub {
        self.shared.sink.hub()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }
}

/// Assembles an [`Orchestrator`]. Identity and checker are required; the
/// rest default to in-memory or log-only implementations.
pub struct OrchestratorBuilder {
    config: MonitorConfig,
    identity: Option<Arc<dyn IdentityProvider>>,
    checker: Option<Arc<dyn Checker>>,
    reputation: Option<Arc<ReputationCache>>,
    store: Option<Arc<dyn EventStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    hub: Option<EventHub>,
}

impl OrchestratorBuilder {
    fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            identity: None,
            checker: None,
            reputation: None,
            store: None,
            notifier: None,
            hub: None,
        }
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn checker(mut self, checker: Arc<dyn Checker>) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn reputation(mut self, reputation: Arc<ReputationCache>) -> Self {
        self.reputation = Some(reputation);
        self
    }

    pub fn store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Share an existing hub, e.g. one a log layer already publishes into.
    pub fn hub(mut self, hub: EventHub) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn build(self) -> Result<Orchestrator, MonitorError> {
        self.config.validate().map_err(MonitorError::InvalidConfig)?;
        let identity = self
            .identity
            .ok_or_else(|| MonitorError::InvalidConfig("identity provider is required".into()))?;
        let checker = self
            .checker
            .ok_or_else(|| MonitorError::InvalidConfig("checker is required".into()))?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryEventStore::new()));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));
        let sink = EventSink::new(store, self.hub.unwrap_or_default());
        let alerts = Alerter::new(notifier);

        Ok(Orchestrator {
            shared: Arc::new(MonitorShared {
                config: self.config,
                state: Mutex::new(OrchestratorState::default()),
                identity,
                reputation: self
                    .reputation
                    .unwrap_or_else(|| Arc::new(ReputationCache::in_memory())),
                pipeline: CheckPipeline::from_parts(checker, sink.clone(), alerts.clone()),
                sink,
                alerts,
            }),
        })
    }
}
