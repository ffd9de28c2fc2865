use std::sync::Arc;

use ottwatch_identity::Identity;

use crate::checker::Checker;
use crate::event::{Event, EventDetails};
use crate::hub::{EventHub, EventSink};
use crate::notify::{Alerter, Notifier};
use crate::service::{CheckOutcome, ServiceCheckSpec};
use crate::store::{EventStore, StoreError};

/// One service's result within an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub spec: ServiceCheckSpec,
    pub outcome: CheckOutcome,
    pub score: u32,
}

/// Ordered results of one pass over every configured service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationReport {
    pub identity: Identity,
    pub results: Vec<CheckResult>,
}

impl IterationReport {
    /// True when every check succeeded. An empty iteration passes.
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.outcome.success)
    }

    pub fn failed_services(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.outcome.success)
            .map(|r| r.spec.name.as_str())
            .collect()
    }
}

/// Runs every configured service check under one identity, strictly in
/// order, recording and alerting on each result as it arrives.
#[derive(Clone)]
pub struct CheckPipeline {
    checker: Arc<dyn Checker>,
    sink: EventSink,
    alerts: Alerter,
}

impl CheckPipeline {
    pub fn new(
        checker: Arc<dyn Checker>,
        store: Arc<dyn EventStore>,
        hub: EventHub,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::from_parts(checker, EventSink::new(store, hub), Alerter::new(notifier))
    }

    pub(crate) fn from_parts(checker: Arc<dyn Checker>, sink: EventSink, alerts: Alerter) -> Self {
        Self {
            checker,
            sink,
            alerts,
        }
    }

    /// Check every service. Only event-store failures abort the iteration;
    /// checker failures become failed results and notifier failures are
    /// logged.
    pub async fn run_iteration(
        &self,
        specs: &[ServiceCheckSpec],
        identity: &Identity,
    ) -> Result<IterationReport, StoreError> {
        let mut results = Vec::with_capacity(specs.len());
        for spec in specs {
            tracing::info!(service = %spec.name, mode = spec.target.mode(), identity = %identity, "Checking service");
            let outcome = self.invoke(spec, identity).await;
            let score = outcome.score();
            self.report(spec, identity, &outcome, score).await?;
            results.push(CheckResult {
                spec: spec.clone(),
                outcome,
                score,
            });
        }
        Ok(IterationReport {
            identity: identity.clone(),
            results,
        })
    }

    /// Runs the checker in its own task so a panic is contained to this
    /// check. The call is awaited to completion, never cancelled.
    async fn invoke(&self, spec: &ServiceCheckSpec, identity: &Identity) -> CheckOutcome {
        let checker = Arc::clone(&self.checker);
        let task_spec = spec.clone();
        let task_identity = identity.clone();
        let joined =
            tokio::spawn(async move { checker.check(&task_spec, &task_identity).await }).await;

        match joined {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::warn!(service = %spec.name, identity = %identity, error = %e, "Checker failed");
                CheckOutcome::errored(e.to_string())
            }
            Err(e) => {
                let message = crate::join_error_message(e);
                tracing::error!(service = %spec.name, identity = %identity, error = %message, "Checker panicked");
                CheckOutcome::errored(format!("checker panicked: {message}"))
            }
        }
    }

    async fn report(
        &self,
        spec: &ServiceCheckSpec,
        identity: &Identity,
        outcome: &CheckOutcome,
        score: u32,
    ) -> Result<(), StoreError> {
        self.sink.record(Event::now(EventDetails::OttCheck {
            service: spec.name.clone(),
            identity: identity.clone(),
            passed: outcome.success,
            score,
            drm_detected: outcome.drm_handshake_detected,
            artifact: outcome.final_artifact.clone(),
            error: outcome.error.clone(),
        }))?;

        let mut drm_reported = false;
        if outcome.drm_handshake_detected {
            if let Some(drm_artifact) = &outcome.drm_artifact {
                tracing::info!(service = %spec.name, identity = %identity, "DRM handshake detected");
                self.sink.record(Event::now(EventDetails::DrmHandshake {
                    service: spec.name.clone(),
                    identity: identity.clone(),
                    artifact: drm_artifact.clone(),
                }))?;
                self.alerts
                    .artifact(
                        Some(drm_artifact),
                        &format!("DRM handshake SUCCESS for {} on {}", spec.name, identity),
                    )
                    .await;
                drm_reported = true;
            }
        }

        let artifact = outcome.final_artifact.as_deref();
        if !outcome.success {
            let mut caption = format!("Check FAILED for {} on {}", spec.name, identity);
            if let Some(error) = &outcome.error {
                caption.push_str(&format!(" ({error})"));
            }
            self.alerts.artifact(artifact, &caption).await;
        } else if !drm_reported {
            self.alerts
                .artifact(
                    artifact,
                    &format!("Check PASSED for {} on {}", spec.name, identity),
                )
                .await;
        }
        Ok(())
    }
}
