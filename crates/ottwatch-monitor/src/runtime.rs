use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::control::ControlSurface;
use crate::orchestrator::Orchestrator;

/// Runtime status for the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MonitorRuntimeStatus {
    pub running: bool,
}

struct RuntimeState {
    running: bool,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// Starts and stops the orchestrator loop on a background task.
pub struct MonitorRuntime {
    orchestrator: Orchestrator,
    state: Arc<tokio::sync::Mutex<RuntimeState>>,
}

impl MonitorRuntime {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            state: Arc::new(tokio::sync::Mutex::new(RuntimeState {
                running: false,
                cancel: None,
                task: None,
            })),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Returns `false` if the loop is already running.
    pub async fn start(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.running {
            return false;
        }
        let token = CancellationToken::new();
        state.cancel = Some(token.clone());
        state.running = true;

        let orchestrator = self.orchestrator.clone();
        let runtime_state = Arc::clone(&self.state);
        state.task = Some(tokio::spawn(async move {
            orchestrator.run(token).await;
            let mut guard = runtime_state.lock().await;
            guard.running = false;
            guard.cancel = None;
        }));

        true
    }

    /// Cancel the loop and wait for it to wind down. A tick in progress
    /// finishes first. Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let (token, task) = {
            let mut state = self.state.lock().await;
            let Some(token) = state.cancel.take() else {
                return false;
            };
            state.running = false;
            (token, state.task.take())
        };

        token.cancel();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Monitor task ended abnormally");
            }
        }
        true
    }

    pub async fn status(&self) -> MonitorRuntimeStatus {
        let state = self.state.lock().await;
        MonitorRuntimeStatus {
            running: state.running,
        }
    }

    pub fn control(&self) -> ControlSurface {
        self.orchestrator.control()
    }
}
