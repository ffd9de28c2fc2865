use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use ottwatch_identity::{Identity, IdentityError, IdentityProvider, Reputation, ReputationCache};
use ottwatch_monitor::event::{ErrorReason, RotationReason};
use ottwatch_monitor::testing::{
    FailingEventStore, FakeIdentity, Notification, RecordingNotifier, Script, ScriptedChecker,
};
use ottwatch_monitor::{
    CheckOutcome, Checker, CheckerError, Event, EventDetails, EventType, MemoryEventStore, Mode,
    MonitorConfig, MonitorEvent, MonitorRuntime, Orchestrator, ServiceCheckSpec, TickOutcome,
};

struct Rig {
    orchestrator: Orchestrator,
    identity: Arc<FakeIdentity>,
    checker: Arc<ScriptedChecker>,
    store: Arc<MemoryEventStore>,
    notifier: Arc<RecordingNotifier>,
    reputation: Arc<ReputationCache>,
}

impl Rig {
    fn count(&self, event_type: EventType) -> usize {
        self.store
            .events()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    fn of_type(&self, event_type: EventType) -> Vec<Event> {
        self.store
            .events()
            .into_iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }
}

fn services() -> Vec<ServiceCheckSpec> {
    vec![
        ServiceCheckSpec::browser("hotstar", "https://www.hotstar.com"),
        ServiceCheckSpec::mobile("zee5-app", "emulator-5554", "com.graymatrix.did", None),
    ]
}

fn rig(pool: &[&str], checker: ScriptedChecker) -> Rig {
    rig_with(pool, checker, MonitorConfig::with_services(services()))
}

fn rig_with(pool: &[&str], checker: ScriptedChecker, config: MonitorConfig) -> Rig {
    let identity = Arc::new(FakeIdentity::new(pool));
    let checker = Arc::new(checker);
    let store = Arc::new(MemoryEventStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let reputation = Arc::new(ReputationCache::in_memory());

    let orchestrator = Orchestrator::builder(config)
        .identity(identity.clone())
        .checker(checker.clone())
        .store(store.clone())
        .notifier(notifier.clone())
        .reputation(reputation.clone())
        .build()
        .unwrap();

    Rig {
        orchestrator,
        identity,
        checker,
        store,
        notifier,
        reputation,
    }
}

fn fail_on(identity: &'static str) -> ScriptedChecker {
    ScriptedChecker::new(move |_, id| {
        if id.as_str() == identity {
            Script::Outcome(CheckOutcome::failed(None))
        } else {
            Script::Outcome(CheckOutcome::passed(None))
        }
    })
}

#[tokio::test]
async fn passing_iteration_resets_retries_and_records_last_good() {
    let rig = rig(&["a", "b"], fail_on("a"));

    assert_eq!(
        rig.orchestrator.tick().await,
        TickOutcome::Checked { passed: false }
    );
    assert_eq!(rig.orchestrator.status().await.retry_count, 1);

    assert_eq!(
        rig.orchestrator.tick().await,
        TickOutcome::Checked { passed: true }
    );
    let status = rig.orchestrator.status().await;
    assert_eq!(status.retry_count, 0);
    assert_eq!(status.last_known_good_identity.as_deref(), Some("b"));
    assert_eq!(rig.identity.last_good(), Some(Identity::new("b")));
    assert_eq!(
        rig.reputation.snapshot().reputation_of(&Identity::new("b")),
        Some(Reputation::Good)
    );
}

#[tokio::test]
async fn failing_check_flags_identity_and_rotates() {
    let checker = ScriptedChecker::new(|spec, _| {
        if spec.name == "zee5-app" {
            Script::Outcome(CheckOutcome::failed(None))
        } else {
            Script::Outcome(CheckOutcome::passed(None))
        }
    });
    let rig = rig(&["A", "B"], checker);

    rig.orchestrator.tick().await;

    let a = Identity::new("A");
    assert!(rig.reputation.is_flagged(&a));
    let rotations = rig.of_type(EventType::Rotation);
    assert_eq!(rotations.len(), 1);
    assert_eq!(
        rotations[0].details,
        EventDetails::Rotation {
            identity: a,
            reason: RotationReason::ChecksFailed,
        }
    );
    let status = rig.orchestrator.status().await;
    assert_eq!(status.retry_count, 1);
    assert_eq!(status.mode, Mode::Running);
    assert_eq!(status.current_identity, "B");
    // Both services ran even though the second one failed.
    assert_eq!(rig.checker.calls().len(), 2);
}

#[tokio::test]
async fn unhealthy_link_enters_safe_mode_once() {
    let rig = rig(&["a"], ScriptedChecker::passing());
    rig.identity.set_healthy(false);

    assert_eq!(rig.orchestrator.tick().await, TickOutcome::SafeModeEntered);
    assert_eq!(rig.orchestrator.status().await.mode, Mode::SafeMode);
    assert_eq!(rig.count(EventType::Error), 1);
    assert!(rig.checker.calls().is_empty());
    assert!(rig
        .notifier
        .sent()
        .iter()
        .any(|n| matches!(n, Notification::Text(t) if t.contains("SAFE MODE"))));

    assert_eq!(rig.orchestrator.tick().await, TickOutcome::Suspended);
    assert_eq!(rig.count(EventType::Error), 1);
}

#[tokio::test]
async fn forced_rotation_skips_checks_and_is_consumed() {
    let rig = rig(&["a", "b"], ScriptedChecker::passing());
    rig.orchestrator.control().force_rotate().await;

    assert_eq!(rig.orchestrator.tick().await, TickOutcome::Rotated);
    assert!(rig.checker.calls().is_empty());
    assert_eq!(rig.identity.rotations(), 1);
    assert_eq!(
        rig.of_type(EventType::Rotation)[0].details,
        EventDetails::Rotation {
            identity: Identity::new("a"),
            reason: RotationReason::Forced,
        }
    );

    assert_eq!(
        rig.orchestrator.tick().await,
        TickOutcome::Checked { passed: true }
    );
    assert_eq!(rig.identity.rotations(), 1);
    assert_eq!(rig.checker.calls().len(), 2);
}

#[tokio::test]
async fn flagged_identity_is_rotated_without_checks() {
    let rig = rig(&["a", "b"], ScriptedChecker::passing());
    rig.reputation.classify(&Identity::new("a"), Reputation::Bad);

    assert_eq!(rig.orchestrator.tick().await, TickOutcome::Rotated);
    assert!(rig.checker.calls().is_empty());
    assert_eq!(rig.orchestrator.status().await.current_identity, "b");
    assert!(matches!(
        rig.of_type(EventType::Rotation)[0].details,
        EventDetails::Rotation {
            reason: RotationReason::Flagged,
            ..
        }
    ));
}

#[tokio::test]
async fn resume_clears_pause_and_safe_mode_but_keeps_retries() {
    let rig = rig(&["a", "b"], fail_on("a"));
    rig.orchestrator.tick().await;
    rig.identity.set_healthy(false);
    rig.orchestrator.tick().await;
    let control = rig.orchestrator.control();
    control.pause().await;
    assert_eq!(control.status().await.mode, Mode::SafeMode);

    control.resume().await;

    let status = control.status().await;
    assert_eq!(status.mode, Mode::Running);
    assert!(!status.paused && !status.safe_mode);
    assert_eq!(status.retry_count, 1);
}

#[tokio::test]
async fn third_consecutive_failure_enters_safe_mode() {
    let config = MonitorConfig {
        max_retries: 3,
        ..MonitorConfig::with_services(services())
    };
    let rig = rig_with(&["a", "b", "c", "d"], ScriptedChecker::failing(), config);

    for expected_retries in 1..=2 {
        assert_eq!(
            rig.orchestrator.tick().await,
            TickOutcome::Checked { passed: false }
        );
        let status = rig.orchestrator.status().await;
        assert_eq!(status.retry_count, expected_retries);
        assert_eq!(status.mode, Mode::Running);
    }

    assert_eq!(rig.orchestrator.tick().await, TickOutcome::SafeModeEntered);
    let status = rig.orchestrator.status().await;
    assert_eq!(status.retry_count, 3);
    assert_eq!(status.mode, Mode::SafeMode);

    let errors = rig.of_type(EventType::Error);
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0].details,
        EventDetails::Error {
            reason: ErrorReason::RetriesExhausted,
            ..
        }
    ));
}

#[tokio::test]
async fn drm_handshake_is_reported_instead_of_generic_pass() {
    let config = MonitorConfig::with_services(vec![ServiceCheckSpec::browser(
        "hotstar",
        "https://www.hotstar.com",
    )]);
    let checker = ScriptedChecker::new(|_, _| {
        Script::Outcome(
            CheckOutcome::passed(Some("/shots/final.png".to_string())).with_drm("/shots/drm.png"),
        )
    });
    let rig = rig_with(&["B"], checker, config);

    assert_eq!(
        rig.orchestrator.tick().await,
        TickOutcome::Checked { passed: true }
    );

    assert_eq!(rig.count(EventType::OttCheck), 1);
    assert_eq!(rig.count(EventType::DrmHandshake), 1);
    assert_eq!(
        rig.notifier.sent(),
        vec![Notification::Artifact {
            artifact: "/shots/drm.png".to_string(),
            caption: "DRM handshake SUCCESS for hotstar on B".to_string(),
        }]
    );
}

#[tokio::test]
async fn pausing_twice_records_two_control_events() {
    let rig = rig(&["a"], ScriptedChecker::passing());
    let control = rig.orchestrator.control();

    control.pause().await;
    control.pause().await;

    assert_eq!(control.status().await.mode, Mode::Paused);
    assert_eq!(rig.count(EventType::Control), 2);
    assert_eq!(rig.orchestrator.tick().await, TickOutcome::Suspended);
    assert!(rig.checker.calls().is_empty());
}

#[tokio::test]
async fn panicking_checker_fails_the_check_only() {
    let rig = rig(&["a", "b"], ScriptedChecker::new(|_, _| {
        Script::Panic("chromedriver died".to_string())
    }));

    assert_eq!(
        rig.orchestrator.tick().await,
        TickOutcome::Checked { passed: false }
    );
    let checks = rig.of_type(EventType::OttCheck);
    assert_eq!(checks.len(), 2);
    assert!(matches!(
        &checks[0].details,
        EventDetails::OttCheck { error: Some(e), .. } if e.contains("chromedriver died")
    ));
    assert_eq!(rig.orchestrator.status().await.mode, Mode::Running);
}

struct PanickingLink;

#[async_trait]
impl IdentityProvider for PanickingLink {
    fn current(&self) -> Identity {
        Identity::new("a")
    }

    async fn rotate(&self) -> Result<Identity, IdentityError> {
        Ok(Identity::new("a"))
    }

    async fn healthy(&self) -> bool {
        panic!("usb modem vanished")
    }

    fn record_last_good(&self, _identity: &Identity) {}

    fn last_good(&self) -> Option<Identity> {
        None
    }
}

#[tokio::test]
async fn panic_inside_a_tick_enters_safe_mode() {
    let store = Arc::new(MemoryEventStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let orchestrator = Orchestrator::builder(MonitorConfig::with_services(services()))
        .identity(Arc::new(PanickingLink))
        .checker(Arc::new(ScriptedChecker::passing()))
        .store(store.clone())
        .notifier(notifier.clone())
        .build()
        .unwrap();

    assert_eq!(orchestrator.tick().await, TickOutcome::Faulted);
    assert_eq!(orchestrator.status().await.mode, Mode::SafeMode);

    let events = store.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0].details,
        EventDetails::Error { reason: ErrorReason::Unexpected, message } if message.contains("usb modem vanished")
    ));
    assert!(matches!(
        &notifier.sent()[0],
        Notification::Text(t) if t.starts_with("UNEXPECTED ERROR")
    ));

    // The loop carries on: later ticks are simply suspended.
    assert_eq!(orchestrator.tick().await, TickOutcome::Suspended);
}

#[tokio::test]
async fn rotation_failure_faults_the_tick() {
    let rig = rig(&["a", "b"], ScriptedChecker::passing());
    rig.identity.set_fail_rotation(true);
    rig.orchestrator.control().force_rotate().await;

    assert_eq!(rig.orchestrator.tick().await, TickOutcome::Faulted);
    assert_eq!(rig.orchestrator.status().await.mode, Mode::SafeMode);
    assert!(rig.of_type(EventType::Error).iter().any(|e| matches!(
        &e.details,
        EventDetails::Error { message, .. } if message.contains("modem not responding")
    )));
}

#[tokio::test]
async fn forced_rotation_survives_a_failed_rotation() {
    let rig = rig(&["a", "b"], ScriptedChecker::passing());
    rig.identity.set_fail_rotation(true);
    rig.orchestrator.control().force_rotate().await;
    assert_eq!(rig.orchestrator.tick().await, TickOutcome::Faulted);

    rig.identity.set_fail_rotation(false);
    rig.orchestrator.control().resume().await;

    assert_eq!(rig.orchestrator.tick().await, TickOutcome::Rotated);
    assert_eq!(rig.identity.rotations(), 1);
    assert!(rig.checker.calls().is_empty());
    assert_eq!(rig.orchestrator.status().await.current_identity, "b");

    // Consumed once the rotation went through.
    assert_eq!(
        rig.orchestrator.tick().await,
        TickOutcome::Checked { passed: true }
    );
}

#[tokio::test]
async fn store_failure_faults_the_tick_but_still_reaches_subscribers() {
    let store = Arc::new(FailingEventStore::new());
    let orchestrator = Orchestrator::builder(MonitorConfig::with_services(services()))
        .identity(Arc::new(FakeIdentity::new(&["a"])))
        .checker(Arc::new(ScriptedChecker::passing()))
        .store(store.clone())
        .build()
        .unwrap();
    let mut rx = orchestrator.control().subscribe();

    assert_eq!(orchestrator.tick().await, TickOutcome::Faulted);
    assert_eq!(orchestrator.status().await.mode, Mode::SafeMode);
    assert!(store.rejected() >= 2);

    let mut saw_error = false;
    while let Ok(item) = rx.try_recv() {
        if let MonitorEvent::Event(event) = item {
            if event.event_type() == EventType::Error {
                saw_error = true;
            }
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn idle_subscriber_never_blocks_ticks() {
    let rig = rig(&["a"], ScriptedChecker::passing());
    let mut rx = rig.orchestrator.control().subscribe();

    // Each tick emits several items; 200 ticks overflow the buffer.
    tokio::time::timeout(Duration::from_secs(30), async {
        for _ in 0..200 {
            rig.orchestrator.tick().await;
        }
    })
    .await
    .expect("ticks must not block on a full subscriber");

    assert!(matches!(
        rx.recv().await,
        Err(tokio::sync::broadcast::error::RecvError::Lagged(_))
    ));
}

#[tokio::test]
async fn subscribers_see_events_and_status_in_order() {
    let rig = rig(&["a"], ScriptedChecker::passing());
    let mut rx = rig.orchestrator.control().subscribe();

    rig.orchestrator.tick().await;

    let mut kinds = Vec::new();
    while let Ok(item) = rx.try_recv() {
        kinds.push(match item {
            MonitorEvent::Event(event) => format!("{:?}", event.event_type()),
            MonitorEvent::Status(_) => "Status".to_string(),
            MonitorEvent::Log(_) => continue,
        });
    }
    assert_eq!(kinds, vec!["OttCheck", "OttCheck", "Status"]);
}

#[tokio::test]
async fn runtime_start_and_stop() {
    let config = MonitorConfig {
        loop_interval: Duration::from_secs(3600),
        poll_interval: Duration::from_millis(10),
        ..MonitorConfig::with_services(services())
    };
    let rig = rig_with(&["a"], ScriptedChecker::passing(), config);
    let runtime = MonitorRuntime::new(rig.orchestrator.clone());
    let mut rx = runtime.control().subscribe();

    assert!(runtime.start().await);
    assert!(!runtime.start().await);
    assert!(runtime.status().await.running);

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(MonitorEvent::Status(status)) = rx.recv().await {
                if status.last_known_good_identity.is_some() {
                    break;
                }
            }
        }
    })
    .await
    .expect("first iteration completes");

    assert!(runtime.stop().await);
    assert!(!runtime.stop().await);
    assert!(!runtime.status().await.running);

    let lifecycle: Vec<_> = rig
        .of_type(EventType::Lifecycle)
        .into_iter()
        .map(|e| match e.details {
            EventDetails::Lifecycle { message } => message,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(lifecycle, vec!["Monitor started", "Monitor stopped"]);
    assert_eq!(
        rig.notifier.sent().first(),
        Some(&Notification::Text("Monitor started".to_string()))
    );
}

/// Checker that holds each check open until released.
struct GatedChecker {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Checker for GatedChecker {
    async fn check(
        &self,
        _spec: &ServiceCheckSpec,
        _identity: &Identity,
    ) -> Result<CheckOutcome, CheckerError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(CheckOutcome::passed(None))
    }
}

#[tokio::test]
async fn pause_during_a_check_applies_at_the_next_tick() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let config = MonitorConfig::with_services(vec![ServiceCheckSpec::browser(
        "hotstar",
        "https://www.hotstar.com",
    )]);
    let orchestrator = Orchestrator::builder(config)
        .identity(Arc::new(FakeIdentity::new(&["a", "b"])))
        .checker(Arc::new(GatedChecker {
            entered: entered.clone(),
            release: release.clone(),
        }))
        .build()
        .unwrap();

    let in_flight = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.tick().await })
    };
    tokio::time::timeout(Duration::from_secs(5), entered.notified())
        .await
        .expect("check started");

    orchestrator.control().pause().await;
    release.notify_one();

    let outcome = tokio::time::timeout(Duration::from_secs(5), in_flight)
        .await
        .expect("tick finished")
        .unwrap();
    assert_eq!(outcome, TickOutcome::Checked { passed: true });
    assert_eq!(orchestrator.status().await.mode, Mode::Paused);
    assert_eq!(orchestrator.tick().await, TickOutcome::Suspended);
}
