//! Feature register / read / unregister against an in-memory features API.

use async_trait::async_trait;
use statewait::lifecycle::{Feature, FeatureId, FeatureLifecycle, FeaturesClient};
use statewait::{Error, ProbeError, ProbeErrorKind, Timeouts, WaitError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Each `get` pops the next scripted state for that feature; the last one repeats.
#[derive(Default)]
struct FakeFeatures {
    states: Mutex<HashMap<String, VecDeque<Option<&'static str>>>>,
    register_state: Mutex<Option<&'static str>>,
    unregister_state: Mutex<Option<&'static str>>,
    gets: AtomicUsize,
    registers: AtomicUsize,
    unregisters: AtomicUsize,
}

impl FakeFeatures {
    fn script(self, name: &str, states: &[Option<&'static str>]) -> Self {
        self.states
            .lock()
            .unwrap()
            .insert(name.to_string(), states.iter().copied().collect());
        self
    }

    fn on_register(self, state: &'static str) -> Self {
        *self.register_state.lock().unwrap() = Some(state);
        self
    }

    fn on_unregister(self, state: &'static str) -> Self {
        *self.unregister_state.lock().unwrap() = Some(state);
        self
    }

    fn feature(name: &str, state: Option<&str>) -> Feature {
        Feature {
            name: Some(name.to_string()),
            state: state.map(str::to_string),
        }
    }
}

#[async_trait]
impl FeaturesClient for FakeFeatures {
    async fn get(&self, _namespace: &str, name: &str) -> Result<Feature, ProbeError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let mut states = self.states.lock().unwrap();
        let script = states
            .get_mut(name)
            .ok_or_else(|| ProbeError::not_found(format!("feature {name} not found")))?;
        let state = if script.len() > 1 {
            script.pop_front().flatten()
        } else {
            script.front().copied().flatten()
        };
        Ok(Self::feature(name, state))
    }

    async fn register(&self, _namespace: &str, name: &str) -> Result<Feature, ProbeError> {
        self.registers.fetch_add(1, Ordering::SeqCst);
        Ok(Self::feature(name, *self.register_state.lock().unwrap()))
    }

    async fn unregister(&self, _namespace: &str, name: &str) -> Result<Feature, ProbeError> {
        self.unregisters.fetch_add(1, Ordering::SeqCst);
        Ok(Self::feature(name, *self.unregister_state.lock().unwrap()))
    }
}

fn feature_id(name: &str) -> FeatureId {
    FeatureId::new("00000000-0000-0000-0000-000000000000", "Microsoft.Compute", name)
}

fn lifecycle(client: Arc<FakeFeatures>) -> FeatureLifecycle<FakeFeatures> {
    FeatureLifecycle::new(client)
        .with_min_poll_interval(Duration::from_secs(5))
        .with_timeouts(Timeouts::new().with_create(Duration::from_secs(60)))
}

#[tokio::test(start_paused = true)]
async fn test_create_waits_for_registered() {
    let client = Arc::new(
        FakeFeatures::default()
            .script(
                "AllowX",
                &[
                    Some("NotRegistered"),
                    Some("Registering"),
                    Some("registering"),
                    Some("REGISTERED"),
                ],
            )
            .on_register("Registering"),
    );

    let feature = lifecycle(client.clone())
        .create(&CancellationToken::new(), &feature_id("AllowX"))
        .await
        .unwrap();

    assert_eq!(feature.state.as_deref(), Some("REGISTERED"));
    assert_eq!(client.registers.load(Ordering::SeqCst), 1);
    // existence check, three probes, final read
    assert_eq!(client.gets.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_create_refuses_manual_approval_feature() {
    let client = Arc::new(FakeFeatures::default().script("Gated", &[Some("Pending")]));

    let err = lifecycle(client.clone())
        .create(&CancellationToken::new(), &feature_id("Gated"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ManualApprovalRequired { .. }));
    assert_eq!(client.registers.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_create_existing_feature_requires_import() {
    let client = Arc::new(FakeFeatures::default().script("Done", &[Some("Registered")]));

    let err = lifecycle(client.clone())
        .create(&CancellationToken::new(), &feature_id("Done"))
        .await
        .unwrap_err();

    match err {
        Error::AlreadyExists { id } => assert!(id.ends_with("/features/Done")),
        other => panic!("expected AlreadyExists, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_create_register_response_pending() {
    let client = Arc::new(
        FakeFeatures::default()
            .script("Gated", &[Some("NotRegistered")])
            .on_register("pending"),
    );

    let err = lifecycle(client)
        .create(&CancellationToken::new(), &feature_id("Gated"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ManualApprovalRequired { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_create_stops_on_unexpected_state() {
    let client = Arc::new(
        FakeFeatures::default()
            .script("Flip", &[None, Some("Registering"), Some("Pending")])
            .on_register("Registering"),
    );

    let err = lifecycle(client.clone())
        .create(&CancellationToken::new(), &feature_id("Flip"))
        .await
        .unwrap_err();

    match err.as_wait() {
        Some(WaitError::UnexpectedState { status, identity, .. }) => {
            assert_eq!(status, "Pending");
            assert!(identity.contains("Flip"));
        }
        other => panic!("expected unexpected state, got {other:?}"),
    }
    assert_eq!(client.gets.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_create_times_out_within_budget() {
    let client = Arc::new(
        FakeFeatures::default()
            .script("Slow", &[Some("NotRegistered"), Some("Registering")])
            .on_register("Registering"),
    );
    let start = Instant::now();

    let err = lifecycle(client)
        .create(&CancellationToken::new(), &feature_id("Slow"))
        .await
        .unwrap_err();

    let wait = err.as_wait().expect("wait error");
    assert!(wait.is_retryable());
    assert_eq!(wait.last_status(), Some("Registering"));
    assert!(start.elapsed() <= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_create_cancelled_by_parent() {
    let client = Arc::new(
        FakeFeatures::default()
            .script("Slow", &[Some("NotRegistered"), Some("Registering")])
            .on_register("Registering"),
    );
    let root = CancellationToken::new();
    let trigger = root.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(7)).await;
        trigger.cancel();
    });

    let err = lifecycle(client)
        .create(&root, &feature_id("Slow"))
        .await
        .unwrap_err();

    let wait = err.as_wait().expect("wait error");
    assert_eq!(wait.class(), "cancelled");
    assert!(!wait.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_read_reports_unregistered_feature() {
    let client = Arc::new(FakeFeatures::default().script("Off", &[Some("Unregistered")]));

    let err = lifecycle(client)
        .read(&CancellationToken::new(), &feature_id("Off"))
        .await
        .unwrap_err();

    match err {
        Error::NotRegistered { state, .. } => assert_eq!(state, "Unregistered"),
        other => panic!("expected NotRegistered, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_read_missing_feature_is_remote_error() {
    let client = Arc::new(FakeFeatures::default());

    let err = lifecycle(client)
        .read(&CancellationToken::new(), &feature_id("Ghost"))
        .await
        .unwrap_err();

    match err {
        Error::Remote { source, .. } => assert_eq!(source.kind(), ProbeErrorKind::NotFound),
        other => panic!("expected Remote, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_delete_waits_for_either_target() {
    for terminal in ["NotRegistered", "Unregistered"] {
        let client = Arc::new(
            FakeFeatures::default()
                .script("AllowX", &[Some("Unregistering"), Some(terminal)])
                .on_unregister("Unregistering"),
        );

        lifecycle(client.clone())
            .delete(&CancellationToken::new(), &feature_id("AllowX"))
            .await
            .unwrap();

        assert_eq!(client.unregisters.load(Ordering::SeqCst), 1);
        assert_eq!(client.gets.load(Ordering::SeqCst), 2);
    }
}

#[tokio::test(start_paused = true)]
async fn test_delete_probe_without_state_fails() {
    let client = Arc::new(
        FakeFeatures::default()
            .script("NoState", &[None])
            .on_unregister("Unregistering"),
    );

    let err = lifecycle(client)
        .delete(&CancellationToken::new(), &feature_id("NoState"))
        .await
        .unwrap_err();

    match err.as_wait() {
        Some(WaitError::Probe { source, .. }) => {
            assert_eq!(source.kind(), ProbeErrorKind::MissingState)
        }
        other => panic!("expected probe failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_creates_share_client() {
    let client = Arc::new(
        FakeFeatures::default()
            .script("A", &[None, Some("Registering"), Some("Registered")])
            .script(
                "B",
                &[None, Some("Registering"), Some("Registering"), Some("Registered")],
            )
            .on_register("Registering"),
    );
    let features = Arc::new(lifecycle(client.clone()));
    let root = CancellationToken::new();

    let mut handles = Vec::new();
    for name in ["A", "B"] {
        let features = features.clone();
        let root = root.clone();
        handles.push(tokio::spawn(async move {
            features.create(&root, &feature_id(name)).await
        }));
    }
    for h in handles {
        let feature = h.await.unwrap().unwrap();
        assert_eq!(feature.state.as_deref(), Some("Registered"));
    }
    assert_eq!(client.registers.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_create_and_delete_with_logging_enabled() {
    let subscriber = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);
    let client = Arc::new(
        FakeFeatures::default()
            .script(
                "Logged",
                &[
                    Some("NotRegistered"),
                    Some("Registered"),
                    Some("Registered"),
                    Some("Unregistering"),
                    Some("NotRegistered"),
                ],
            )
            .on_register("Registering")
            .on_unregister("Unregistering"),
    );
    let features = lifecycle(client.clone());
    let root = CancellationToken::new();

    let feature = features.create(&root, &feature_id("Logged")).await.unwrap();
    assert_eq!(feature.state.as_deref(), Some("Registered"));

    features.delete(&root, &feature_id("Logged")).await.unwrap();
    assert_eq!(client.unregisters.load(Ordering::SeqCst), 1);
}
