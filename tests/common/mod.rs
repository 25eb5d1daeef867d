// Shared test fixtures: a scriptable in-process identity provider the
// session store can run against without a backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use authsession::{AuthError, Identity, IdentityChange, IdentityProvider, SessionState};
use tokio::sync::{Notify, broadcast, watch};

const EVENT_CAPACITY: usize = 16;

/// How often each operation reached the provider.
#[derive(Default)]
pub struct CallCounts {
    pub create_account: AtomicUsize,
    pub verify_credentials: AtomicUsize,
    pub sign_out: AtomicUsize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.create_account.load(Ordering::SeqCst)
            + self.verify_credentials.load(Ordering::SeqCst)
            + self.sign_out.load(Ordering::SeqCst)
    }
}

/// Scriptable identity provider: tests queue operation outcomes and inject
/// identity-change events by hand, mirroring the contract of the real
/// provider (operations themselves never emit here, so tests can observe
/// the gap between an accepted call and its stream event).
pub struct StubProvider {
    current: Mutex<IdentityChange>,
    events: broadcast::Sender<IdentityChange>,
    create_account_outcomes: Mutex<VecDeque<Result<Identity, AuthError>>>,
    verify_credentials_outcomes: Mutex<VecDeque<Result<Identity, AuthError>>>,
    sign_out_outcomes: Mutex<VecDeque<Result<(), AuthError>>>,
    subscribe_gate: Option<Arc<Notify>>,
    pub calls: CallCounts,
}

impl StubProvider {
    pub fn new() -> Arc<Self> {
        Self::with_snapshot(None)
    }

    /// A provider that already reports the given identity at subscribe
    /// time.
    pub fn with_snapshot(snapshot: IdentityChange) -> Arc<Self> {
        Arc::new(Self::build(snapshot, None))
    }

    /// A provider that holds the subscription open until the returned
    /// handle is notified, so tests can observe the store while it is
    /// still loading.
    pub fn gated() -> (Arc<Self>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(Self::build(None, Some(Arc::clone(&gate))));
        (provider, gate)
    }

    fn build(snapshot: IdentityChange, subscribe_gate: Option<Arc<Notify>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            current: Mutex::new(snapshot),
            events,
            create_account_outcomes: Mutex::new(VecDeque::new()),
            verify_credentials_outcomes: Mutex::new(VecDeque::new()),
            sign_out_outcomes: Mutex::new(VecDeque::new()),
            subscribe_gate,
            calls: CallCounts::default(),
        }
    }

    /// Inject an identity-change event, as the backend would after a
    /// successful operation or an external session change.
    pub fn emit(&self, change: IdentityChange) {
        let mut current = self.current.lock().unwrap();
        *current = change.clone();
        let _ = self.events.send(change);
    }

    pub fn queue_create_account(&self, outcome: Result<Identity, AuthError>) {
        self.create_account_outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn queue_verify_credentials(&self, outcome: Result<Identity, AuthError>) {
        self.verify_credentials_outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn queue_sign_out(&self, outcome: Result<(), AuthError>) {
        self.sign_out_outcomes.lock().unwrap().push_back(outcome);
    }

    /// Live subscriptions on the event feed.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

fn next_outcome<T>(queue: &Mutex<VecDeque<Result<T, AuthError>>>) -> Result<T, AuthError> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(AuthError::unexpected("no scripted outcome queued")))
}

#[async_trait]
impl IdentityProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn subscribe_identity_changes(
        &self,
    ) -> (IdentityChange, broadcast::Receiver<IdentityChange>) {
        if let Some(gate) = &self.subscribe_gate {
            gate.notified().await;
        }
        let current = self.current.lock().unwrap();
        (current.clone(), self.events.subscribe())
    }

    async fn create_account(&self, _email: &str, _password: &str) -> Result<Identity, AuthError> {
        self.calls.create_account.fetch_add(1, Ordering::SeqCst);
        next_outcome(&self.create_account_outcomes)
    }

    async fn verify_credentials(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<Identity, AuthError> {
        self.calls.verify_credentials.fetch_add(1, Ordering::SeqCst);
        next_outcome(&self.verify_credentials_outcomes)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.calls.sign_out.fetch_add(1, Ordering::SeqCst);
        next_outcome(&self.sign_out_outcomes)
    }
}

/// Wait until the session state satisfies the predicate, with a timeout so
/// a broken feed fails the test instead of hanging it.
pub async fn wait_for_state<F>(
    state: &mut watch::Receiver<SessionState>,
    predicate: F,
) -> SessionState
where
    F: FnMut(&SessionState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), state.wait_for(predicate))
        .await
        .expect("timed out waiting for session state")
        .expect("session state channel closed")
        .clone()
}

pub fn identity(id: &str) -> Identity {
    Identity::new(id)
}
