// Session Store
// The core component: tracks the currently signed-in identity and the
// loading flag, delegates mutating operations to the identity provider,
// and republishes every state change to subscribers. State is written only
// by the provider-event listener; operations trigger the provider and read
// the outcome from the feed like everybody else.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::AuthError;
use crate::identity::Identity;
use crate::provider::IdentityProvider;
use crate::provider::rest::RestIdentityProvider;

/// Reactive session state, published to subscribers on every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    /// The identity currently signed in, if any
    pub current_identity: Option<Identity>,

    /// True until the first identity-change event (or the decision that no
    /// provider is available) has been processed; false forever after
    pub loading: bool,
}

impl SessionState {
    fn resolving() -> Self {
        Self {
            current_identity: None,
            loading: true,
        }
    }

    fn signed_out() -> Self {
        Self {
            current_identity: None,
            loading: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_identity.is_some()
    }
}

/// Normalized outcome of a mutating operation: the uniform serializable
/// shape for consumers that render results instead of branching on
/// [`AuthError`] kinds.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<Identity, AuthError>> for OperationResult {
    fn from(result: Result<Identity, AuthError>) -> Self {
        match result {
            Ok(identity) => Self {
                success: true,
                identity: Some(identity),
                error: None,
            },
            Err(err) => Self {
                success: false,
                identity: None,
                error: Some(err.to_string()),
            },
        }
    }
}

impl From<Result<(), AuthError>> for OperationResult {
    fn from(result: Result<(), AuthError>) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                identity: None,
                error: None,
            },
            Err(err) => Self {
                success: false,
                identity: None,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Client-side authentication session manager.
///
/// A store subscribes to its provider's identity-change feed exactly once,
/// at construction. Each instance is independent: tests and applications
/// can run as many stores as they need, and `dispose` (or drop) releases
/// the subscription.
pub struct SessionStore {
    provider: Option<Arc<dyn IdentityProvider>>,
    state: watch::Receiver<SessionState>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    /// Create a store over the given provider, or a disconnected store when
    /// none is available. Must be called from within a tokio runtime.
    pub fn new(provider: Option<Arc<dyn IdentityProvider>>) -> Self {
        let Some(provider) = provider else {
            return Self::disconnected();
        };

        let (state_tx, state) = watch::channel(SessionState::resolving());
        let listener = tokio::spawn(listen(Arc::clone(&provider), state_tx));

        Self {
            provider: Some(provider),
            state,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// A store with no identity provider: never loading, never signed in,
    /// and every operation reports `Auth not available`.
    pub fn disconnected() -> Self {
        // Dropping the sender closes the watch: subscribers see the current
        // state and learn no change will ever come.
        let (_, state) = watch::channel(SessionState::signed_out());

        Self {
            provider: None,
            state,
            listener: Mutex::new(None),
        }
    }

    /// Build a store from the environment-configured REST provider. Any
    /// configuration or bootstrap failure yields a disconnected store.
    pub fn from_env() -> Self {
        match ProviderConfig::from_env() {
            Ok(config) => Self::from_config(config),
            Err(err) => {
                warn!(error = %err, "auth configuration unavailable, starting disconnected");
                Self::disconnected()
            }
        }
    }

    /// Build a store over a REST provider with the given configuration,
    /// falling back to a disconnected store when construction fails.
    pub fn from_config(config: ProviderConfig) -> Self {
        match RestIdentityProvider::new(config) {
            Ok(provider) => Self::new(Some(Arc::new(provider))),
            Err(err) => {
                warn!(error = %err, "auth provider construction failed, starting disconnected");
                Self::disconnected()
            }
        }
    }

    /// Create an account with the given credentials. Success means the
    /// provider accepted the call; the session state itself updates when
    /// the resulting identity-change event arrives.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let provider = self.provider()?;
        validate_credentials(email, password)?;
        provider.create_account(email, password).await
    }

    /// Sign in with the given credentials. Same contract as [`sign_up`],
    /// against the provider's credential-verification operation.
    ///
    /// [`sign_up`]: SessionStore::sign_up
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let provider = self.provider()?;
        validate_credentials(email, password)?;
        provider.verify_credentials(email, password).await
    }

    /// Sign out of the current session. The transition to signed-out
    /// happens when the resulting `None` event arrives, not here.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let provider = self.provider()?;
        provider.sign_out().await
    }

    /// [`sign_up`](SessionStore::sign_up) as a uniform result shape.
    pub async fn sign_up_result(&self, email: &str, password: &str) -> OperationResult {
        self.sign_up(email, password).await.into()
    }

    /// [`sign_in`](SessionStore::sign_in) as a uniform result shape.
    pub async fn sign_in_result(&self, email: &str, password: &str) -> OperationResult {
        self.sign_in(email, password).await.into()
    }

    /// [`sign_out`](SessionStore::sign_out) as a uniform result shape.
    pub async fn sign_out_result(&self) -> OperationResult {
        self.sign_out().await.into()
    }

    /// The identity currently signed in, if any. Pure read.
    pub fn current_identity(&self) -> Option<Identity> {
        self.state.borrow().current_identity.clone()
    }

    /// True until the first identity-change event (or the unavailability
    /// decision) has been processed. Pure read.
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Subscribe to session-state changes. The receiver observes the
    /// current state immediately via `borrow` and wakes on every change;
    /// once the store is disposed (or was never connected) it reports that
    /// no further changes will come.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// The session state as a `Stream`, starting with the current value.
    pub fn state_stream(&self) -> WatchStream<SessionState> {
        WatchStream::new(self.state.clone())
    }

    /// Release the provider subscription and stop applying events. Safe to
    /// call more than once; also runs on drop so an abandoned store does
    /// not keep a dangling listener alive.
    pub fn dispose(&self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(task) = listener.take() {
                task.abort();
                debug!("session store disposed, identity subscription released");
            }
        }
    }

    fn provider(&self) -> Result<&Arc<dyn IdentityProvider>, AuthError> {
        self.provider.as_ref().ok_or(AuthError::ProviderUnavailable)
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Reject empty credentials before they reach the provider.
fn validate_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() {
        return Err(AuthError::AuthenticationFailure(
            "Email must not be empty".to_string(),
        ));
    }

    if password.is_empty() {
        return Err(AuthError::AuthenticationFailure(
            "Password must not be empty".to_string(),
        ));
    }

    Ok(())
}

/// Sole writer of the session state: applies the provider's at-subscribe
/// snapshot, then every subsequent event in emission order.
async fn listen(provider: Arc<dyn IdentityProvider>, state: watch::Sender<SessionState>) {
    let (snapshot, mut events) = provider.subscribe_identity_changes().await;
    debug!(
        provider = provider.name(),
        signed_in = snapshot.is_some(),
        "identity subscription established"
    );
    apply(&state, snapshot);

    loop {
        match events.recv().await {
            Ok(change) => {
                debug!(signed_in = change.is_some(), "identity change received");
                apply(&state, change);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // The newest event always wins, so skipping is safe.
                warn!(skipped, "identity feed lagged, resuming with newest events");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("identity feed closed");
                break;
            }
        }
    }
}

fn apply(state: &watch::Sender<SessionState>, change: Option<Identity>) {
    state.send_modify(|s| {
        s.current_identity = change;
        s.loading = false;
    });
}
