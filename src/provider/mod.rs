/// Identity provider interface
///
/// The session store reaches the external identity backend exclusively
/// through this trait: three account operations plus a feed of
/// identity-change events. Implementations own the network calls and the
/// event channel; the store never talks to the backend directly.
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::AuthError;
use crate::identity::Identity;

pub mod rest;

/// A single identity-change event: the identity now signed in, or `None`
/// when the session ended.
pub type IdentityChange = Option<Identity>;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider name for logging (e.g. "rest")
    fn name(&self) -> &str;

    /// Subscribe to identity changes. Returns the identity at subscription
    /// time together with a live feed of every subsequent change, in
    /// emission order. May suspend while the provider restores a prior
    /// session. Invoked at most once, by the session store.
    async fn subscribe_identity_changes(
        &self,
    ) -> (IdentityChange, broadcast::Receiver<IdentityChange>);

    /// Create an account with the given credentials. A successful call also
    /// emits a `Some(identity)` event on the change feed.
    ///
    /// Fails with `AuthenticationFailure` on invalid or duplicate
    /// credentials, carrying the backend's message.
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Verify the given credentials and open a session. A successful call
    /// also emits a `Some(identity)` event on the change feed.
    async fn verify_credentials(&self, email: &str, password: &str)
    -> Result<Identity, AuthError>;

    /// End the current session. A successful call emits a `None` event on
    /// the change feed.
    async fn sign_out(&self) -> Result<(), AuthError>;
}
