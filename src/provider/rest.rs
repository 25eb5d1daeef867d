/// REST identity provider
///
/// Speaks the password-account REST API of a hosted identity backend
/// (Identity-Toolkit-style endpoints). Account operations are plain JSON
/// POSTs; the backend's rejection messages are passed through to callers
/// unmodified. Sign-out is a client-side operation: the backend keeps no
/// session, so ending one is dropping the credentials and telling
/// subscribers the identity is gone.
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::{IdentityChange, IdentityProvider};
use crate::config::{ConfigError, ProviderConfig};
use crate::error::{AuthError, GENERIC_FAILURE};
use crate::identity::Identity;

const PROVIDER_NAME: &str = "rest";
const SIGN_UP_PATH: &str = "v1/accounts:signUp";
const SIGN_IN_PATH: &str = "v1/accounts:signInWithPassword";

/// Identity changes a subscriber may fall behind on before the feed skips
/// ahead; the newest event always wins, so skipping is safe.
const EVENT_CAPACITY: usize = 16;

/// Password-credential request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

/// Raw success payload from the account endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    id_token: String,
    refresh_token: Option<String>,
    expires_in: Option<String>,

    /// Everything else the backend sends is provider-defined and passed
    /// through on the identity.
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

/// Raw error payload from the account endpoints
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Credentials backing the currently signed-in session. The store never
/// reads these; they are for callers reaching other backend APIs on the
/// user's behalf, or driving their own token refresh.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// State shared between operations and the subscription: the identity the
/// feed last reported, plus the credentials backing it.
#[derive(Default)]
struct ProviderState {
    current: IdentityChange,
    credentials: Option<SessionCredentials>,
}

pub struct RestIdentityProvider {
    config: ProviderConfig,
    http_client: reqwest::Client,
    state: Mutex<ProviderState>,
    events: broadcast::Sender<IdentityChange>,
}

impl RestIdentityProvider {
    /// Create a new REST identity provider. Fails when the configuration is
    /// incomplete or the HTTP client cannot be constructed.
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ConfigError::Bootstrap(format!("failed to create HTTP client: {}", e)))?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            config,
            http_client,
            state: Mutex::new(ProviderState::default()),
            events,
        })
    }

    /// Credentials of the active session, if any.
    pub fn session_credentials(&self) -> Option<SessionCredentials> {
        self.state.lock().unwrap().credentials.clone()
    }

    fn account_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    async fn account_request(
        &self,
        path: &'static str,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        let call_id = Uuid::new_v4();
        debug!(%call_id, provider = PROVIDER_NAME, path, "issuing account request");

        let response = self
            .http_client
            .post(self.account_url(path))
            .query(&[("key", self.config.api_key.as_str())])
            .json(&PasswordRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(%call_id, status = status.as_u16(), "account request rejected");
            return Err(classify_rejection(status, &body));
        }

        let raw: AccountResponse = serde_json::from_str(&body)?;
        let identity = self.apply_account_success(raw);
        debug!(%call_id, user = %identity.id, "account request succeeded");
        Ok(identity)
    }

    /// Record the credentials of a successful account call and report the
    /// new identity on the change feed.
    fn apply_account_success(&self, raw: AccountResponse) -> Identity {
        let credentials = SessionCredentials {
            id_token: raw.id_token.clone(),
            refresh_token: raw.refresh_token.clone(),
            expires_at: expiry_from(raw.expires_in.as_deref()),
        };
        let identity = identity_from_response(raw);

        let mut state = self.state.lock().unwrap();
        state.credentials = Some(credentials);
        self.publish(&mut state, Some(identity.clone()));

        identity
    }

    /// Publish an identity change. Callers hold the state lock, which keeps
    /// the snapshot and the feed consistent for concurrent subscribers.
    fn publish(&self, state: &mut ProviderState, change: IdentityChange) {
        state.current = change.clone();
        // A send error only means nobody is subscribed yet.
        let _ = self.events.send(change);
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn subscribe_identity_changes(
        &self,
    ) -> (IdentityChange, broadcast::Receiver<IdentityChange>) {
        // Snapshot and subscription are taken under one lock so a
        // concurrent publish is observed exactly once.
        let state = self.state.lock().unwrap();
        (state.current.clone(), self.events.subscribe())
    }

    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.account_request(SIGN_UP_PATH, email, password).await
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        self.account_request(SIGN_IN_PATH, email, password).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let mut state = self.state.lock().unwrap();
        let had_session = state.credentials.take().is_some();
        debug!(provider = PROVIDER_NAME, had_session, "signing out");
        self.publish(&mut state, None);
        Ok(())
    }
}

/// Map a non-success response to the error taxonomy: client errors are the
/// backend rejecting the request and keep its message verbatim; anything
/// else is unexpected.
fn classify_rejection(status: reqwest::StatusCode, body: &str) -> AuthError {
    let message = decode_error_message(body);
    if status.is_client_error() {
        AuthError::AuthenticationFailure(message)
    } else {
        AuthError::unexpected(format!(
            "provider returned HTTP {}: {}",
            status.as_u16(),
            message
        ))
    }
}

/// Extract the backend's error message, falling back to the raw body and
/// then to the generic message so the result is never empty.
fn decode_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
        if !parsed.error.message.is_empty() {
            return parsed.error.message;
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        GENERIC_FAILURE.to_string()
    } else {
        trimmed.to_string()
    }
}

fn identity_from_response(raw: AccountResponse) -> Identity {
    Identity {
        id: raw.local_id,
        email: raw.email,
        // Password endpoints do not report verification; the attribute
        // arrives in `extra` when the backend includes it.
        email_verified: raw
            .extra
            .get("emailVerified")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        display_name: raw.display_name,
        raw_data: raw.extra,
    }
}

fn expiry_from(expires_in: Option<&str>) -> Option<DateTime<Utc>> {
    let seconds: i64 = expires_in?.parse().ok()?;
    Utc::now().checked_add_signed(Duration::seconds(seconds))
}
