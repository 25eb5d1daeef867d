// Authenticated-User Record

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque authenticated-user record supplied by the identity provider.
///
/// Only `id` is interpreted by the session store; every other attribute is
/// provider-defined and passed through unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique user identifier from the provider
    pub id: String,

    /// User's email address
    pub email: Option<String>,

    /// Whether the email has been verified by the provider
    #[serde(default)]
    pub email_verified: bool,

    /// User's display name (if available)
    pub display_name: Option<String>,

    /// Additional provider-specific attributes
    #[serde(default)]
    pub raw_data: HashMap<String, serde_json::Value>,
}

impl Identity {
    /// Build a minimal identity carrying only the provider id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            email_verified: false,
            display_name: None,
            raw_data: HashMap::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}
