use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observe::Subscription;

/// A signed-in user, normalized at the provider boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Identity {
    /// Best human-facing name: display name, then email, then id.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    /// The first session check has not answered yet.
    #[default]
    Pending,
    Unauthenticated,
    Authenticated(Identity),
}

impl Session {
    pub fn from_identity(identity: Option<Identity>) -> Self {
        match identity {
            Some(identity) => Self::Authenticated(identity),
            None => Self::Unauthenticated,
        }
    }

    pub fn is_ready(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    /// Which top-level view the presentation layer may show.
    /// `splash_elapsed` is false while the minimum startup delay runs.
    pub fn gate(&self, splash_elapsed: bool) -> Gate {
        match self {
            _ if !splash_elapsed => Gate::Loading,
            Self::Pending => Gate::Loading,
            Self::Unauthenticated => Gate::SignIn,
            Self::Authenticated(_) => Gate::Tasks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Loading,
    SignIn,
    Tasks,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider understood the request and said no. `message` is meant
    /// for the user.
    #[error("{message}")]
    Rejected { message: String },
    #[error("could not reach the sign-in service: {0}")]
    Transport(String),
    #[error("unexpected response from the sign-in service: {0}")]
    Decode(String),
    #[error("sign-in is not available in this build")]
    NotConfigured,
}

impl ProviderError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpRequest {
    pub credentials: Credentials,
    pub first_name: String,
    pub surname: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Google => "Google",
        }
    }
}

/// An external identity provider, consumed as opaque remote calls.
///
/// Session changes are reported only through [`IdentityProvider::subscribe`];
/// callers must not treat the return value of a sign-in or sign-out as the
/// new session.
#[async_trait(?Send)]
pub trait IdentityProvider {
    async fn current_session(&self) -> Result<Option<Identity>, ProviderError>;

    fn subscribe(&self, on_change: Box<dyn Fn(Option<Identity>)>) -> Subscription;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<(), ProviderError>;

    async fn sign_up(&self, request: &SignUpRequest) -> Result<(), ProviderError>;

    /// Starts a redirect-based sign-in. On success the host navigates away.
    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<(), ProviderError>;
}

/// Stand-in used when no remote provider is configured: always signed in as
/// a local user, so the task view is never gated.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    identity: Identity,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self {
            identity: Identity {
                id: "local".to_string(),
                email: None,
                display_name: Some("Local user".to_string()),
            },
        }
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl IdentityProvider for LocalProvider {
    async fn current_session(&self) -> Result<Option<Identity>, ProviderError> {
        Ok(Some(self.identity.clone()))
    }

    fn subscribe(&self, _on_change: Box<dyn Fn(Option<Identity>)>) -> Subscription {
        Subscription::detached()
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        Err(ProviderError::NotConfigured)
    }

    async fn sign_in_with_password(&self, _credentials: &Credentials) -> Result<(), ProviderError> {
        Err(ProviderError::NotConfigured)
    }

    async fn sign_up(&self, _request: &SignUpRequest) -> Result<(), ProviderError> {
        Err(ProviderError::NotConfigured)
    }

    async fn sign_in_with_oauth(
        &self,
        _provider: OAuthProvider,
        _redirect_to: &str,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}
