//! Supabase auth over `fetch`, with the session kept in `localStorage`.

use async_trait::async_trait;
use chrono::Utc;
use donemate_core::identity::{
    Credentials, Identity, IdentityProvider, OAuthProvider, ProviderError, SignUpRequest,
};
use donemate_core::observe::{Listeners, Subscription};
use donemate_core::store::KeyValueStore;
use donemate_core::supabase::{
    self, PasswordGrantBody, RefreshGrantBody, SignUpBody, SignUpResponse, StoredSession,
    SupabaseEndpoints, TokenResponse, UserPayload,
};
use gloo::net::http::{Request, RequestBuilder};
use tracing::{debug, info, warn};

use crate::web::{self, LocalStorageStore};

const SESSION_STORAGE_KEY: &str = "DoneMateSession";

pub struct SupabaseProvider {
    endpoints: SupabaseEndpoints,
    storage: LocalStorageStore,
    listeners: Listeners<Option<Identity>>,
}

impl SupabaseProvider {
    pub fn new(endpoints: SupabaseEndpoints) -> Self {
        Self {
            endpoints,
            storage: LocalStorageStore,
            listeners: Listeners::new(),
        }
    }

    fn with_key(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", self.endpoints.anon_key())
    }

    fn stored_session(&self) -> Option<StoredSession> {
        let raw = match self.storage.get(SESSION_STORAGE_KEY) {
            Ok(raw) => raw?,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "failed reading stored session");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(error) => {
                warn!(%error, "discarding unreadable stored session");
                self.forget_session();
                None
            }
        }
    }

    fn remember(&self, session: &StoredSession) {
        let result = serde_json::to_string(session)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.storage.set(SESSION_STORAGE_KEY, &json));
        if let Err(error) = result {
            warn!(error = %format!("{error:#}"), "failed to store session; it will not survive a reload");
        }
    }

    fn forget_session(&self) {
        if let Err(error) = self.storage.remove(SESSION_STORAGE_KEY) {
            warn!(error = %format!("{error:#}"), "failed to remove stored session");
        }
    }

    fn emit(&self, identity: Option<Identity>) {
        debug!(signed_in = identity.is_some(), "broadcasting auth change");
        self.listeners.notify(&identity);
    }

    async fn fetch_user(&self, access_token: &str) -> Result<Identity, ProviderError> {
        let request = self
            .with_key(Request::get(&self.endpoints.user()))
            .header("Authorization", &format!("Bearer {access_token}"));
        let body = send(request.build().map_err(transport)?).await?;
        let user: UserPayload = supabase::decode(&body)?;
        Ok(user.into())
    }

    async fn refresh(&self, session: &StoredSession) -> Result<StoredSession, ProviderError> {
        let request = self
            .with_key(Request::post(&self.endpoints.refresh_grant()))
            .json(&RefreshGrantBody {
                refresh_token: &session.refresh_token,
            })
            .map_err(transport)?;
        let body = send(request).await?;
        let tokens: TokenResponse = supabase::decode(&body)?;
        Ok(StoredSession::from_token_response(tokens, Utc::now()))
    }

    /// Completes an OAuth redirect when the page was opened with tokens in
    /// the fragment.
    async fn session_from_redirect(&self) -> Result<Option<StoredSession>, ProviderError> {
        let hash = web::location_hash();
        let tokens = match supabase::parse_redirect_fragment(&hash) {
            Ok(Some(tokens)) => tokens,
            Ok(None) => return Ok(None),
            Err(error) => {
                web::clear_location_hash();
                return Err(error);
            }
        };
        web::clear_location_hash();

        let user = self.fetch_user(&tokens.access_token).await?;
        let session = StoredSession {
            expires_at: tokens.expires_at(Utc::now()),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user,
        };
        info!("signed in from OAuth redirect");
        Ok(Some(session))
    }
}

#[async_trait(?Send)]
impl IdentityProvider for SupabaseProvider {
    #[tracing::instrument(skip(self))]
    async fn current_session(&self) -> Result<Option<Identity>, ProviderError> {
        if let Some(session) = self.session_from_redirect().await? {
            self.remember(&session);
            return Ok(Some(session.user));
        }

        let Some(session) = self.stored_session() else {
            debug!("no stored session");
            return Ok(None);
        };

        if !session.needs_refresh(Utc::now()) {
            return Ok(Some(session.user));
        }

        match self.refresh(&session).await {
            Ok(fresh) => {
                debug!("refreshed access token");
                self.remember(&fresh);
                Ok(Some(fresh.user))
            }
            Err(error @ ProviderError::Transport(_)) => Err(error),
            Err(error) => {
                info!(%error, "stored session expired; signing out");
                self.forget_session();
                Ok(None)
            }
        }
    }

    fn subscribe(&self, on_change: Box<dyn Fn(Option<Identity>)>) -> Subscription {
        self.listeners.add(move |identity| on_change(identity.clone()))
    }

    #[tracing::instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), ProviderError> {
        let session = self.stored_session();
        self.forget_session();
        self.emit(None);

        let Some(session) = session else {
            return Ok(());
        };
        let request = self
            .with_key(Request::post(&self.endpoints.logout()))
            .header("Authorization", &format!("Bearer {}", session.access_token))
            .build()
            .map_err(transport)?;
        send(request).await.map(|_| ())
    }

    #[tracing::instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<(), ProviderError> {
        let request = self
            .with_key(Request::post(&self.endpoints.password_grant()))
            .json(&PasswordGrantBody::from(credentials))
            .map_err(transport)?;
        let body = send(request).await?;
        let tokens: TokenResponse = supabase::decode(&body)?;
        let session = StoredSession::from_token_response(tokens, Utc::now());

        self.remember(&session);
        info!("signed in with password");
        self.emit(Some(session.user));
        Ok(())
    }

    #[tracing::instrument(skip(self, request), fields(email = %request.credentials.email))]
    async fn sign_up(&self, request: &SignUpRequest) -> Result<(), ProviderError> {
        let http = self
            .with_key(Request::post(&self.endpoints.signup()))
            .json(&SignUpBody::from(request))
            .map_err(transport)?;
        let body = send(http).await?;

        match supabase::decode::<SignUpResponse>(&body)? {
            SignUpResponse::Session(tokens) => {
                let session = StoredSession::from_token_response(tokens, Utc::now());
                self.remember(&session);
                info!("signed up and signed in");
                self.emit(Some(session.user));
            }
            SignUpResponse::User(_) => info!("signed up; waiting for email confirmation"),
        }
        Ok(())
    }

    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<(), ProviderError> {
        let redirect_to = if redirect_to.trim().is_empty() {
            web::location_origin()
        } else {
            redirect_to.to_string()
        };
        let url = self.endpoints.authorize(provider, &redirect_to);
        info!(provider = provider.as_str(), "redirecting to OAuth provider");
        web::navigate(&url).map_err(|err| ProviderError::Transport(format!("{err:#}")))
    }
}

fn transport(err: gloo::net::Error) -> ProviderError {
    ProviderError::Transport(err.to_string())
}

async fn send(request: Request) -> Result<String, ProviderError> {
    let response = request.send().await.map_err(transport)?;
    let status = response.status();
    let body = response.text().await.map_err(transport)?;

    if response.ok() {
        Ok(body)
    } else {
        debug!(status, "auth request rejected");
        Err(ProviderError::rejected(supabase::error_message(status, &body)))
    }
}
