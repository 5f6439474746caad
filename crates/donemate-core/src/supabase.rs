//! Wire format of the Supabase auth (GoTrue) REST API.
//!
//! Everything here is pure: URL building, request bodies, response decoding
//! and normalization of the provider's user object into [`Identity`]. The
//! browser adapter does the HTTP.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;
use url::form_urlencoded;

use crate::identity::{Credentials, Identity, OAuthProvider, ProviderError, SignUpRequest};

/// Refresh this long before the access token actually expires.
const EXPIRY_LEEWAY_SECS: i64 = 60;
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseEndpoints {
    auth_base: Url,
    anon_key: String,
}

impl SupabaseEndpoints {
    pub fn new(project_url: &str, anon_key: &str) -> anyhow::Result<Self> {
        let mut base = Url::parse(project_url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let auth_base = base.join("auth/v1/")?;

        Ok(Self {
            auth_base,
            anon_key: anon_key.trim().to_string(),
        })
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub fn password_grant(&self) -> String {
        format!("{}token?grant_type=password", self.auth_base)
    }

    pub fn refresh_grant(&self) -> String {
        format!("{}token?grant_type=refresh_token", self.auth_base)
    }

    pub fn signup(&self) -> String {
        format!("{}signup", self.auth_base)
    }

    pub fn logout(&self) -> String {
        format!("{}logout", self.auth_base)
    }

    pub fn user(&self) -> String {
        format!("{}user", self.auth_base)
    }

    pub fn authorize(&self, provider: OAuthProvider, redirect_to: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to)
            .finish();
        format!("{}authorize?{query}", self.auth_base)
    }
}

#[derive(Debug, Serialize)]
pub struct PasswordGrantBody<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

impl<'a> From<&'a Credentials> for PasswordGrantBody<'a> {
    fn from(credentials: &'a Credentials) -> Self {
        Self {
            email: &credentials.email,
            password: &credentials.password,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RefreshGrantBody<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SignUpBody<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub data: SignUpMetadata<'a>,
}

#[derive(Debug, Serialize)]
pub struct SignUpMetadata<'a> {
    #[serde(rename = "firstName")]
    pub first_name: &'a str,
    pub surname: &'a str,
}

impl<'a> From<&'a SignUpRequest> for SignUpBody<'a> {
    fn from(request: &'a SignUpRequest) -> Self {
        Self {
            email: &request.credentials.email,
            password: &request.credentials.password,
            data: SignUpMetadata {
                first_name: &request.first_name,
                surname: &request.surname,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

impl UserPayload {
    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = ["firstName", "surname"]
            .iter()
            .filter_map(|key| self.metadata_str(key))
            .collect();
        if !parts.is_empty() {
            return Some(parts.join(" "));
        }

        self.metadata_str("full_name")
            .or_else(|| self.metadata_str("name"))
            .map(str::to_string)
    }
}

impl From<UserPayload> for Identity {
    fn from(user: UserPayload) -> Self {
        let display_name = user.display_name();
        Identity {
            id: user.id,
            email: user.email.filter(|email| !email.trim().is_empty()),
            display_name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: UserPayload,
}

/// Sign-up answers with a session when email confirmation is off, and with
/// the bare user otherwise.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(TokenResponse),
    User(UserPayload),
}

/// Session record kept in browser storage between page loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub user: Identity,
}

impl StoredSession {
    pub fn from_token_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_at = expiry(response.expires_at, response.expires_in, now);
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
            user: response.user.into(),
        }
    }

    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - EXPIRY_LEEWAY_SECS <= now.timestamp()
    }
}

fn expiry(expires_at: Option<i64>, expires_in: Option<i64>, now: DateTime<Utc>) -> i64 {
    expires_at.unwrap_or_else(|| {
        let secs = expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        (now + Duration::seconds(secs)).timestamp()
    })
}

/// Tokens handed back in the URL fragment after an OAuth redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<i64>,
    pub expires_at: Option<i64>,
}

impl RedirectTokens {
    pub fn expires_at(&self, now: DateTime<Utc>) -> i64 {
        expiry(self.expires_at, self.expires_in, now)
    }
}

/// Reads an OAuth redirect fragment (`#access_token=...`). Returns `Ok(None)`
/// when the fragment carries no session, and the provider's message when it
/// carries an error.
pub fn parse_redirect_fragment(fragment: &str) -> Result<Option<RedirectTokens>, ProviderError> {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    if fragment.is_empty() {
        return Ok(None);
    }

    let mut access_token = None;
    let mut refresh_token = None;
    let mut expires_in = None;
    let mut expires_at = None;
    let mut error = None;
    let mut error_description = None;

    for (key, value) in form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "refresh_token" => refresh_token = Some(value.into_owned()),
            "expires_in" => expires_in = value.parse().ok(),
            "expires_at" => expires_at = value.parse().ok(),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(message) = error_description.or(error) {
        return Err(ProviderError::rejected(message));
    }

    Ok(access_token.zip(refresh_token).map(|(access_token, refresh_token)| RedirectTokens {
        access_token,
        refresh_token,
        expires_in,
        expires_at,
    }))
}

/// Picks the user-facing message out of an error response body.
pub fn error_message(status: u16, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|value| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| value.get(key).and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| format!("request failed with status {status}"))
}

pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|err| ProviderError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::{
        SignUpBody, SignUpResponse, StoredSession, SupabaseEndpoints, TokenResponse, decode,
        error_message, parse_redirect_fragment,
    };
    use crate::identity::{Credentials, Identity, OAuthProvider, ProviderError, SignUpRequest};

    #[test]
    fn endpoints_are_built_under_auth_v1() {
        let endpoints =
            SupabaseEndpoints::new("https://abc.supabase.co", "anon").expect("valid url");
        assert_eq!(
            endpoints.password_grant(),
            "https://abc.supabase.co/auth/v1/token?grant_type=password"
        );
        assert_eq!(endpoints.logout(), "https://abc.supabase.co/auth/v1/logout");
        assert_eq!(
            endpoints.authorize(OAuthProvider::Google, "http://localhost:8080/"),
            "https://abc.supabase.co/auth/v1/authorize?provider=google&redirect_to=http%3A%2F%2Flocalhost%3A8080%2F"
        );

        let nested = SupabaseEndpoints::new("https://proxy.example/sb", "anon").expect("valid url");
        assert_eq!(nested.user(), "https://proxy.example/sb/auth/v1/user");
        assert!(SupabaseEndpoints::new("not a url", "anon").is_err());
    }

    #[test]
    fn token_response_normalizes_user() {
        let body = r#"{
            "access_token": "at", "refresh_token": "rt", "expires_in": 3600,
            "user": {"id": "u-1", "email": "ada@example.com",
                     "user_metadata": {"firstName": "Ada", "surname": "Lovelace"}}
        }"#;
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid now");

        let response: TokenResponse = decode(body).expect("token response");
        let session = StoredSession::from_token_response(response, now);

        assert_eq!(
            session.user,
            Identity {
                id: "u-1".to_string(),
                email: Some("ada@example.com".to_string()),
                display_name: Some("Ada Lovelace".to_string()),
            }
        );
        assert_eq!(session.expires_at, now.timestamp() + 3600);
        assert!(!session.needs_refresh(now));
        assert!(session.needs_refresh(now + chrono::Duration::seconds(3590)));
    }

    #[test]
    fn oauth_metadata_uses_full_name() {
        let body = r#"{"id": "g-9", "user_metadata": {"full_name": "Grace Hopper"}}"#;
        let response: SignUpResponse = decode(body).expect("user payload");
        let SignUpResponse::User(user) = response else {
            panic!("expected bare user");
        };
        let identity: Identity = user.into();
        assert_eq!(identity.display_name.as_deref(), Some("Grace Hopper"));
        assert_eq!(identity.email, None);
    }

    #[test]
    fn sign_up_body_carries_name_metadata() {
        let request = SignUpRequest {
            credentials: Credentials {
                email: "ada@example.com".to_string(),
                password: "pw".to_string(),
            },
            first_name: "Ada".to_string(),
            surname: "Lovelace".to_string(),
        };
        let value = serde_json::to_value(SignUpBody::from(&request)).expect("serialize");
        assert_eq!(value["data"]["firstName"], "Ada");
        assert_eq!(value["data"]["surname"], "Lovelace");
    }

    #[test]
    fn redirect_fragment_yields_tokens_or_error() {
        let tokens = parse_redirect_fragment("#access_token=a%2Bb&refresh_token=r&expires_in=60&token_type=bearer")
            .expect("no error")
            .expect("tokens present");
        assert_eq!(tokens.access_token, "a+b");
        assert_eq!(tokens.expires_in, Some(60));

        assert_eq!(parse_redirect_fragment("").expect("no error"), None);
        assert_eq!(parse_redirect_fragment("#section-2").expect("no error"), None);

        let err = parse_redirect_fragment("#error=access_denied&error_description=User+cancelled")
            .expect_err("error fragment");
        assert_eq!(err, ProviderError::rejected("User cancelled"));
    }

    #[test]
    fn error_message_prefers_provider_text() {
        assert_eq!(
            error_message(400, r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(error_message(422, r#"{"msg":"User already registered"}"#), "User already registered");
        assert_eq!(error_message(502, "<html>"), "request failed with status 502");
    }
}
