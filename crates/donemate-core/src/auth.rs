use tracing::{debug, info};

use crate::identity::{Credentials, IdentityProvider, OAuthProvider, ProviderError, SignUpRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Login,
    SignUp,
}

impl AuthMode {
    pub fn title(self) -> &'static str {
        match self {
            Self::Login => "Login",
            Self::SignUp => "Sign Up",
        }
    }

    /// Prompt shown above the button that switches mode.
    pub fn switch_prompt(self) -> &'static str {
        match self {
            Self::Login => "Don't have an account?",
            Self::SignUp => "Already have an account?",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Login => Self::SignUp,
            Self::SignUp => Self::Login,
        }
    }
}

/// One submission built from the form fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRequest {
    Login(Credentials),
    SignUp(SignUpRequest),
}

impl AuthRequest {
    pub fn mode(&self) -> AuthMode {
        match self {
            Self::Login(_) => AuthMode::Login,
            Self::SignUp(_) => AuthMode::SignUp,
        }
    }

    pub async fn send<P>(&self, provider: &P) -> Result<(), ProviderError>
    where
        P: IdentityProvider + ?Sized,
    {
        match self {
            Self::Login(credentials) => provider.sign_in_with_password(credentials).await,
            Self::SignUp(request) => provider.sign_up(request).await,
        }
    }
}

/// Login / sign-up form state. Provider failures land in `error` as
/// user-facing text; they never touch task or theme state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthForm {
    pub mode: AuthMode,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub surname: String,
    pub show_password: bool,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl AuthForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_mode(&mut self) {
        self.mode = self.mode.other();
        self.clear_feedback();
    }

    pub fn toggle_show_password(&mut self) {
        self.show_password = !self.show_password;
    }

    pub fn clear_feedback(&mut self) {
        self.error = None;
        self.message = None;
    }

    /// Clears old feedback and builds the request, or records why the form
    /// cannot be sent yet.
    pub fn begin(&mut self) -> Option<AuthRequest> {
        self.clear_feedback();

        let email = self.email.trim();
        if email.is_empty() || self.password.is_empty() {
            self.error = Some("Please enter your email and password.".to_string());
            return None;
        }

        let credentials = Credentials {
            email: email.to_string(),
            password: self.password.clone(),
        };

        Some(match self.mode {
            AuthMode::Login => AuthRequest::Login(credentials),
            AuthMode::SignUp => AuthRequest::SignUp(SignUpRequest {
                credentials,
                first_name: self.first_name.trim().to_string(),
                surname: self.surname.trim().to_string(),
            }),
        })
    }

    pub fn finish(&mut self, mode: AuthMode, outcome: Result<(), ProviderError>) {
        match outcome {
            Ok(()) => {
                info!(?mode, "auth request accepted");
                self.error = None;
                self.message = Some(
                    match mode {
                        AuthMode::Login => "Login successful",
                        AuthMode::SignUp => "Sign-up successful! Please check your email to confirm",
                    }
                    .to_string(),
                );
            }
            Err(error) => {
                debug!(?mode, %error, "auth request rejected");
                self.message = None;
                self.error = Some(error.to_string());
            }
        }
    }

    pub async fn submit<P>(&mut self, provider: &P)
    where
        P: IdentityProvider + ?Sized,
    {
        let Some(request) = self.begin() else {
            return;
        };
        let outcome = request.send(provider).await;
        self.finish(request.mode(), outcome);
    }

    pub fn finish_oauth(&mut self, provider: OAuthProvider, outcome: Result<(), ProviderError>) {
        match outcome {
            Ok(()) => {
                self.error = None;
                self.message = Some(format!("Redirecting to {}...", provider.label()));
            }
            Err(error) => {
                self.message = None;
                self.error = Some(error.to_string());
            }
        }
    }

    pub async fn continue_with<P>(&mut self, provider: &P, oauth: OAuthProvider, redirect_to: &str)
    where
        P: IdentityProvider + ?Sized,
    {
        self.clear_feedback();
        let outcome = provider.sign_in_with_oauth(oauth, redirect_to).await;
        self.finish_oauth(oauth, outcome);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use async_trait::async_trait;

    use super::{AuthForm, AuthMode, AuthRequest};
    use crate::identity::{
        Credentials, Identity, IdentityProvider, OAuthProvider, ProviderError, SignUpRequest,
    };
    use crate::observe::Subscription;

    #[derive(Default)]
    struct ScriptedProvider {
        reject_with: Option<String>,
        sign_ups: RefCell<Vec<SignUpRequest>>,
    }

    impl ScriptedProvider {
        fn outcome(&self) -> Result<(), ProviderError> {
            match &self.reject_with {
                Some(message) => Err(ProviderError::rejected(message.clone())),
                None => Ok(()),
            }
        }
    }

    #[async_trait(?Send)]
    impl IdentityProvider for ScriptedProvider {
        async fn current_session(&self) -> Result<Option<Identity>, ProviderError> {
            Ok(None)
        }

        fn subscribe(&self, _: Box<dyn Fn(Option<Identity>)>) -> Subscription {
            Subscription::detached()
        }

        async fn sign_out(&self) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn sign_in_with_password(&self, _: &Credentials) -> Result<(), ProviderError> {
            self.outcome()
        }

        async fn sign_up(&self, request: &SignUpRequest) -> Result<(), ProviderError> {
            self.sign_ups.borrow_mut().push(request.clone());
            self.outcome()
        }

        async fn sign_in_with_oauth(&self, _: OAuthProvider, _: &str) -> Result<(), ProviderError> {
            self.outcome()
        }
    }

    fn filled(mode: AuthMode) -> AuthForm {
        AuthForm {
            mode,
            email: " ada@example.com ".to_string(),
            password: "hunter22".to_string(),
            first_name: "Ada".to_string(),
            surname: "Lovelace".to_string(),
            ..AuthForm::default()
        }
    }

    #[tokio::test]
    async fn provider_rejection_is_shown_verbatim() {
        let provider = ScriptedProvider {
            reject_with: Some("Invalid login credentials".to_string()),
            ..ScriptedProvider::default()
        };
        let mut form = filled(AuthMode::Login);

        form.submit(&provider).await;

        assert_eq!(form.error.as_deref(), Some("Invalid login credentials"));
        assert_eq!(form.message, None);
    }

    #[tokio::test]
    async fn sign_up_sends_names_and_reports_confirmation() {
        let provider = ScriptedProvider::default();
        let mut form = filled(AuthMode::SignUp);

        form.submit(&provider).await;

        let sent = provider.sign_ups.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].credentials.email, "ada@example.com");
        assert_eq!(sent[0].first_name, "Ada");
        assert_eq!(
            form.message.as_deref(),
            Some("Sign-up successful! Please check your email to confirm")
        );
    }

    #[test]
    fn empty_fields_never_reach_the_provider() {
        let mut form = AuthForm::new();
        assert_eq!(form.begin(), None);
        assert!(form.error.is_some());

        form.email = "a@b.c".to_string();
        form.password = "pw".to_string();
        assert!(matches!(form.begin(), Some(AuthRequest::Login(_))));
        assert_eq!(form.error, None);
    }

    #[test]
    fn switching_mode_clears_feedback() {
        let mut form = AuthForm {
            error: Some("old".to_string()),
            message: Some("older".to_string()),
            ..AuthForm::default()
        };
        form.toggle_mode();
        assert_eq!(form.mode, AuthMode::SignUp);
        assert_eq!(form.error, None);
        assert_eq!(form.message, None);
    }

    #[tokio::test]
    async fn oauth_success_reports_redirect() {
        let provider = ScriptedProvider::default();
        let mut form = AuthForm::new();
        form.continue_with(&provider, OAuthProvider::Google, "https://app.example")
            .await;
        assert_eq!(form.message.as_deref(), Some("Redirecting to Google..."));
    }
}
