//! Bridges the identity provider's asynchronous session reports into one
//! local [`Session`] value.
//!
//! State starts as `Pending`. The initial "current session" answer settles
//! it, unless a provider event already has. After that, every provider event
//! overwrites the state; the last event wins. Sign-out never writes state
//! directly: the provider's event stream reports the result.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use futures::future::{FutureExt, LocalBoxFuture};
use tracing::{debug, info, warn};

use crate::identity::{Gate, Identity, IdentityProvider, Session};
use crate::observe::{Listeners, Subscription};

pub struct SessionReconciler<P: IdentityProvider + ?Sized> {
    provider: Rc<P>,
    state: Rc<RefCell<Session>>,
    listeners: Listeners<Session>,
    _events: Subscription,
}

impl<P: IdentityProvider + ?Sized + 'static> SessionReconciler<P> {
    /// Subscribes to provider events and returns the reconciler together
    /// with the initial session check. The caller drives the future (spawn
    /// it on the local executor); it is safe to let it finish after the
    /// reconciler is gone.
    pub fn start(provider: Rc<P>) -> (Self, LocalBoxFuture<'static, ()>) {
        let state = Rc::new(RefCell::new(Session::Pending));
        let listeners = Listeners::new();

        let events = {
            let weak = Rc::downgrade(&state);
            let listeners = listeners.clone();
            provider.subscribe(Box::new(move |identity| {
                apply_event(&weak, &listeners, identity);
            }))
        };

        let initial = {
            let weak = Rc::downgrade(&state);
            let listeners = listeners.clone();
            let provider = Rc::clone(&provider);
            async move {
                let outcome = provider.current_session().await;
                apply_initial(&weak, &listeners, outcome);
            }
            .boxed_local()
        };

        let reconciler = Self {
            provider,
            state,
            listeners,
            _events: events,
        };
        (reconciler, initial)
    }

    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    /// False until the first session check (or a provider event) settles
    /// the state.
    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    pub fn gate(&self, splash_elapsed: bool) -> Gate {
        self.state.borrow().gate(splash_elapsed)
    }

    pub fn provider(&self) -> &Rc<P> {
        &self.provider
    }

    pub fn subscribe(&self, listener: impl Fn(&Session) + 'static) -> Subscription {
        self.listeners.add(listener)
    }

    /// Asks the provider to end the session. Fire-and-forget: the resulting
    /// `Unauthenticated` state arrives through the event stream.
    pub fn logout(&self) -> LocalBoxFuture<'static, ()> {
        let provider = Rc::clone(&self.provider);
        async move {
            match provider.sign_out().await {
                Ok(()) => debug!("sign-out request accepted"),
                Err(error) => warn!(%error, "sign-out request failed"),
            }
        }
        .boxed_local()
    }
}

fn apply_event(weak: &Weak<RefCell<Session>>, listeners: &Listeners<Session>, identity: Option<Identity>) {
    let Some(state) = weak.upgrade() else {
        debug!("session event after teardown ignored");
        return;
    };

    let next = Session::from_identity(identity);
    let changed = {
        let mut current = state.borrow_mut();
        let changed = *current != next;
        *current = next.clone();
        changed
    };

    if changed {
        info!(authenticated = next.identity().is_some(), "session changed by provider event");
        listeners.notify(&next);
    }
}

fn apply_initial(
    weak: &Weak<RefCell<Session>>,
    listeners: &Listeners<Session>,
    outcome: Result<Option<Identity>, crate::identity::ProviderError>,
) {
    let Some(state) = weak.upgrade() else {
        debug!("initial session check finished after teardown; ignored");
        return;
    };

    let next = match outcome {
        Ok(identity) => Session::from_identity(identity),
        Err(error) => {
            warn!(%error, "initial session check failed; treating as signed out");
            Session::Unauthenticated
        }
    };

    {
        let mut current = state.borrow_mut();
        if current.is_ready() {
            debug!("initial session check superseded by a provider event");
            return;
        }
        *current = next.clone();
    }

    info!(authenticated = next.identity().is_some(), "initial session check settled");
    listeners.notify(&next);
}

impl<P: IdentityProvider + ?Sized> fmt::Debug for SessionReconciler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionReconciler")
            .field("session", &*self.state.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use async_trait::async_trait;
    use futures::channel::oneshot;

    use super::SessionReconciler;
    use crate::identity::{
        Credentials, Identity, IdentityProvider, OAuthProvider, ProviderError, Session, SignUpRequest,
    };
    use crate::observe::{Listeners, Subscription};

    /// Provider whose initial answer is released by the test.
    struct GatedProvider {
        answer: RefCell<Option<oneshot::Receiver<Result<Option<Identity>, ProviderError>>>>,
        events: Listeners<Option<Identity>>,
        sign_outs: RefCell<usize>,
    }

    impl GatedProvider {
        fn new() -> (Rc<Self>, oneshot::Sender<Result<Option<Identity>, ProviderError>>) {
            let (tx, rx) = oneshot::channel();
            let provider = Rc::new(Self {
                answer: RefCell::new(Some(rx)),
                events: Listeners::new(),
                sign_outs: RefCell::new(0),
            });
            (provider, tx)
        }

        fn emit(&self, identity: Option<Identity>) {
            self.events.notify(&identity);
        }
    }

    #[async_trait(?Send)]
    impl IdentityProvider for GatedProvider {
        async fn current_session(&self) -> Result<Option<Identity>, ProviderError> {
            let rx = self.answer.borrow_mut().take();
            match rx {
                Some(rx) => rx.await.unwrap_or(Ok(None)),
                None => Ok(None),
            }
        }

        fn subscribe(&self, on_change: Box<dyn Fn(Option<Identity>)>) -> Subscription {
            self.events.add(move |identity| on_change(identity.clone()))
        }

        async fn sign_out(&self) -> Result<(), ProviderError> {
            *self.sign_outs.borrow_mut() += 1;
            Ok(())
        }

        async fn sign_in_with_password(&self, _: &Credentials) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn sign_up(&self, _: &SignUpRequest) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn sign_in_with_oauth(&self, _: OAuthProvider, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn bob() -> Identity {
        Identity {
            id: "u-2".to_string(),
            email: Some("bob@example.com".to_string()),
            display_name: Some("Bob".to_string()),
        }
    }

    #[tokio::test]
    async fn pending_then_unauthenticated_then_authenticated() {
        let (provider, answer) = GatedProvider::new();
        let (reconciler, initial) = SessionReconciler::start(Rc::clone(&provider));

        let seen = Rc::new(RefCell::new(vec![reconciler.session()]));
        let _sub = {
            let seen = Rc::clone(&seen);
            reconciler.subscribe(move |session| seen.borrow_mut().push(session.clone()))
        };
        assert!(!reconciler.is_ready());

        answer.send(Ok(None)).expect("receiver alive");
        initial.await;
        provider.emit(Some(bob()));

        assert_eq!(
            *seen.borrow(),
            vec![
                Session::Pending,
                Session::Unauthenticated,
                Session::Authenticated(bob()),
            ]
        );
    }

    #[tokio::test]
    async fn event_before_initial_answer_wins() {
        let (provider, answer) = GatedProvider::new();
        let (reconciler, initial) = SessionReconciler::start(Rc::clone(&provider));

        provider.emit(Some(bob()));
        answer.send(Ok(None)).expect("receiver alive");
        initial.await;

        assert_eq!(reconciler.session(), Session::Authenticated(bob()));
    }

    #[tokio::test]
    async fn failed_initial_check_resolves_signed_out() {
        let (provider, answer) = GatedProvider::new();
        let (reconciler, initial) = SessionReconciler::start(Rc::clone(&provider));

        answer
            .send(Err(ProviderError::Transport("offline".to_string())))
            .expect("receiver alive");
        initial.await;

        assert_eq!(reconciler.session(), Session::Unauthenticated);
    }

    #[tokio::test]
    async fn logout_leaves_state_to_event_stream() {
        let (provider, answer) = GatedProvider::new();
        let (reconciler, initial) = SessionReconciler::start(Rc::clone(&provider));
        answer.send(Ok(Some(bob()))).expect("receiver alive");
        initial.await;

        reconciler.logout().await;
        assert_eq!(*provider.sign_outs.borrow(), 1);
        assert_eq!(reconciler.session(), Session::Authenticated(bob()));

        provider.emit(None);
        assert_eq!(reconciler.session(), Session::Unauthenticated);
    }

    #[tokio::test]
    async fn late_answer_after_teardown_is_ignored() {
        let (provider, answer) = GatedProvider::new();
        let (reconciler, initial) = SessionReconciler::start(Rc::clone(&provider));
        assert_eq!(provider.events.len(), 1);

        drop(reconciler);
        assert_eq!(provider.events.len(), 0);

        answer.send(Ok(Some(bob()))).expect("receiver alive");
        initial.await;
        provider.emit(None);
    }
}
