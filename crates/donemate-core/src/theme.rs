//! Light/dark theme tracking.
//!
//! The synchronizer reads the host's colour-scheme preference once at start,
//! keeps listening for changes until it is dropped, and pushes every
//! resulting theme to a [`ThemeApplier`] (in the browser: the `data-theme`
//! attribute on the document root).

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::observe::{Listeners, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    Light,
    Dark,
}

impl ThemePreference {
    pub fn from_prefers_dark(prefers_dark: bool) -> Self {
        if prefers_dark { Self::Dark } else { Self::Light }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    /// Value written to the `data-theme` attribute.
    pub fn as_attr(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl fmt::Display for ThemePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_attr())
    }
}

/// What a host preference change does after the user toggled manually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverridePolicy {
    /// The manual choice stays until the user toggles again.
    #[default]
    Sticky,
    /// Host changes always replace the current theme.
    FollowHost,
}

/// The host environment's "prefers dark" signal.
pub trait HostPreference {
    fn prefers_dark(&self) -> bool;

    /// Calls `on_change` with the new value whenever the preference changes,
    /// until the returned guard is dropped.
    fn watch(&self, on_change: Box<dyn Fn(bool)>) -> Subscription;
}

pub trait ThemeApplier {
    fn apply(&self, theme: ThemePreference);
}

struct ThemeState {
    current: ThemePreference,
    overridden: bool,
    policy: OverridePolicy,
    applier: Box<dyn ThemeApplier>,
}

pub struct ThemeSynchronizer {
    state: Rc<RefCell<ThemeState>>,
    listeners: Listeners<ThemePreference>,
    _host_watch: Subscription,
}

impl ThemeSynchronizer {
    pub fn start<H>(host: &H, applier: Box<dyn ThemeApplier>, policy: OverridePolicy) -> Self
    where
        H: HostPreference + ?Sized,
    {
        let initial = ThemePreference::from_prefers_dark(host.prefers_dark());
        applier.apply(initial);
        info!(theme = %initial, ?policy, "theme initialized from host preference");

        let state = Rc::new(RefCell::new(ThemeState {
            current: initial,
            overridden: false,
            policy,
            applier,
        }));
        let listeners = Listeners::new();

        let weak: Weak<RefCell<ThemeState>> = Rc::downgrade(&state);
        let notify = listeners.clone();
        let host_watch = host.watch(Box::new(move |prefers_dark| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let host_theme = ThemePreference::from_prefers_dark(prefers_dark);

            let changed = {
                let mut state = state.borrow_mut();
                if state.overridden && state.policy == OverridePolicy::Sticky {
                    debug!(host = %host_theme, current = %state.current, "host theme change ignored; manual override active");
                    return;
                }
                state.overridden = false;
                if state.current == host_theme {
                    false
                } else {
                    state.current = host_theme;
                    state.applier.apply(host_theme);
                    true
                }
            };

            if changed {
                debug!(theme = %host_theme, "theme followed host preference");
                notify.notify(&host_theme);
            }
        }));

        Self {
            state,
            listeners,
            _host_watch: host_watch,
        }
    }

    pub fn current(&self) -> ThemePreference {
        self.state.borrow().current
    }

    pub fn is_overridden(&self) -> bool {
        self.state.borrow().overridden
    }

    pub fn toggle(&self) -> ThemePreference {
        let next = {
            let mut state = self.state.borrow_mut();
            let next = state.current.toggled();
            state.current = next;
            state.overridden = true;
            state.applier.apply(next);
            next
        };
        debug!(theme = %next, "theme toggled manually");
        self.listeners.notify(&next);
        next
    }

    pub fn subscribe(&self, listener: impl Fn(&ThemePreference) + 'static) -> Subscription {
        self.listeners.add(listener)
    }
}

impl fmt::Debug for ThemeSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ThemeSynchronizer")
            .field("current", &state.current)
            .field("overridden", &state.overridden)
            .field("policy", &state.policy)
            .finish()
    }
}

/// A host preference set programmatically. Used where there is no browser
/// media query to listen to.
#[derive(Debug, Default)]
pub struct ManualHost {
    prefers_dark: std::cell::Cell<bool>,
    listeners: Listeners<bool>,
}

impl ManualHost {
    pub fn new(prefers_dark: bool) -> Self {
        Self {
            prefers_dark: std::cell::Cell::new(prefers_dark),
            listeners: Listeners::new(),
        }
    }

    pub fn set_prefers_dark(&self, prefers_dark: bool) {
        if self.prefers_dark.replace(prefers_dark) != prefers_dark {
            self.listeners.notify(&prefers_dark);
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.listeners.len()
    }
}

impl HostPreference for ManualHost {
    fn prefers_dark(&self) -> bool {
        self.prefers_dark.get()
    }

    fn watch(&self, on_change: Box<dyn Fn(bool)>) -> Subscription {
        self.listeners.add(move |value| on_change(*value))
    }
}
