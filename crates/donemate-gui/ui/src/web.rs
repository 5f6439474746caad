use anyhow::anyhow;
use donemate_core::config::Config;
use donemate_core::observe::Subscription;
use donemate_core::store::KeyValueStore;
use donemate_core::theme::{HostPreference, ThemeApplier, ThemePreference};
use gloo::events::EventListener;
use tracing::{debug, warn};
use web_sys::{MediaQueryList, Storage};

const CONFIG_TOML: &str = include_str!("../assets/config.toml");
const DARK_SCHEME_QUERY: &str = "(prefers-color-scheme: dark)";
const THEME_ATTRIBUTE: &str = "data-theme";

pub fn load_config() -> Config {
    match Config::from_toml_str(CONFIG_TOML) {
        Ok(cfg) => cfg,
        Err(error) => {
            warn!(error = %format!("{error:#}"), "bundled config invalid; using defaults");
            Config::default()
        }
    }
}

fn local_storage() -> anyhow::Result<Storage> {
    web_sys::window()
        .ok_or_else(|| anyhow!("no window"))?
        .local_storage()
        .map_err(|err| anyhow!("localStorage unavailable: {err:?}"))?
        .ok_or_else(|| anyhow!("localStorage disabled"))
}

/// The browser's `localStorage`. Every call looks the storage object up
/// again, so a storage that disappears mid-session only fails that call.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorageStore;

impl KeyValueStore for LocalStorageStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        local_storage()?
            .get_item(key)
            .map_err(|err| anyhow!("reading {key} failed: {err:?}"))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        local_storage()?
            .set_item(key, value)
            .map_err(|err| anyhow!("writing {key} failed: {err:?}"))
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        local_storage()?
            .remove_item(key)
            .map_err(|err| anyhow!("removing {key} failed: {err:?}"))
    }
}

/// `prefers-color-scheme: dark` media query.
pub struct MediaQueryHost {
    query: Option<MediaQueryList>,
}

impl MediaQueryHost {
    pub fn new() -> Self {
        let query = web_sys::window().and_then(|window| window.match_media(DARK_SCHEME_QUERY).ok().flatten());
        if query.is_none() {
            warn!("matchMedia unavailable; theme will not follow the system");
        }
        Self { query }
    }
}

impl HostPreference for MediaQueryHost {
    fn prefers_dark(&self) -> bool {
        self.query.as_ref().is_some_and(MediaQueryList::matches)
    }

    fn watch(&self, on_change: Box<dyn Fn(bool)>) -> Subscription {
        let Some(query) = self.query.clone() else {
            return Subscription::detached();
        };

        let target = query.clone();
        let listener = EventListener::new(&target, "change", move |_| {
            on_change(query.matches());
        });
        debug!("watching system color scheme");

        Subscription::new(move || {
            drop(listener);
            debug!("stopped watching system color scheme");
        })
    }
}

/// Writes the theme onto `<html data-theme="...">`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootAttributeApplier;

impl ThemeApplier for RootAttributeApplier {
    fn apply(&self, theme: ThemePreference) {
        let root = web_sys::window()
            .and_then(|window| window.document())
            .and_then(|document| document.document_element());

        match root {
            Some(root) => {
                if let Err(err) = root.set_attribute(THEME_ATTRIBUTE, theme.as_attr()) {
                    warn!(error = ?err, "failed to apply theme attribute");
                }
            }
            None => warn!("no document root; theme not applied"),
        }
    }
}

pub fn location_hash() -> String {
    web_sys::window()
        .and_then(|window| window.location().hash().ok())
        .unwrap_or_default()
}

/// Drops the fragment from the address bar without reloading.
pub fn clear_location_hash() {
    let Some(window) = web_sys::window() else {
        return;
    };
    let location = window.location();
    let path = format!(
        "{}{}",
        location.pathname().unwrap_or_default(),
        location.search().unwrap_or_default()
    );
    if let Ok(history) = window.history()
        && let Err(err) = history.replace_state_with_url(&wasm_bindgen::JsValue::NULL, "", Some(&path))
    {
        warn!(error = ?err, "failed to clear location hash");
    }
}

pub fn location_origin() -> String {
    web_sys::window()
        .and_then(|window| window.location().origin().ok())
        .unwrap_or_default()
}

pub fn navigate(url: &str) -> anyhow::Result<()> {
    web_sys::window()
        .ok_or_else(|| anyhow!("no window"))?
        .location()
        .set_href(url)
        .map_err(|err| anyhow!("navigation failed: {err:?}"))
}

#[cfg(test)]
mod tests {
    use donemate_core::config::DEFAULT_STORAGE_KEY;
    use donemate_core::theme::OverridePolicy;

    use super::load_config;

    #[test]
    fn bundled_config_parses() {
        let cfg = load_config();
        assert_eq!(cfg.storage.key, DEFAULT_STORAGE_KEY);
        assert_eq!(cfg.theme.override_policy, OverridePolicy::Sticky);
        assert!(!cfg.identity.is_configured());
    }
}
