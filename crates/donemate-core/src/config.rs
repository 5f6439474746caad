#[cfg(feature = "native")]
use std::fs;
use std::path::PathBuf;
#[cfg(feature = "native")]
use std::path::Path;

#[cfg(feature = "native")]
use anyhow::anyhow;
use anyhow::Context;
use serde::{
  Deserialize,
  Serialize
};
#[cfg(feature = "native")]
use tracing::info;
use tracing::{
  debug,
  warn
};

use crate::theme::OverridePolicy;

pub const DEFAULT_STORAGE_KEY: &str =
  "DoneMateItems";
pub const DEFAULT_MIN_LOADING_MS: u32 =
  600;

#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(default)]
pub struct Config {
  pub storage:  StorageConfig,
  pub theme:    ThemeConfig,
  pub identity: IdentityConfig,
  pub startup:  StartupConfig
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(default)]
pub struct StorageConfig {
  pub key:      String,
  pub data_dir: Option<PathBuf>
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      key:      DEFAULT_STORAGE_KEY
        .to_string(),
      data_dir: None
    }
  }
}

#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(default)]
pub struct ThemeConfig {
  pub override_policy: OverridePolicy
}

#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(default)]
pub struct IdentityConfig {
  pub url:         String,
  pub anon_key:    String,
  pub redirect_to: String
}

impl IdentityConfig {
  /// Auth gating is on only when a
  /// provider URL and key are set.
  pub fn is_configured(
    &self
  ) -> bool {
    !self.url.trim().is_empty()
      && !self
        .anon_key
        .trim()
        .is_empty()
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(default)]
pub struct StartupConfig {
  pub min_loading_ms: u32
}

impl Default for StartupConfig {
  fn default() -> Self {
    Self {
      min_loading_ms:
        DEFAULT_MIN_LOADING_MS
    }
  }
}

impl Config {
  pub fn from_toml_str(
    text: &str
  ) -> anyhow::Result<Self> {
    let mut cfg: Config =
      toml::from_str(text).context(
        "failed to parse config \
         toml"
      )?;
    cfg.sanitize();
    Ok(cfg)
  }

  /// Loads the config file, falling
  /// back to defaults when none
  /// exists.
  #[cfg(feature = "native")]
  #[tracing::instrument(skip(
    path_override
  ))]
  pub fn load(
    path_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let Some(path) =
      resolve_config_path(
        path_override
      )?
    else {
      warn!(
        "no config file found; using \
         defaults"
      );
      return Ok(Self::default());
    };

    info!(config = %path.display(), "loading config");
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    Self::from_toml_str(&text)
      .with_context(|| {
        format!(
          "invalid config {}",
          path.display()
        )
      })
  }

  fn sanitize(&mut self) {
    let key =
      self.storage.key.trim();
    if key.is_empty() {
      warn!(
        default = DEFAULT_STORAGE_KEY,
        "blank storage key in \
         config; using default"
      );
      self.storage.key =
        DEFAULT_STORAGE_KEY
          .to_string();
    } else if key.len()
      != self.storage.key.len()
    {
      self.storage.key =
        key.to_string();
    }

    self.startup.min_loading_ms = self
      .startup
      .min_loading_ms
      .min(10_000);

    debug!(
      key = %self.storage.key,
      policy = ?self.theme.override_policy,
      identity = self.identity.is_configured(),
      "config sanitized"
    );
  }
}

#[cfg(feature = "native")]
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.storage.data_dir.as_deref()
  {
    expand_tilde(cfg_value)
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[cfg(feature = "native")]
fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(expand_tilde(
      path
    )));
  }

  if let Ok(from_env) =
    std::env::var("DONEMATE_CONFIG")
  {
    if from_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(expand_tilde(
      Path::new(&from_env)
    )));
  }

  let candidate = dirs::config_dir()
    .map(|dir| {
      dir
        .join("donemate")
        .join("config.toml")
    });
  Ok(candidate.filter(|path| {
    path.exists()
  }))
}

#[cfg(feature = "native")]
fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let base = dirs::data_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine data \
         directory"
      )
    })?;
  Ok(base.join("donemate"))
}

#[cfg(feature = "native")]
fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::{
    Config,
    DEFAULT_STORAGE_KEY
  };
  use crate::theme::OverridePolicy;

  #[test]
  fn empty_toml_yields_defaults() {
    let cfg = Config::from_toml_str("")
      .expect("parse empty config");
    assert_eq!(cfg, Config::default());
    assert_eq!(
      cfg.storage.key,
      DEFAULT_STORAGE_KEY
    );
    assert!(
      !cfg.identity.is_configured()
    );
  }

  #[test]
  fn reads_all_sections() {
    let cfg = Config::from_toml_str(
      r#"
        [storage]
        key = "  work-tasks "
        data_dir = "/tmp/donemate"

        [theme]
        override_policy = "follow-host"

        [identity]
        url = "https://abc.supabase.co"
        anon_key = "public-anon"

        [startup]
        min_loading_ms = 50000
      "#
    )
    .expect("parse config");

    assert_eq!(
      cfg.storage.key,
      "work-tasks"
    );
    assert_eq!(
      cfg.theme.override_policy,
      OverridePolicy::FollowHost
    );
    assert!(
      cfg.identity.is_configured()
    );
    assert_eq!(
      cfg.startup.min_loading_ms,
      10_000
    );
  }

  #[test]
  fn blank_key_falls_back() {
    let cfg = Config::from_toml_str(
      "[storage]\nkey = \"   \"\n"
    )
    .expect("parse config");
    assert_eq!(
      cfg.storage.key,
      DEFAULT_STORAGE_KEY
    );
  }

  #[test]
  fn rejects_unknown_policy() {
    assert!(
      Config::from_toml_str(
        "[theme]\noverride_policy = \
         \"sometimes\"\n"
      )
      .is_err()
    );
  }
}
