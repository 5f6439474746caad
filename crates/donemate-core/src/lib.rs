pub mod auth;
#[cfg(feature = "native")]
pub mod cli;
#[cfg(feature = "native")]
pub mod commands;
pub mod config;
pub mod identity;
pub mod observe;
#[cfg(feature = "native")]
pub mod render;
pub mod session;
pub mod store;
pub mod supabase;
pub mod task;
pub mod tasks;
pub mod theme;

#[cfg(feature = "native")]
use std::ffi::OsString;

#[cfg(feature = "native")]
use anyhow::Context;
#[cfg(feature = "native")]
use clap::Parser;
#[cfg(feature = "native")]
use tracing::{
  debug,
  info
};

#[cfg(feature = "native")]
#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(
      raw_args
    );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting donemate CLI"
  );

  let cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  debug!(?cfg, "effective config");

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let backend =
    store::FileStore::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open task store \
           at {}",
          data_dir.display()
        )
      })?;

  let mut list =
    tasks::TaskList::open(
      store::DurableStore::new(
        backend,
        cfg.storage.key.clone()
      )
    );

  let mut renderer =
    render::Renderer::new(
      !cli.no_color
    );

  commands::dispatch(
    &mut list,
    &mut renderer,
    cli
      .command
      .unwrap_or(cli::Command::List)
  )?;

  info!("done");
  Ok(())
}
