pub mod app;
pub mod cli;
pub mod codec;
pub mod commands;
pub mod config;
pub mod form;
pub mod render;
pub mod storage;
pub mod store;
pub mod task;

use std::ffi::OsString;
use std::io;

use anyhow::{
  Context,
  bail
};
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::app::App;
use crate::storage::FileStore;
use crate::store::{
  LoadOutcome,
  TaskStore
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting todo CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.todorc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  )?;

  let data_dir = cfg
    .data_dir(cli.data.as_deref())
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage = FileStore::open(
    &data_dir
  )
  .with_context(|| {
    format!(
      "failed to open storage at {}",
      data_dir.display()
    )
  })?;

  let command =
    cli.command.unwrap_or_default();
  let (mut app, outcome) = App::open(
    TaskStore::with_key(
      storage,
      cfg.storage.key.clone()
    )
  )?;

  if let LoadOutcome::Corrupt(err) =
    &outcome
    && command.mutates()
  {
    bail!(
      "refusing to modify {}: {err}",
      data_dir.display()
    );
  }

  let renderer =
    render::Renderer::new(&cfg);
  commands::dispatch(
    &mut app,
    &renderer,
    command,
    io::stdout().lock()
  )?;

  info!("done");
  Ok(())
}
