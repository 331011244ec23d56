pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod filter;
pub mod render;
pub mod state;
pub mod stats;
pub mod store;
pub mod task;
pub mod tracker;
pub mod worker;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use error::{
  Result,
  TrackerError
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
    "starting daytrack CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rcfile.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;
  let db_path =
    data_dir.join(config::DB_FILE_NAME);

  let store =
    store::TaskStore::open(&db_path)
      .with_context(|| {
        format!(
          "failed to open task store at \
           {}",
          db_path.display()
        )
      })?;

  let clock = Arc::new(
    clock::SystemClock::new(
      cfg.timezone()
    )
  );
  let mut tracker =
    tracker::Tracker::new(store, clock)
      .context(
        "failed to load tasks"
      )?;

  let mut renderer =
    render::Renderer::new(&cfg);

  commands::dispatch(
    &mut tracker,
    &cfg,
    &mut renderer,
    cli.command
  )?;

  info!("done");
  Ok(())
}
