mod app;
mod cache;
mod cli;
mod config;
mod logging;
mod mutation;
mod notify;
mod output;
mod prefs;
mod query;
mod remote;
mod resources;
mod search;

use clap::Parser;
use color_eyre::Result;

use crate::cli::{Args, Command};
use crate::prefs::PreferenceStore;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Logs go to a file; keep the writer alive for the whole run
  let _log_guard = logging::init()?;

  let prefs = PreferenceStore::open()?;

  // Preferences are local and work without backend credentials
  if let Command::Prefs { command } = args.command {
    return app::run_prefs(&prefs, command);
  }

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let mut app = app::App::new(config, prefs)?;
  app.run(args.command).await?;

  Ok(())
}
