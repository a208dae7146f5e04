mod dev;
mod identity;
mod inspect;
mod logs;

pub use dev::{DevSession, parse_build_event, read_build_events};
pub use logs::{log_filter, render_options};

use crate::cli::{Cli, Commands};
use crate::config::{ProjectConfig, Settings};
use crate::error::Result;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let cwd = std::env::current_dir()?;
	let project = ProjectConfig::load(cli.config.as_deref(), &cwd)?;
	let settings = Settings::resolve(&cli, project)?;

	match cli.command {
		Commands::Inspect(args) => inspect::execute(&settings, args).await,
		Commands::Logs(args) => logs::execute(&settings, args).await,
		Commands::Dev(args) => dev::execute(&settings, args).await,
		Commands::Identity(args) => identity::execute(&settings, args).await,
	}
}
