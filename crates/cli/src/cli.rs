use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use extdev::protocol::{LogContext, LogLevel};
use extdev::{BrowserFamily, LogFormat, ShadowMode};

use crate::styles::cli_styles;

/// Browser family (CLI wrapper for extdev::BrowserFamily)
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BrowserKind {
	/// Chrome, Chromium, Edge, Brave (DevTools Protocol)
	Chromium,
	/// Firefox (Remote Debugging Protocol)
	Firefox,
}

impl From<BrowserKind> for BrowserFamily {
	fn from(kind: BrowserKind) -> Self {
		match kind {
			BrowserKind::Chromium => BrowserFamily::Chromium,
			BrowserKind::Firefox => BrowserFamily::Firefox,
		}
	}
}

/// Shadow DOM handling (CLI wrapper for extdev::ShadowMode)
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliShadowMode {
	/// Light DOM only
	Off,
	/// Merge the extension's content-script shadow root
	OpenOnly,
	/// Also emit every other open shadow root as a declarative template
	All,
}

impl From<CliShadowMode> for ShadowMode {
	fn from(mode: CliShadowMode) -> Self {
		match mode {
			CliShadowMode::Off => ShadowMode::Off,
			CliShadowMode::OpenOnly => ShadowMode::OpenOnly,
			CliShadowMode::All => ShadowMode::All,
		}
	}
}

/// Log output format (CLI wrapper for extdev::LogFormat)
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliLogFormat {
	/// One colored line per event
	Pretty,
	/// Pretty-printed JSON objects
	Json,
	/// One JSON object per line
	Ndjson,
}

impl From<CliLogFormat> for LogFormat {
	fn from(format: CliLogFormat) -> Self {
		match format {
			CliLogFormat::Pretty => LogFormat::Pretty,
			CliLogFormat::Json => LogFormat::Json,
			CliLogFormat::Ndjson => LogFormat::Ndjson,
		}
	}
}

#[derive(Parser, Debug)]
#[command(name = "extdev")]
#[command(about = "Remote-debugging control plane for browser extension development")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Browser family to talk to
	#[arg(short, long, global = true, value_enum)]
	pub browser: Option<BrowserKind>,

	/// Debug port (defaults to the instance's allocated port)
	#[arg(short, long, global = true)]
	pub port: Option<u16>,

	/// Host the debugger listens on
	#[arg(long, global = true)]
	pub host: Option<String>,

	/// Instance name used to allocate a debug port and profile
	#[arg(long, global = true, value_name = "NAME")]
	pub instance: Option<String>,

	/// Project config file (defaults to ./extdev.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Print the live HTML of a page, content-script shadow DOM included
	Inspect(InspectArgs),
	/// Stream console output from pages and extension contexts
	Logs(LogsArgs),
	/// Launch the browser with the extension and reload it on every build
	Dev(DevArgs),
	/// Print the runtime id of an installed extension
	Identity(IdentityArgs),
}

#[derive(Args, Debug)]
pub struct InspectArgs {
	/// Page to inspect (defaults to startUrl from the config file)
	pub url: Option<String>,

	/// Which shadow roots to merge into the output
	#[arg(long, value_enum)]
	pub shadow: Option<CliShadowMode>,

	/// Cap output at this many bytes (0 disables)
	#[arg(long, value_name = "N")]
	pub max_bytes: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct LogsArgs {
	/// Minimum level: trace, debug, log, info, warn, error
	#[arg(long)]
	pub level: Option<LogLevel>,

	/// Only these contexts (repeatable): page, background, content, sidebar, popup, options, devtools
	#[arg(long = "context", value_name = "CONTEXT")]
	pub contexts: Vec<LogContext>,

	/// Only events whose url contains this text
	#[arg(long, value_name = "TEXT")]
	pub url_pattern: Option<String>,

	/// Only events from tabs whose id contains this text
	#[arg(long)]
	pub tab: Option<String>,

	/// Output format
	#[arg(long, value_enum)]
	pub format: Option<CliLogFormat>,

	/// Omit timestamps from pretty output
	#[arg(long)]
	pub no_timestamps: bool,

	/// Disable colored output
	#[arg(long)]
	pub no_color: bool,
}

#[derive(Args, Debug)]
pub struct DevArgs {
	/// Built extension directory (the one containing manifest.json)
	#[arg(long, value_name = "DIR")]
	pub extension: Option<PathBuf>,

	/// Page to open once the browser is up
	#[arg(long, value_name = "URL")]
	pub start_url: Option<String>,

	/// Browser profile directory (defaults to a per-instance cache dir)
	#[arg(long, value_name = "DIR")]
	pub profile: Option<PathBuf>,

	/// Browser executable (defaults to a search of common locations and PATH)
	#[arg(long, value_name = "PATH")]
	pub executable: Option<PathBuf>,

	/// Also stream logs while developing
	#[arg(long)]
	pub logs: bool,

	#[command(flatten)]
	pub log_args: LogsArgs,
}

#[derive(Args, Debug)]
pub struct IdentityArgs {
	/// Built extension directory (the one containing manifest.json)
	#[arg(long, value_name = "DIR")]
	pub extension: Option<PathBuf>,

	/// Chromium profile whose install records help disambiguate
	#[arg(long, value_name = "DIR")]
	pub profile: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn global_flags_work_after_the_subcommand() {
		let cli = Cli::try_parse_from(["extdev", "inspect", "https://example.com", "--port", "9333", "-vv", "--browser", "firefox"]).unwrap();
		assert_eq!(cli.port, Some(9333));
		assert_eq!(cli.verbose, 2);
		assert_eq!(cli.browser, Some(BrowserKind::Firefox));
		let Commands::Inspect(args) = cli.command else {
			panic!("expected inspect");
		};
		assert_eq!(args.url.as_deref(), Some("https://example.com"));
		assert_eq!(args.shadow, None);
	}

	#[test]
	fn logs_flags_parse_into_protocol_types() {
		let cli = Cli::try_parse_from([
			"extdev",
			"logs",
			"--level",
			"WARN",
			"--context",
			"background",
			"--context",
			"content",
			"--format",
			"ndjson",
			"--no-color",
		])
		.unwrap();
		let Commands::Logs(args) = cli.command else {
			panic!("expected logs");
		};
		assert_eq!(args.level, Some(LogLevel::Warn));
		assert_eq!(args.contexts, vec![LogContext::Background, LogContext::Content]);
		assert_eq!(args.format, Some(CliLogFormat::Ndjson));
		assert!(args.no_color);
		assert!(!args.no_timestamps);
	}

	#[test]
	fn shadow_mode_uses_kebab_case_values() {
		let cli = Cli::try_parse_from(["extdev", "inspect", "--shadow", "open-only"]).unwrap();
		let Commands::Inspect(args) = cli.command else {
			panic!("expected inspect");
		};
		assert_eq!(args.shadow.map(ShadowMode::from), Some(ShadowMode::OpenOnly));
	}

	#[test]
	fn unknown_context_is_rejected() {
		assert!(Cli::try_parse_from(["extdev", "logs", "--context", "worker"]).is_err());
	}

	#[test]
	fn dev_accepts_log_filters() {
		let cli = Cli::try_parse_from(["extdev", "dev", "--extension", "dist", "--logs", "--level", "error"]).unwrap();
		let Commands::Dev(args) = cli.command else {
			panic!("expected dev");
		};
		assert_eq!(args.extension, Some(PathBuf::from("dist")));
		assert!(args.logs);
		assert_eq!(args.log_args.level, Some(LogLevel::Error));
	}
}
