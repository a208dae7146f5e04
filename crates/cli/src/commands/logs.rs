use std::io::IsTerminal;

use extdev::{ControlPlane, LogFilter, LogSubscription, RenderOptions};

use crate::cli::LogsArgs;
use crate::config::Settings;
use crate::error::Result;
use crate::output;

/// Flags layered over the config file's `logs` section.
pub fn log_filter(args: &LogsArgs, base: &LogFilter) -> LogFilter {
	let mut filter = base.clone();
	if let Some(level) = args.level {
		filter.min_level = level;
	}
	if !args.contexts.is_empty() {
		filter.contexts = Some(args.contexts.clone());
	}
	if let Some(pattern) = &args.url_pattern {
		filter.url_pattern = Some(pattern.clone());
	}
	if let Some(tab) = &args.tab {
		filter.tab = Some(tab.clone());
	}
	filter
}

/// Flags layered over the config file's `render` section.
///
/// Color also needs a terminal on stdout.
pub fn render_options(args: &LogsArgs, base: &RenderOptions, is_terminal: bool) -> RenderOptions {
	RenderOptions {
		format: args.format.map(Into::into).unwrap_or(base.format),
		timestamps: base.timestamps && !args.no_timestamps,
		color: base.color && !args.no_color && is_terminal,
	}
}

pub async fn execute(settings: &Settings, args: LogsArgs) -> Result<()> {
	let filter = log_filter(&args, &settings.project.logs);
	let render = render_options(&args, &settings.project.render, std::io::stdout().is_terminal());

	let plane = ControlPlane::connect(settings.control_options()).await?;
	let mut subscription = plane.logs(filter).await?;

	tokio::select! {
		result = pump(&mut subscription, &render) => result?,
		_ = tokio::signal::ctrl_c() => {}
	}

	drop(subscription);
	plane.close();
	Ok(())
}

/// Prints events until the connection ends or stdout goes away.
pub(crate) async fn pump(subscription: &mut LogSubscription, render: &RenderOptions) -> std::io::Result<()> {
	while let Some(event) = subscription.next().await {
		if !output::print_log_event(&event, render)? {
			break;
		}
	}
	Ok(())
}
