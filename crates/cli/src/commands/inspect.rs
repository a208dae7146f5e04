use extdev::{ControlPlane, ExtractOptions};
use tracing::info;

use crate::cli::InspectArgs;
use crate::config::Settings;
use crate::error::{CliError, Result};
use crate::output;

pub async fn execute(settings: &Settings, args: InspectArgs) -> Result<()> {
	let url = args
		.url
		.or_else(|| settings.project.start_url.clone())
		.ok_or_else(|| CliError::Missing("no URL given; pass one or set \"startUrl\" in extdev.json".into()))?;
	let shadow = args.shadow.map(Into::into).or(settings.project.shadow).unwrap_or_default();
	let max_bytes = args.max_bytes.or(settings.project.max_bytes);

	let plane = ControlPlane::connect(settings.control_options()).await?;
	let options = ExtractOptions {
		shadow,
		..ExtractOptions::default()
	};
	let html = plane.extract(&url, options).await;
	plane.close();
	let html = html?;

	info!(target = "extdev", %url, %shadow, bytes = html.len(), "extracted page");
	if html.is_empty() {
		output::note("the page produced no HTML before the deadline");
	}
	output::print_html(&html, max_bytes)?;
	Ok(())
}
