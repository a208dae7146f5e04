use std::path::Path;
use std::sync::Arc;

use extdev::{Backend, ChromiumExtensions, ControlPlane, FirefoxTargets, ManifestInfo, ProfileHints};
use serde_json::Value;

use crate::cli::IdentityArgs;
use crate::config::Settings;
use crate::error::Result;
use crate::output;

pub async fn execute(settings: &Settings, args: IdentityArgs) -> Result<()> {
	let extension = settings.extension_dir(args.extension)?;
	let plane = ControlPlane::connect(settings.control_options()).await?;

	let id = match plane.backend() {
		Backend::Chromium(targets) => {
			let hints = args
				.profile
				.or_else(|| settings.project.profile.clone())
				.map(|profile| ProfileHints::from_profile(&profile))
				.unwrap_or_default();
			let extensions = ChromiumExtensions::new(Arc::clone(targets.connection()));
			extensions.derive_identity(&extension, &hints).await?.map(|identity| identity.id)
		}
		Backend::Firefox(targets) => addon_id(targets, &extension).await?,
	};
	plane.close();

	match id {
		Some(id) => println!("{id}"),
		None => output::note(&format!("no running extension matches {} yet", extension.display())),
	}
	Ok(())
}

/// Firefox reports add-on ids directly; match the installed one by manifest name.
async fn addon_id(targets: &FirefoxTargets, extension: &Path) -> extdev::Result<Option<String>> {
	let manifest = ManifestInfo::read(extension)?;
	let addons = targets.list_addons().await?;
	Ok(addons
		.iter()
		.filter(|addon| addon.get("name").and_then(Value::as_str).is_some_and(|name| manifest.matches_name(name)))
		.find_map(|addon| addon.get("id").and_then(Value::as_str).map(str::to_string)))
}
