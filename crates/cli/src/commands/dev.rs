//! `extdev dev`: launch, install, then reload on every build.
//!
//! Build notifications arrive as NDJSON on stdin, one [`BuildEvent`] per line.
//! The first successful build launches the browser; later ones go through the
//! reload engine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use extdev::protocol::{BuildEvent, ReloadIntent};
use extdev::{
	Backend, BrowserFamily, BrowserProcess, ChromiumExtensions, ControlPlane, ExtensionController, FirefoxAddons, LaunchSpec, LogFilter, ManifestInfo,
	ProfileHints, ReloadActions, ReloadEngine, ReloadPolicy, RenderOptions, launch_browser,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::logs::{log_filter, pump, render_options};
use crate::cli::DevArgs;
use crate::config::Settings;
use crate::error::Result;
use crate::output;

const EVENT_BUFFER: usize = 64;

pub async fn execute(settings: &Settings, args: DevArgs) -> Result<()> {
	let extension = settings.extension_dir(args.extension.clone())?;
	let manifest = ManifestInfo::read(&extension)?;
	let policy = ReloadPolicy::default().with_background_entries(manifest.background_entries.clone());

	let logs = args.logs.then(|| {
		use std::io::IsTerminal;
		(
			log_filter(&args.log_args, &settings.project.logs),
			render_options(&args.log_args, &settings.project.render, std::io::stdout().is_terminal()),
		)
	});
	let session = DevSession {
		settings: settings.clone(),
		profile_dir: settings.profile_dir(args.profile.as_deref()),
		start_url: args.start_url.or_else(|| settings.project.start_url.clone()),
		executable: args.executable,
		extension,
		logs,
		process: None,
		plane: None,
		controller: None,
		extension_id: None,
		log_task: None,
	};
	output::status("Watching", &format!("build events on stdin for {} {}", manifest.name, manifest.version));

	let (tx, rx) = mpsc::channel(EVENT_BUFFER);
	let reader = tokio::spawn(read_build_events(tokio::io::stdin(), tx));
	let mut engine = ReloadEngine::new(session, policy);

	tokio::select! {
		_ = engine.run(rx) => debug!(target = "extdev", "build input closed"),
		_ = tokio::signal::ctrl_c() => debug!(target = "extdev", "interrupted"),
	}

	reader.abort();
	engine.into_actions().shutdown();
	Ok(())
}

/// Decodes one NDJSON build notification.
pub fn parse_build_event(line: &str) -> serde_json::Result<BuildEvent> {
	serde_json::from_str(line)
}

/// Forwards build events from `input` until it ends or the receiver goes away.
///
/// Blank and undecodable lines are skipped.
pub async fn read_build_events<R>(input: R, tx: mpsc::Sender<BuildEvent>) -> anyhow::Result<()>
where
	R: AsyncRead + Unpin,
{
	let mut lines = BufReader::new(input).lines();
	while let Some(line) = lines.next_line().await.context("reading build events")? {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}
		match parse_build_event(line) {
			Ok(event) => {
				if tx.send(event).await.is_err() {
					break;
				}
			}
			Err(e) => warn!(target = "extdev", error = %e, "ignoring malformed build event"),
		}
	}
	Ok(())
}

enum Controller {
	Chromium(ChromiumExtensions),
	Firefox(FirefoxAddons),
}

impl Controller {
	fn as_dyn(&self) -> &dyn ExtensionController {
		match self {
			Controller::Chromium(extensions) => extensions,
			Controller::Firefox(addons) => addons,
		}
	}
}

/// The browser side of a dev session.
pub struct DevSession {
	settings: Settings,
	extension: PathBuf,
	profile_dir: PathBuf,
	start_url: Option<String>,
	executable: Option<PathBuf>,
	logs: Option<(LogFilter, RenderOptions)>,
	process: Option<BrowserProcess>,
	plane: Option<ControlPlane>,
	controller: Option<Controller>,
	extension_id: Option<String>,
	log_task: Option<JoinHandle<()>>,
}

impl DevSession {
	fn launch_spec(&self) -> LaunchSpec {
		let mut spec = LaunchSpec::new(self.settings.browser, self.settings.port, &self.profile_dir);
		if self.settings.browser == BrowserFamily::Chromium {
			spec = spec.with_extensions([self.extension.clone()]);
		}
		if let Some(url) = &self.start_url {
			spec = spec.with_start_url(url.clone());
		}
		spec.executable = self.executable.clone();
		spec
	}

	fn remember_profile(&self) {
		let Some(registry) = &self.settings.registry else {
			return;
		};
		registry.set_profile_dir(&self.settings.instance, &self.profile_dir);
		if let Err(e) = registry.save() {
			warn!(target = "extdev", error = %e, "could not persist instance registry");
		}
	}

	/// Connects to the freshly launched browser and installs the extension.
	async fn attach(&mut self) -> extdev::Result<()> {
		let plane = ControlPlane::connect(self.settings.control_options()).await?;
		let controller = match plane.backend() {
			Backend::Chromium(targets) => Controller::Chromium(ChromiumExtensions::new(Arc::clone(targets.connection()))),
			Backend::Firefox(targets) => Controller::Firefox(FirefoxAddons::new(Arc::clone(targets.connection()))),
		};

		// Chromium loads the extension from the command line; only its id is unknown.
		self.extension_id = match &controller {
			Controller::Chromium(extensions) => {
				let hints = ProfileHints::from_profile(&self.profile_dir);
				extensions.derive_identity(&self.extension, &hints).await?.map(|identity| identity.id)
			}
			Controller::Firefox(addons) => Some(addons.install(&self.extension).await?),
		};
		match &self.extension_id {
			Some(id) => output::status("Installed", &format!("{id} from {}", self.extension.display())),
			None => output::note("extension id not known yet; it will be derived again before the next reload"),
		}

		if let Some((filter, render)) = &self.logs {
			let mut subscription = plane.logs(filter.clone()).await?;
			let render = *render;
			self.log_task = Some(tokio::spawn(async move {
				if let Err(e) = pump(&mut subscription, &render).await {
					warn!(target = "extdev", error = %e, "log output failed");
				}
			}));
		}

		self.plane = Some(plane);
		self.controller = Some(controller);
		Ok(())
	}

	async fn rederive_id(&self) -> Option<String> {
		let Some(Controller::Chromium(extensions)) = &self.controller else {
			return None;
		};
		let hints = ProfileHints::from_profile(&self.profile_dir);
		match extensions.rederive_identity(&self.extension, &hints).await {
			Ok(identity) => identity.map(|identity| identity.id),
			Err(e) => {
				debug!(target = "extdev.identity", error = %e, "identity derivation failed");
				None
			}
		}
	}

	/// Stops log output, disconnects, and kills the browser this session launched.
	pub fn shutdown(&mut self) {
		if let Some(task) = self.log_task.take() {
			task.abort();
		}
		if let Some(plane) = self.plane.take() {
			plane.close();
		}
		if let Some(mut process) = self.process.take() {
			if let Err(e) = process.kill() {
				warn!(target = "extdev", pid = process.pid(), error = %e, "could not stop browser");
			}
		}
	}
}

#[async_trait]
impl ReloadActions for DevSession {
	async fn launch(&mut self) -> extdev::Result<()> {
		let process = launch_browser(&self.launch_spec())?;
		info!(target = "extdev", pid = process.pid(), executable = %process.executable, port = process.port, "browser launched");
		output::status("Launched", &format!("{} on port {}", process.family, process.port));
		self.process = Some(process);
		self.remember_profile();

		if let Err(e) = self.attach().await {
			self.shutdown();
			return Err(e);
		}
		Ok(())
	}

	async fn reload(&mut self, intent: &ReloadIntent) -> bool {
		if let Some(status) = self.process.as_mut().and_then(BrowserProcess::exited) {
			output::note(&format!("browser exited ({status}); not reloading"));
			return false;
		}
		if self.extension_id.is_none() {
			self.extension_id = self.rederive_id().await;
		}
		let (Some(controller), Some(id)) = (&self.controller, &self.extension_id) else {
			output::note("extension id still unknown; skipping reload");
			return false;
		};

		let reloaded = controller.as_dyn().force_reload(id).await;
		if reloaded {
			output::status("Reloaded", &format!("{} ({} changed assets)", intent.reason, intent.changed_assets.len()));
		}
		reloaded
	}
}

#[cfg(test)]
mod tests {
	use extdev::protocol::RebuildNotification;

	use super::*;

	#[test]
	fn parses_changed_and_built_lines() {
		let changed = parse_build_event(r#"{"event":"changed","files":["src/bg.ts"]}"#).unwrap();
		assert_eq!(
			changed,
			BuildEvent::Changed {
				files: vec!["src/bg.ts".into()]
			}
		);

		let built = parse_build_event(r#"{"event":"built","hasErrors":false,"emittedAssets":["manifest.json"]}"#).unwrap();
		assert_eq!(
			built,
			BuildEvent::Built(RebuildNotification {
				emitted_assets: vec!["manifest.json".into()],
				..RebuildNotification::default()
			})
		);
	}

	#[tokio::test]
	async fn reader_skips_blank_and_malformed_lines() {
		let input = b"{\"event\":\"changed\"}\n\nnot json\n{\"event\":\"built\",\"hasErrors\":true}\n".as_slice();
		let (tx, mut rx) = mpsc::channel(8);

		read_build_events(input, tx).await.unwrap();

		assert_eq!(rx.recv().await, Some(BuildEvent::Changed { files: Vec::new() }));
		let Some(BuildEvent::Built(notification)) = rx.recv().await else {
			panic!("expected a built event");
		};
		assert!(notification.has_errors);
		assert_eq!(rx.recv().await, None);
	}

	#[tokio::test]
	async fn reader_stops_when_the_engine_is_gone() {
		let input = b"{\"event\":\"changed\"}\n{\"event\":\"changed\"}\n".as_slice();
		let (tx, rx) = mpsc::channel(1);
		drop(rx);
		assert!(read_build_events(input, tx).await.is_ok());
	}
}
