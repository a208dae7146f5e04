//! Project config file and the resolved settings every command runs with.
//!
//! Precedence, lowest first: built-in defaults, `extdev.json`, command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use extdev::{BrowserFamily, ControlPlaneOptions, InstanceRegistry, LogFilter, ReadinessProbe, RenderOptions, ShadowMode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cli::Cli;
use crate::error::{CliError, Result};

pub const CONFIG_FILE: &str = "extdev.json";

pub const DEFAULT_INSTANCE: &str = "default";

/// Readiness probe overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeConfig {
	pub attempts: Option<u32>,
	pub interval_ms: Option<u64>,
}

/// Contents of `extdev.json`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
	pub browser: Option<BrowserFamily>,
	pub host: Option<String>,
	pub port: Option<u16>,
	pub base_port: Option<u16>,
	pub instance: Option<String>,
	pub extension: Option<PathBuf>,
	pub start_url: Option<String>,
	pub profile: Option<PathBuf>,
	pub shadow: Option<ShadowMode>,
	pub max_bytes: Option<usize>,
	pub logs: LogFilter,
	pub render: RenderOptions,
	pub probe: ProbeConfig,
}

impl ProjectConfig {
	/// Reads `explicit`, or `extdev.json` under `cwd`.
	///
	/// A missing default file yields the defaults; a missing explicit file or
	/// a malformed one is an error.
	pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
		let (path, required) = match explicit {
			Some(path) => (cwd.join(path), true),
			None => (cwd.join(CONFIG_FILE), false),
		};

		let text = match fs::read_to_string(&path) {
			Ok(text) => text,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => return Ok(Self::default()),
			Err(e) => {
				return Err(CliError::Config {
					path,
					reason: e.to_string(),
				});
			}
		};

		let config: Self = serde_json::from_str(&text).map_err(|e| CliError::Config {
			path: path.clone(),
			reason: e.to_string(),
		})?;
		debug!(target = "extdev", path = %path.display(), "loaded project config");
		Ok(config.relative_to(path.parent().unwrap_or(cwd)))
	}

	/// Resolves relative paths against the config file's directory.
	fn relative_to(mut self, dir: &Path) -> Self {
		self.extension = self.extension.map(|p| dir.join(p));
		self.profile = self.profile.map(|p| dir.join(p));
		self
	}
}

/// Everything a command needs to reach the browser.
#[derive(Debug, Clone)]
pub struct Settings {
	pub browser: BrowserFamily,
	pub host: String,
	pub port: u16,
	pub instance: String,
	pub probe: ReadinessProbe,
	pub project: ProjectConfig,
	/// Set when the port came from the registry rather than a flag or the config.
	pub registry: Option<Arc<InstanceRegistry>>,
}

impl Settings {
	/// Merges flags over `project`, allocating a port from the persisted
	/// instance registry when none was given.
	pub fn resolve(cli: &Cli, project: ProjectConfig) -> Result<Self> {
		let browser = browser_of(cli, &project);
		let base_port = project.base_port.unwrap_or_else(|| browser.default_base_port());
		let open_registry = || Arc::new(open_registry(base_port));
		Self::resolve_with(cli, project, open_registry)
	}

	/// Like [`resolve`](Self::resolve) with an injected registry.
	pub fn resolve_with(cli: &Cli, project: ProjectConfig, registry: impl FnOnce() -> Arc<InstanceRegistry>) -> Result<Self> {
		let browser = browser_of(cli, &project);
		let instance = cli
			.instance
			.clone()
			.or_else(|| project.instance.clone())
			.unwrap_or_else(|| DEFAULT_INSTANCE.to_string());
		let host = cli.host.clone().or_else(|| project.host.clone()).unwrap_or_else(|| "127.0.0.1".to_string());

		let mut probe = ReadinessProbe::default();
		if let Some(attempts) = project.probe.attempts {
			probe.attempts = attempts.max(1);
		}
		if let Some(ms) = project.probe.interval_ms {
			probe.interval = Duration::from_millis(ms);
		}

		let (port, registry) = match cli.port.or(project.port) {
			Some(port) => (port, None),
			None => {
				let registry = registry();
				let record = registry.allocate(&instance, browser).ok_or_else(|| CliError::NoFreePort {
					instance: instance.clone(),
					base_port: registry.base_port(),
				})?;
				if let Err(e) = registry.save() {
					warn!(target = "extdev", error = %e, "could not persist instance registry");
				}
				(record.port, Some(registry))
			}
		};

		debug!(target = "extdev", %browser, %host, port, %instance, "resolved settings");
		Ok(Self {
			browser,
			host,
			port,
			instance,
			probe,
			project,
			registry,
		})
	}

	pub fn control_options(&self) -> ControlPlaneOptions {
		let mut options = ControlPlaneOptions::new(self.browser, self.port);
		options.host = self.host.clone();
		options.probe = self.probe;
		options
	}

	/// Profile directory for launched browsers: flag, config, registry record, then cache dir.
	pub fn profile_dir(&self, explicit: Option<&Path>) -> PathBuf {
		if let Some(dir) = explicit.or(self.project.profile.as_deref()) {
			return dir.to_path_buf();
		}
		let recorded = self
			.registry
			.as_ref()
			.and_then(|registry| registry.get(&self.instance))
			.and_then(|record| record.profile_dir);
		recorded.unwrap_or_else(|| {
			dirs::cache_dir()
				.unwrap_or_else(std::env::temp_dir)
				.join("extdev")
				.join("profiles")
				.join(format!("{}-{}", self.instance, self.browser))
		})
	}

	/// Extension directory from the flag or the config file.
	pub fn extension_dir(&self, explicit: Option<PathBuf>) -> Result<PathBuf> {
		let dir = explicit
			.or_else(|| self.project.extension.clone())
			.ok_or_else(|| CliError::Missing("no extension directory given; pass --extension or set \"extension\" in extdev.json".into()))?;
		Ok(std::path::absolute(&dir)?)
	}
}

fn browser_of(cli: &Cli, project: &ProjectConfig) -> BrowserFamily {
	cli.browser.map(BrowserFamily::from).or(project.browser).unwrap_or_default()
}

fn open_registry(base_port: u16) -> InstanceRegistry {
	let Some(path) = InstanceRegistry::default_store() else {
		return InstanceRegistry::new(base_port);
	};
	match InstanceRegistry::load(&path, base_port) {
		Ok(registry) => registry,
		Err(e) => {
			warn!(target = "extdev", path = %path.display(), error = %e, "ignoring unreadable instance registry");
			InstanceRegistry::new(base_port)
		}
	}
}

#[cfg(test)]
mod tests {
	use clap::Parser;
	use extdev::protocol::LogLevel;
	use tempfile::TempDir;

	use super::*;

	fn cli(args: &[&str]) -> Cli {
		let mut argv = vec!["extdev"];
		argv.extend_from_slice(args);
		argv.push("identity");
		Cli::try_parse_from(argv).unwrap()
	}

	#[test]
	fn missing_default_file_gives_defaults() {
		let dir = TempDir::new().unwrap();
		assert_eq!(ProjectConfig::load(None, dir.path()).unwrap(), ProjectConfig::default());
	}

	#[test]
	fn missing_explicit_file_is_an_error() {
		let dir = TempDir::new().unwrap();
		let err = ProjectConfig::load(Some(Path::new("nope.json")), dir.path()).unwrap_err();
		assert!(matches!(err, CliError::Config { .. }));
	}

	#[test]
	fn malformed_file_is_an_error() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join(CONFIG_FILE), "{ \"port\": ").unwrap();
		let err = ProjectConfig::load(None, dir.path()).unwrap_err();
		assert!(err.to_string().starts_with("invalid config"), "{err}");
	}

	#[test]
	fn file_values_and_relative_paths() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join(CONFIG_FILE),
			r#"{
				"browser": "firefox",
				"extension": "dist",
				"startUrl": "https://example.com",
				"shadow": "all",
				"logs": {"minLevel": "warn", "urlPattern": "example"},
				"probe": {"attempts": 3, "intervalMs": 20}
			}"#,
		)
		.unwrap();

		let config = ProjectConfig::load(None, dir.path()).unwrap();
		assert_eq!(config.browser, Some(BrowserFamily::Firefox));
		assert_eq!(config.extension, Some(dir.path().join("dist")));
		assert_eq!(config.shadow, Some(ShadowMode::All));
		assert_eq!(config.logs.min_level, LogLevel::Warn);
		assert_eq!(config.logs.url_pattern.as_deref(), Some("example"));
		assert_eq!(config.probe.attempts, Some(3));
	}

	#[test]
	fn flags_win_over_config() {
		let project = ProjectConfig {
			browser: Some(BrowserFamily::Firefox),
			port: Some(7000),
			host: Some("localhost".into()),
			..ProjectConfig::default()
		};
		let settings = Settings::resolve_with(&cli(&["--port", "9333", "--browser", "chromium"]), project, || {
			panic!("registry must not be consulted when a port is given")
		})
		.unwrap();

		assert_eq!(settings.port, 9333);
		assert_eq!(settings.browser, BrowserFamily::Chromium);
		assert_eq!(settings.host, "localhost");
		assert!(settings.registry.is_none());
	}

	#[test]
	fn config_port_wins_over_registry() {
		let project = ProjectConfig {
			port: Some(7000),
			..ProjectConfig::default()
		};
		let settings = Settings::resolve_with(&cli(&[]), project, || panic!("registry must not be consulted")).unwrap();
		assert_eq!(settings.port, 7000);
	}

	#[test]
	fn registry_allocates_per_instance() {
		let registry = Arc::new(InstanceRegistry::new(9222));
		registry.allocate("other", BrowserFamily::Chromium);

		let settings = Settings::resolve_with(&cli(&["--instance", "mine"]), ProjectConfig::default(), || Arc::clone(&registry)).unwrap();
		assert_eq!(settings.instance, "mine");
		assert_eq!(settings.port, 9223);
		assert!(settings.registry.is_some());
	}

	#[test]
	fn probe_overrides_apply() {
		let project = ProjectConfig {
			port: Some(1),
			probe: ProbeConfig {
				attempts: Some(0),
				interval_ms: Some(15),
			},
			..ProjectConfig::default()
		};
		let settings = Settings::resolve_with(&cli(&[]), project, || panic!("unused")).unwrap();
		assert_eq!(settings.probe.attempts, 1);
		assert_eq!(settings.probe.interval, Duration::from_millis(15));
	}

	#[test]
	fn profile_dir_prefers_flag_then_config() {
		let project = ProjectConfig {
			port: Some(1),
			profile: Some(PathBuf::from("/cfg/profile")),
			..ProjectConfig::default()
		};
		let settings = Settings::resolve_with(&cli(&[]), project, || panic!("unused")).unwrap();
		assert_eq!(settings.profile_dir(Some(Path::new("/flag"))), PathBuf::from("/flag"));
		assert_eq!(settings.profile_dir(None), PathBuf::from("/cfg/profile"));
	}
}
