//! Browser launching with a debugging port open.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::{debug, info};

use crate::browser::BrowserFamily;
use crate::error::{Error, Result};

/// Everything needed to start one browser instance.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
	pub family: BrowserFamily,
	pub port: u16,
	pub profile_dir: PathBuf,
	/// Unpacked extensions loaded at startup (Chromium only; Firefox installs over RDP).
	pub extensions: Vec<PathBuf>,
	pub start_url: Option<String>,
	/// Overrides executable lookup.
	pub executable: Option<PathBuf>,
}

impl LaunchSpec {
	pub fn new(family: BrowserFamily, port: u16, profile_dir: impl Into<PathBuf>) -> Self {
		Self {
			family,
			port,
			profile_dir: profile_dir.into(),
			extensions: Vec::new(),
			start_url: None,
			executable: None,
		}
	}

	pub fn with_extensions(mut self, extensions: impl IntoIterator<Item = PathBuf>) -> Self {
		self.extensions = extensions.into_iter().collect();
		self
	}

	pub fn with_start_url(mut self, url: impl Into<String>) -> Self {
		self.start_url = Some(url.into());
		self
	}

	/// Command-line arguments for this spec.
	pub fn args(&self) -> Vec<String> {
		match self.family {
			BrowserFamily::Chromium => chromium_args(self),
			BrowserFamily::Firefox => firefox_args(self),
		}
	}
}

fn chromium_args(spec: &LaunchSpec) -> Vec<String> {
	let mut args = vec![
		format!("--remote-debugging-port={}", spec.port),
		format!("--user-data-dir={}", spec.profile_dir.display()),
		"--no-first-run".to_string(),
		"--no-default-browser-check".to_string(),
		"--enable-unsafe-extension-debugging".to_string(),
	];
	if !spec.extensions.is_empty() {
		let joined = spec.extensions.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(",");
		args.push(format!("--load-extension={joined}"));
	}
	if let Some(url) = &spec.start_url {
		args.push(url.clone());
	}
	args
}

fn firefox_args(spec: &LaunchSpec) -> Vec<String> {
	let mut args = vec![
		"--start-debugger-server".to_string(),
		spec.port.to_string(),
		"-profile".to_string(),
		spec.profile_dir.display().to_string(),
		"-no-remote".to_string(),
	];
	if let Some(url) = &spec.start_url {
		args.push(url.clone());
	}
	args
}

/// Preferences a fresh Firefox profile needs before it accepts debugger clients.
pub const FIREFOX_PREFS: &[(&str, &str)] = &[
	("devtools.debugger.remote-enabled", "true"),
	("devtools.chrome.enabled", "true"),
	("devtools.debugger.prompt-connection", "false"),
	("xpinstall.signatures.required", "false"),
	("browser.shell.checkDefaultBrowser", "false"),
	("datareporting.policy.dataSubmissionEnabled", "false"),
];

/// Writes `user.js` into a Firefox profile directory.
pub fn write_firefox_prefs(profile_dir: &Path) -> Result<()> {
	std::fs::create_dir_all(profile_dir)?;
	let body: String = FIREFOX_PREFS
		.iter()
		.map(|(key, value)| format!("user_pref(\"{key}\", {value});\n"))
		.collect();
	std::fs::write(profile_dir.join("user.js"), body)?;
	Ok(())
}

fn first_available(candidates: Vec<String>) -> Option<String> {
	for candidate in candidates {
		if candidate.starts_with('/') || candidate.contains('\\') || candidate.contains(':') {
			if Path::new(&candidate).exists() {
				return Some(candidate);
			}
		} else if which::which(&candidate).is_ok() {
			return Some(candidate);
		}
	}
	None
}

fn windows_candidates(suffixes: &[&[&str]], commands: &[&str]) -> Vec<String> {
	let mut roots: Vec<PathBuf> = ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
		.into_iter()
		.filter_map(|key| std::env::var(key).ok().map(PathBuf::from))
		.collect();
	if roots.is_empty() {
		roots.push(PathBuf::from(r"C:\Program Files"));
		roots.push(PathBuf::from(r"C:\Program Files (x86)"));
	}

	let mut candidates = Vec::new();
	for root in roots {
		for suffix in suffixes {
			let path: PathBuf = suffix.iter().fold(root.clone(), |path, component| path.join(component));
			candidates.push(path.to_string_lossy().to_string());
		}
	}
	candidates.extend(commands.iter().map(|c| c.to_string()));
	candidates
}

/// Locates a Chromium-family browser: common install paths, then `PATH`.
pub fn find_chromium_executable() -> Option<String> {
	let candidates: Vec<String> = if cfg!(target_os = "macos") {
		[
			"/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
			"/Applications/Chromium.app/Contents/MacOS/Chromium",
			"/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
			"/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	} else if cfg!(target_os = "windows") {
		windows_candidates(
			&[
				&["Google", "Chrome", "Application", "chrome.exe"],
				&["Microsoft", "Edge", "Application", "msedge.exe"],
				&["BraveSoftware", "Brave-Browser", "Application", "brave.exe"],
				&["Chromium", "Application", "chrome.exe"],
			],
			&["chrome.exe", "msedge.exe", "brave.exe", "chromium.exe"],
		)
	} else {
		[
			"chromium",
			"chromium-browser",
			"google-chrome-stable",
			"google-chrome",
			"brave-browser",
			"brave",
			"/usr/bin/chromium",
			"/usr/bin/chromium-browser",
			"/usr/bin/google-chrome-stable",
			"/usr/bin/google-chrome",
			"/snap/bin/chromium",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	};
	first_available(candidates)
}

/// Locates Firefox (including Developer Edition and Nightly).
pub fn find_firefox_executable() -> Option<String> {
	let candidates: Vec<String> = if cfg!(target_os = "macos") {
		[
			"/Applications/Firefox Developer Edition.app/Contents/MacOS/firefox",
			"/Applications/Firefox Nightly.app/Contents/MacOS/firefox",
			"/Applications/Firefox.app/Contents/MacOS/firefox",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	} else if cfg!(target_os = "windows") {
		windows_candidates(
			&[&["Firefox Developer Edition", "firefox.exe"], &["Mozilla Firefox", "firefox.exe"]],
			&["firefox.exe"],
		)
	} else {
		[
			"firefox-developer-edition",
			"firefox-nightly",
			"firefox",
			"/usr/bin/firefox",
			"/snap/bin/firefox",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	};
	first_available(candidates)
}

/// A launched browser. The process is left running when this is dropped.
#[derive(Debug)]
pub struct BrowserProcess {
	child: Child,
	pub family: BrowserFamily,
	pub port: u16,
	pub executable: String,
}

impl BrowserProcess {
	pub fn pid(&self) -> u32 {
		self.child.id()
	}

	/// Exit status if the browser has already quit.
	pub fn exited(&mut self) -> Option<ExitStatus> {
		self.child.try_wait().ok().flatten()
	}

	pub fn kill(&mut self) -> Result<()> {
		if self.exited().is_none() {
			self.child.kill()?;
			let _ = self.child.wait();
		}
		Ok(())
	}
}

/// Starts a browser in its own process group so terminal signals do not reach it.
pub fn launch_browser(spec: &LaunchSpec) -> Result<BrowserProcess> {
	let executable = match &spec.executable {
		Some(path) => path.display().to_string(),
		None => match spec.family {
			BrowserFamily::Chromium => find_chromium_executable(),
			BrowserFamily::Firefox => find_firefox_executable(),
		}
		.ok_or_else(|| Error::Launch(format!("could not find a {} executable; install one or pass its path", spec.family)))?,
	};

	std::fs::create_dir_all(&spec.profile_dir)?;
	if spec.family == BrowserFamily::Firefox {
		write_firefox_prefs(&spec.profile_dir)?;
	}

	let args = spec.args();
	debug!(target = "extdev", %executable, ?args, "launching browser");

	let mut cmd = Command::new(&executable);
	cmd.args(&args).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

	#[cfg(unix)]
	std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

	let child = cmd.spawn().map_err(|e| Error::Launch(format!("failed to start {executable}: {e}")))?;
	info!(target = "extdev", family = %spec.family, port = spec.port, pid = child.id(), "browser launched");

	Ok(BrowserProcess {
		child,
		family: spec.family,
		port: spec.port,
		executable,
	})
}
