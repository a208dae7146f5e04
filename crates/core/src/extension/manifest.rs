//! Reading an extension's own manifest and the browser profile's install records.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

/// The fields of a built manifest that identify the extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestInfo {
	/// Display name with any `__MSG_key__` placeholder resolved.
	pub name: String,
	/// Name exactly as written in the manifest.
	pub raw_name: String,
	pub version: String,
	pub default_locale: Option<String>,
	/// Background service worker or scripts named by the manifest.
	pub background_entries: Vec<String>,
}

impl ManifestInfo {
	/// Reads `manifest.json` from a built extension directory.
	pub fn read(dir: &Path) -> Result<Self> {
		let path = dir.join(MANIFEST_FILE);
		let text = fs::read_to_string(&path).map_err(|e| Error::Manifest {
			path: path.clone(),
			reason: e.to_string(),
		})?;
		let manifest: Value = serde_json::from_str(&text).map_err(|e| Error::Manifest {
			path: path.clone(),
			reason: e.to_string(),
		})?;

		let field = |key: &str| manifest.get(key).and_then(Value::as_str).map(str::to_string);
		let raw_name = field("name").ok_or_else(|| Error::Manifest {
			path: path.clone(),
			reason: "missing \"name\"".into(),
		})?;
		let version = field("version").unwrap_or_default();
		let default_locale = field("default_locale");

		let name = match (message_key(&raw_name), &default_locale) {
			(Some(key), Some(locale)) => resolve_message(dir, locale, key).unwrap_or_else(|| raw_name.clone()),
			_ => raw_name.clone(),
		};

		Ok(Self {
			name,
			raw_name,
			version,
			default_locale,
			background_entries: background_entries(&manifest),
		})
	}

	/// Returns `true` if a runtime-reported name refers to this manifest.
	pub fn matches_name(&self, name: &str) -> bool {
		name == self.name || name == self.raw_name
	}
}

/// Returns `key` for a `__MSG_key__` placeholder.
pub fn message_key(value: &str) -> Option<&str> {
	value
		.strip_prefix("__MSG_")
		.and_then(|rest| rest.strip_suffix("__"))
		.filter(|key| !key.is_empty())
}

/// Looks `key` up in `_locales/<locale>/messages.json`, ignoring key case.
pub fn resolve_message(dir: &Path, locale: &str, key: &str) -> Option<String> {
	let path = dir.join("_locales").join(locale).join("messages.json");
	let text = fs::read_to_string(&path).ok()?;
	let catalog: Value = serde_json::from_str(&text).ok()?;
	let entries = catalog.as_object()?;
	entries
		.iter()
		.find(|(name, _)| name.eq_ignore_ascii_case(key))
		.and_then(|(_, entry)| entry.get("message"))
		.and_then(Value::as_str)
		.map(str::to_string)
}

fn background_entries(manifest: &Value) -> Vec<String> {
	let Some(background) = manifest.get("background") else {
		return Vec::new();
	};
	let mut entries = Vec::new();
	for key in ["service_worker", "page"] {
		if let Some(entry) = background.get(key).and_then(Value::as_str) {
			entries.push(entry.to_string());
		}
	}
	if let Some(scripts) = background.get("scripts").and_then(Value::as_array) {
		entries.extend(scripts.iter().filter_map(Value::as_str).map(str::to_string));
	}
	entries
}

/// Path → extension id records the browser keeps for installed extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileHints {
	by_path: HashMap<PathBuf, String>,
}

impl ProfileHints {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, path: impl AsRef<Path>, id: impl Into<String>) {
		self.by_path.insert(normalize(path.as_ref()), id.into());
	}

	/// Id the browser assigned to the extension loaded from `path`.
	pub fn id_for_path(&self, path: &Path) -> Option<&str> {
		self.by_path.get(&normalize(path)).map(String::as_str)
	}

	pub fn is_empty(&self) -> bool {
		self.by_path.is_empty()
	}

	pub fn len(&self) -> usize {
		self.by_path.len()
	}

	/// Reads `extensions.settings.<id>.path` from a Chromium profile.
	///
	/// `profile` may be the user-data dir (its `Default` profile is used) or a
	/// profile directory itself. Unreadable files are skipped.
	pub fn from_profile(profile: &Path) -> Self {
		let mut hints = Self::new();
		let dirs = [profile.join("Default"), profile.to_path_buf()];
		for dir in dirs.iter().filter(|d| d.is_dir()) {
			for file in ["Secure Preferences", "Preferences"] {
				let path = dir.join(file);
				let Ok(text) = fs::read_to_string(&path) else {
					continue;
				};
				match serde_json::from_str::<Value>(&text) {
					Ok(prefs) => hints.merge_preferences(&prefs),
					Err(e) => debug!(target = "extdev.identity", path = %path.display(), error = %e, "unreadable preferences"),
				}
			}
		}
		hints
	}

	/// Adds every absolute extension path found in a preferences document.
	pub fn merge_preferences(&mut self, prefs: &Value) {
		let Some(settings) = prefs.pointer("/extensions/settings").and_then(Value::as_object) else {
			return;
		};
		for (id, entry) in settings {
			let Some(path) = entry.get("path").and_then(Value::as_str) else {
				continue;
			};
			let path = Path::new(path);
			if path.is_absolute() {
				self.insert(path, id.clone());
			}
		}
	}
}

/// Lexical normalization: drops `.` components, resolves `..`, strips trailing separators.
pub(crate) fn normalize(path: &Path) -> PathBuf {
	let mut out = PathBuf::new();
	for component in path.components() {
		match component {
			Component::CurDir => {}
			Component::ParentDir => {
				out.pop();
			}
			other => out.push(other.as_os_str()),
		}
	}
	out
}
