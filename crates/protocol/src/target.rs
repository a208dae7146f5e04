//! Execution contexts exposed by a browser and the sessions attached to them.

use serde::{Deserialize, Serialize};

/// URL scheme of Chromium extension pages and workers.
pub const CHROME_EXTENSION_SCHEME: &str = "chrome-extension://";

/// URL scheme of Firefox extension pages.
pub const MOZ_EXTENSION_SCHEME: &str = "moz-extension://";

/// Kind of execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
	Page,
	ServiceWorker,
	BackgroundPage,
	Worker,
	SharedWorker,
	Iframe,
	Browser,
	/// Firefox tab or add-on described by an actor form.
	TabActor,
	#[serde(other)]
	Other,
}

impl TargetKind {
	/// Preference order when looking for a context that runs extension code.
	///
	/// Lower is better; `None` means the kind never hosts extension code.
	pub fn extension_rank(self) -> Option<u8> {
		match self {
			TargetKind::ServiceWorker => Some(0),
			TargetKind::BackgroundPage => Some(1),
			TargetKind::Worker => Some(2),
			TargetKind::Page => Some(3),
			_ => None,
		}
	}
}

impl std::fmt::Display for TargetKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			TargetKind::Page => "page",
			TargetKind::ServiceWorker => "service_worker",
			TargetKind::BackgroundPage => "background_page",
			TargetKind::Worker => "worker",
			TargetKind::SharedWorker => "shared_worker",
			TargetKind::Iframe => "iframe",
			TargetKind::Browser => "browser",
			TargetKind::TabActor => "tab_actor",
			TargetKind::Other => "other",
		};
		f.write_str(name)
	}
}

/// Raw `TargetInfo` as reported by `Target.getTargets` and target events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
	pub target_id: String,
	#[serde(rename = "type")]
	pub kind: TargetKind,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub attached: bool,
}

/// An attachable execution context, referenced by id only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
	pub id: String,
	pub kind: TargetKind,
	pub url: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub title: String,
	/// Console actor of a Firefox target, when known.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub console_actor: Option<String>,
}

impl Target {
	/// Returns `true` if the target runs under an extension origin.
	pub fn is_extension(&self) -> bool {
		is_extension_url(&self.url)
	}

	/// Extension id taken from the host part of an extension url.
	pub fn extension_id(&self) -> Option<&str> {
		extension_id_from_url(&self.url)
	}
}

impl From<TargetInfo> for Target {
	fn from(info: TargetInfo) -> Self {
		Self {
			id: info.target_id,
			kind: info.kind,
			url: info.url,
			title: info.title,
			console_actor: None,
		}
	}
}

/// Control-plane attachment to a target.
///
/// Page extraction and log streaming for the same page share one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
	pub session_id: String,
	pub target_id: String,
}

/// Returns `true` for urls served from an extension origin.
pub fn is_extension_url(url: &str) -> bool {
	url.starts_with(CHROME_EXTENSION_SCHEME) || url.starts_with(MOZ_EXTENSION_SCHEME)
}

/// Extracts the extension id (host) from an extension url.
pub fn extension_id_from_url(url: &str) -> Option<&str> {
	let rest = url
		.strip_prefix(CHROME_EXTENSION_SCHEME)
		.or_else(|| url.strip_prefix(MOZ_EXTENSION_SCHEME))?;
	let host = rest.split('/').next().unwrap_or(rest);
	(!host.is_empty()).then_some(host)
}
