//! Deciding which extension id belongs to the extension under development.
//!
//! The browser may host several extensions at once (the user's plus a
//! companion that drives reloads), and two of them can report the same
//! name and version. Profile install records are authoritative; otherwise a
//! unique name/version match decides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::manifest::{ManifestInfo, ProfileHints, normalize};

/// Script that asks an extension context for its own identity.
pub const IDENTITY_SCRIPT: &str = r#"(() => {
	const runtime = (globalThis.chrome && chrome.runtime) || (globalThis.browser && browser.runtime);
	if (!runtime || !runtime.getManifest) return null;
	const manifest = runtime.getManifest();
	return { id: runtime.id, name: manifest.name, version: manifest.version };
})()"#;

/// One extension as seen from inside the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
	pub id: String,
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub version: Option<String>,
	/// On-disk path, when the browser reports one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<PathBuf>,
}

/// How an identity was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentitySource {
	/// Matched the profile's path → id install record.
	ProfilePreferences,
	/// Matched the runtime-evaluated name and version.
	Runtime,
}

/// The derived id of the user's extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionIdentity {
	pub id: String,
	pub name: Option<String>,
	pub version: Option<String>,
	pub source: IdentitySource,
}

/// Picks the user's extension among `candidates`.
///
/// Returns `None` when nothing matches or the match is ambiguous; callers
/// treat that as "not known yet".
pub fn derive_extension_id(candidates: &[Candidate], expected: &ManifestInfo, output_dir: &Path, hints: &ProfileHints) -> Option<ExtensionIdentity> {
	let hinted = hints.id_for_path(output_dir);

	if let Some(candidate) = hinted.and_then(|id| candidates.iter().find(|c| c.id == id)) {
		return Some(identity(candidate, IdentitySource::ProfilePreferences));
	}

	let mut matches: Vec<&Candidate> = candidates
		.iter()
		.filter(|c| c.name.as_deref().is_some_and(|n| expected.matches_name(n)) && c.version.as_deref() == Some(expected.version.as_str()))
		.collect();
	matches.sort_by(|a, b| a.id.cmp(&b.id));
	matches.dedup_by(|a, b| a.id == b.id);

	match matches.as_slice() {
		[only] => Some(identity(only, IdentitySource::Runtime)),
		[] => hinted.map(|id| ExtensionIdentity {
			id: id.to_string(),
			name: None,
			version: None,
			source: IdentitySource::ProfilePreferences,
		}),
		tied => tied
			.iter()
			.find(|c| c.path.as_deref().is_some_and(|p| same_path(p, output_dir)))
			.map(|c| identity(c, IdentitySource::ProfilePreferences)),
	}
}

fn identity(candidate: &Candidate, source: IdentitySource) -> ExtensionIdentity {
	ExtensionIdentity {
		id: candidate.id.clone(),
		name: candidate.name.clone(),
		version: candidate.version.clone(),
		source,
	}
}

fn same_path(a: &Path, b: &Path) -> bool {
	normalize(a) == normalize(b)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn manifest(name: &str, version: &str) -> ManifestInfo {
		ManifestInfo {
			name: name.into(),
			raw_name: name.into(),
			version: version.into(),
			default_locale: None,
			background_entries: Vec::new(),
		}
	}

	fn candidate(id: &str, name: &str, version: &str) -> Candidate {
		Candidate {
			id: id.into(),
			name: Some(name.into()),
			version: Some(version.into()),
			path: None,
		}
	}

	#[test]
	fn unique_name_and_version_wins() {
		let candidates = [candidate("manager", "Extension Manager", "0.1.0"), candidate("abc", "Demo", "1.0.0")];
		let id = derive_extension_id(&candidates, &manifest("Demo", "1.0.0"), Path::new("/work/dist"), &ProfileHints::new()).unwrap();
		assert_eq!(id.id, "abc");
		assert_eq!(id.source, IdentitySource::Runtime);
	}

	#[test]
	fn profile_path_breaks_ties() {
		let candidates = [candidate("first", "Demo", "1.0.0"), candidate("second", "Demo", "1.0.0")];
		let mut hints = ProfileHints::new();
		hints.insert("/work/dist/chrome", "second");

		let id = derive_extension_id(&candidates, &manifest("Demo", "1.0.0"), Path::new("/work/dist/chrome"), &hints).unwrap();
		assert_eq!(id.id, "second");
		assert_eq!(id.source, IdentitySource::ProfilePreferences);
	}

	#[test]
	fn profile_path_beats_name_match() {
		let candidates = [candidate("byname", "Demo", "1.0.0"), candidate("bypath", "Renamed", "9.9.9")];
		let mut hints = ProfileHints::new();
		hints.insert("/work/dist", "bypath");

		let id = derive_extension_id(&candidates, &manifest("Demo", "1.0.0"), Path::new("/work/dist"), &hints).unwrap();
		assert_eq!(id.id, "bypath");
	}

	#[test]
	fn unresolved_tie_is_unknown() {
		let candidates = [candidate("first", "Demo", "1.0.0"), candidate("second", "Demo", "1.0.0")];
		assert!(derive_extension_id(&candidates, &manifest("Demo", "1.0.0"), Path::new("/work/dist"), &ProfileHints::new()).is_none());
	}

	#[test]
	fn duplicate_targets_of_one_extension_are_not_a_tie() {
		let candidates = [candidate("abc", "Demo", "1.0.0"), candidate("abc", "Demo", "1.0.0")];
		let id = derive_extension_id(&candidates, &manifest("Demo", "1.0.0"), Path::new("/work/dist"), &ProfileHints::new());
		assert_eq!(id.map(|i| i.id).as_deref(), Some("abc"));
	}

	#[test]
	fn version_mismatch_is_not_a_match() {
		let candidates = [candidate("abc", "Demo", "0.9.0")];
		assert!(derive_extension_id(&candidates, &manifest("Demo", "1.0.0"), Path::new("/work/dist"), &ProfileHints::new()).is_none());
	}

	#[test]
	fn candidate_path_resolves_tie_without_profile() {
		let mut first = candidate("first", "Demo", "1.0.0");
		first.path = Some(PathBuf::from("/elsewhere"));
		let mut second = candidate("second", "Demo", "1.0.0");
		second.path = Some(PathBuf::from("/work/dist/"));

		let id = derive_extension_id(&[first, second], &manifest("Demo", "1.0.0"), Path::new("/work/dist"), &ProfileHints::new()).unwrap();
		assert_eq!(id.id, "second");
	}
}
