//! Extension Controller: install, identify and reload the extension under development.

pub mod chromium;
pub mod firefox;
pub mod identity;
pub mod manifest;

use std::path::Path;

use async_trait::async_trait;

pub use self::chromium::ChromiumExtensions;
pub use self::firefox::{FirefoxAddons, InstalledAddon, is_companion_path};
pub use self::identity::{Candidate, ExtensionIdentity, IdentitySource, derive_extension_id};
pub use self::manifest::{ManifestInfo, ProfileHints};
use crate::error::Result;

/// Whether the attached browser implements a command, learned on first use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Capability {
	#[default]
	Unknown,
	Supported,
	Unsupported,
}

/// Operations shared by both browser families.
#[async_trait]
pub trait ExtensionController: Send + Sync {
	/// Installs the unpacked extension in `dir` and returns its id.
	async fn install(&self, dir: &Path) -> Result<String>;

	/// Reloads an installed extension in place.
	///
	/// Never fails the caller: `false` means every mechanism was tried and
	/// none worked.
	async fn force_reload(&self, extension_id: &str) -> bool;
}
