//! Browser families and their debugging defaults.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which debugging protocol a browser speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserFamily {
	/// Chrome, Edge, Brave, Chromium: CDP over WebSocket.
	#[default]
	Chromium,
	/// Firefox: RDP over length-prefixed TCP.
	Firefox,
}

impl BrowserFamily {
	/// First port handed out by the instance registry.
	pub fn default_base_port(self) -> u16 {
		match self {
			BrowserFamily::Chromium => 9222,
			BrowserFamily::Firefox => 6000,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			BrowserFamily::Chromium => "chromium",
			BrowserFamily::Firefox => "firefox",
		}
	}
}

impl fmt::Display for BrowserFamily {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for BrowserFamily {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"chromium" | "chrome" | "edge" | "brave" => Ok(BrowserFamily::Chromium),
			"firefox" | "gecko" => Ok(BrowserFamily::Firefox),
			other => Err(format!("unknown browser family: {other}")),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_aliases() {
		assert_eq!("Chrome".parse::<BrowserFamily>().unwrap(), BrowserFamily::Chromium);
		assert_eq!("firefox".parse::<BrowserFamily>().unwrap(), BrowserFamily::Firefox);
		assert!("safari".parse::<BrowserFamily>().is_err());
	}

	#[test]
	fn serializes_lowercase() {
		assert_eq!(serde_json::to_string(&BrowserFamily::Firefox).unwrap(), "\"firefox\"");
	}
}
