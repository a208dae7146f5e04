//! Debug-port allocation for concurrently running browser instances.
//!
//! Each named instance gets `base_port + offset`, where the offset is the
//! lowest one not held by another instance. The registry is an explicit
//! value handed to whoever launches browsers; it can optionally persist its
//! table as JSON so separate processes agree on allocations.

use std::fs;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::BrowserFamily;
use crate::error::Result;

/// Largest offset the registry will hand out.
const MAX_OFFSET: u16 = 512;

/// One allocated instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
	pub id: String,
	pub browser: BrowserFamily,
	pub offset: u16,
	pub port: u16,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub profile_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredTable {
	instances: Vec<InstanceRecord>,
}

/// Instance id → allocated port and profile.
#[derive(Debug)]
pub struct InstanceRegistry {
	base_port: u16,
	entries: DashMap<String, InstanceRecord>,
	/// Serializes offset selection with the insert that claims it.
	allocating: Mutex<()>,
	store: Option<PathBuf>,
}

impl InstanceRegistry {
	/// In-memory registry.
	pub fn new(base_port: u16) -> Self {
		Self {
			base_port,
			entries: DashMap::new(),
			allocating: Mutex::new(()),
			store: None,
		}
	}

	/// Registry backed by a JSON file. A missing file starts empty.
	pub fn load(path: impl Into<PathBuf>, base_port: u16) -> Result<Self> {
		let path = path.into();
		let registry = Self {
			base_port,
			entries: DashMap::new(),
			allocating: Mutex::new(()),
			store: Some(path.clone()),
		};

		if path.exists() {
			let table: StoredTable = serde_json::from_str(&fs::read_to_string(&path)?)?;
			for record in table.instances {
				registry.entries.insert(record.id.clone(), record);
			}
			debug!(target = "extdev", path = %path.display(), instances = registry.entries.len(), "loaded instance registry");
		}

		Ok(registry)
	}

	/// Default location of the persisted table.
	pub fn default_store() -> Option<PathBuf> {
		dirs::cache_dir().map(|dir| dir.join("extdev").join("instances.json"))
	}

	pub fn base_port(&self) -> u16 {
		self.base_port
	}

	/// Returns the existing record for `id`, or allocates the lowest free offset.
	pub fn allocate(&self, id: &str, browser: BrowserFamily) -> Option<InstanceRecord> {
		let _claim = self.allocating.lock();
		if let Some(existing) = self.entries.get(id) {
			return Some(existing.clone());
		}

		let taken: Vec<u16> = self.entries.iter().map(|entry| entry.offset).collect();
		let offset = (0..=MAX_OFFSET).find(|offset| !taken.contains(offset))?;
		let port = self.base_port.checked_add(offset)?;

		let record = InstanceRecord {
			id: id.to_string(),
			browser,
			offset,
			port,
			profile_dir: None,
		};
		let record = self.entries.entry(id.to_string()).or_insert(record).clone();
		debug!(target = "extdev", id, port = record.port, "allocated instance");
		Some(record)
	}

	/// Records the profile directory used by an instance.
	pub fn set_profile_dir(&self, id: &str, dir: &Path) {
		if let Some(mut record) = self.entries.get_mut(id) {
			record.profile_dir = Some(dir.to_path_buf());
		}
	}

	pub fn get(&self, id: &str) -> Option<InstanceRecord> {
		self.entries.get(id).map(|entry| entry.clone())
	}

	/// Frees an instance's offset.
	pub fn release(&self, id: &str) -> Option<InstanceRecord> {
		self.entries.remove(id).map(|(_, record)| record)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Writes the table back to its JSON file, if the registry has one.
	pub fn save(&self) -> Result<()> {
		let Some(path) = &self.store else {
			return Ok(());
		};
		let mut instances: Vec<InstanceRecord> = self.entries.iter().map(|entry| entry.clone()).collect();
		instances.sort_by_key(|record| record.offset);

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		fs::write(path, serde_json::to_string_pretty(&StoredTable { instances })?)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn allocation_is_stable_per_id() {
		let registry = InstanceRegistry::new(9222);
		let a = registry.allocate("default", BrowserFamily::Chromium).unwrap();
		let b = registry.allocate("feature-x", BrowserFamily::Chromium).unwrap();

		assert_eq!(a.port, 9222);
		assert_eq!(b.port, 9223);
		assert_eq!(registry.allocate("default", BrowserFamily::Chromium).unwrap(), a);
	}

	#[test]
	fn released_offsets_are_reused() {
		let registry = InstanceRegistry::new(6000);
		registry.allocate("a", BrowserFamily::Firefox);
		registry.allocate("b", BrowserFamily::Firefox);
		registry.release("a");

		let c = registry.allocate("c", BrowserFamily::Firefox).unwrap();
		assert_eq!(c.offset, 0);
		assert_eq!(c.port, 6000);
	}

	#[test]
	fn concurrent_allocations_get_distinct_ports() {
		let registry = InstanceRegistry::new(9400);
		let records: Vec<InstanceRecord> = std::thread::scope(|scope| {
			let handles: Vec<_> = (0..16)
				.map(|n| {
					let registry = &registry;
					scope.spawn(move || registry.allocate(&format!("instance-{n}"), BrowserFamily::Chromium).unwrap())
				})
				.collect();
			handles.into_iter().map(|handle| handle.join().unwrap()).collect()
		});

		let mut ports: Vec<u16> = records.iter().map(|record| record.port).collect();
		ports.sort_unstable();
		ports.dedup();
		assert_eq!(ports.len(), 16);
		assert_eq!(registry.len(), 16);
	}

	#[test]
	fn table_round_trips_through_disk() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("nested").join("instances.json");

		let registry = InstanceRegistry::load(&path, 9300).unwrap();
		assert!(registry.is_empty());
		registry.allocate("one", BrowserFamily::Chromium);
		registry.allocate("two", BrowserFamily::Firefox);
		registry.set_profile_dir("two", Path::new("/tmp/profile-two"));
		registry.save().unwrap();

		let reloaded = InstanceRegistry::load(&path, 9300).unwrap();
		assert_eq!(reloaded.len(), 2);
		let two = reloaded.get("two").unwrap();
		assert_eq!(two.port, 9301);
		assert_eq!(two.profile_dir.as_deref(), Some(Path::new("/tmp/profile-two")));
		assert_eq!(reloaded.allocate("three", BrowserFamily::Chromium).unwrap().port, 9302);
	}

	#[test]
	fn malformed_table_is_an_error() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("instances.json");
		fs::write(&path, "{ not json").unwrap();
		assert!(InstanceRegistry::load(&path, 9222).is_err());
	}
}
