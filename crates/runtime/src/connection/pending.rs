//! In-flight request table.
//!
//! Every mutation goes through one mutex so a reply, a timeout and a close
//! can never all resolve the same entry: whoever removes the entry first owns
//! its resolver.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{Error, Result};

struct PendingEntry {
	method: Arc<str>,
	route: Option<Arc<str>>,
	deadline: Instant,
	resolver: oneshot::Sender<Result<Value>>,
}

/// Outcome of matching an unaddressed reply against a route queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMatch {
	/// The reply belongs to this pending request.
	Pending(u64),
	/// The reply belongs to a request that already timed out; discard it.
	Stale(u64),
	/// Nothing is waiting on this route.
	Unmatched,
}

#[derive(Default)]
struct Table {
	entries: HashMap<u64, PendingEntry>,
	/// Per-route FIFO of request ids, for protocols whose replies carry no id.
	routes: HashMap<Arc<str>, VecDeque<u64>>,
}

/// Request id → {method, deadline, resolver}.
#[derive(Default)]
pub struct PendingRequests {
	table: Mutex<Table>,
}

impl PendingRequests {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a request and returns the receiver its reply will arrive on.
	pub fn insert(&self, id: u64, method: &str, route: Option<&str>, deadline: Instant) -> oneshot::Receiver<Result<Value>> {
		let (resolver, rx) = oneshot::channel();
		let route: Option<Arc<str>> = route.map(Arc::from);
		let mut table = self.table.lock();
		if let Some(route) = &route {
			table.routes.entry(Arc::clone(route)).or_default().push_back(id);
		}
		table.entries.insert(
			id,
			PendingEntry {
				method: Arc::from(method),
				route,
				deadline,
				resolver,
			},
		);
		rx
	}

	/// Delivers a result. Returns `false` if the id was not pending.
	pub fn resolve(&self, id: u64, result: Result<Value>) -> bool {
		let entry = {
			let mut table = self.table.lock();
			let entry = table.entries.remove(&id);
			if let Some(route) = entry.as_ref().and_then(|e| e.route.clone()) {
				remove_from_route(&mut table, &route, id);
			}
			entry
		};

		match entry {
			Some(entry) => {
				let _ = entry.resolver.send(result);
				true
			}
			None => false,
		}
	}

	/// Removes a request without resolving it (timeout or cancellation).
	///
	/// Returns its method name if it was still pending. A routed request
	/// leaves its id in the route queue so the late reply is recognised as
	/// stale instead of being handed to the next request on that route.
	pub fn remove(&self, id: u64) -> Option<Arc<str>> {
		self.table.lock().entries.remove(&id).map(|entry| entry.method)
	}

	/// Pops the oldest request waiting on `route`.
	pub fn take_route(&self, route: &str) -> RouteMatch {
		let mut table = self.table.lock();
		let Some(queue) = table.routes.get_mut(route) else {
			return RouteMatch::Unmatched;
		};
		let Some(id) = queue.pop_front() else {
			return RouteMatch::Unmatched;
		};
		if queue.is_empty() {
			table.routes.remove(route);
		}
		if table.entries.contains_key(&id) {
			RouteMatch::Pending(id)
		} else {
			RouteMatch::Stale(id)
		}
	}

	/// Returns `true` if a request is queued on `route`, stale or not.
	pub fn has_route(&self, route: &str) -> bool {
		self.table.lock().routes.get(route).is_some_and(|q| !q.is_empty())
	}

	/// Rejects every in-flight request with [`Error::Closed`]. Returns how many were rejected.
	pub fn drain_closed(&self) -> usize {
		let entries: Vec<PendingEntry> = {
			let mut table = self.table.lock();
			table.routes.clear();
			table.entries.drain().map(|(_, entry)| entry).collect()
		};
		let count = entries.len();
		for entry in entries {
			let _ = entry.resolver.send(Err(Error::Closed));
		}
		count
	}

	pub fn len(&self) -> usize {
		self.table.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn contains(&self, id: u64) -> bool {
		self.table.lock().entries.contains_key(&id)
	}

	/// Method and deadline of a pending request.
	pub fn describe(&self, id: u64) -> Option<(Arc<str>, Instant)> {
		self.table.lock().entries.get(&id).map(|entry| (Arc::clone(&entry.method), entry.deadline))
	}
}

fn remove_from_route(table: &mut Table, route: &Arc<str>, id: u64) {
	if let Some(queue) = table.routes.get_mut(route) {
		queue.retain(|queued| *queued != id);
		if queue.is_empty() {
			table.routes.remove(route);
		}
	}
}
