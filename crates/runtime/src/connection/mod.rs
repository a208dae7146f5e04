//! Request/response correlation over a transport.
//!
//! [`Connection`] is shared by both protocol families. It handles:
//! - Generating monotonically increasing request ids
//! - Correlating replies with pending requests (by id, or per actor for RDP)
//! - Per-request timeouts that name the offending method
//! - Rejecting every in-flight request when the transport closes
//! - Broadcasting unsolicited events to any number of subscribers
//!
//! # Message Flow
//!
//! 1. Caller invokes a protocol-specific `send`/`request`
//! 2. Connection assigns an id and registers a resolver in [`PendingRequests`]
//! 3. The encoded message is queued for the writer task
//! 4. The dispatch task hands each inbound message to [`Protocol::route`]
//! 5. Replies resolve their pending entry, events go to the broadcast channel
//! 6. The caller's future completes, or fails with `TimedOut`/`Closed`


pub mod cdp;
pub mod pending;
pub mod rdp;

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub use self::cdp::Cdp;
pub use self::pending::{PendingRequests, RouteMatch};
pub use self::rdp::Rdp;
use crate::error::{Error, Result};
use crate::transport::TransportParts;

/// CDP connection over a WebSocket.
pub type CdpConnection = Connection<Cdp>;

/// RDP connection over a framed TCP socket.
pub type RdpConnection = Connection<Rdp>;

/// Protocol-specific routing of inbound messages.
pub trait Protocol: Send + Sync + 'static {
	/// Unsolicited notification type.
	type Event: Clone + Send + std::fmt::Debug + 'static;

	/// Short protocol name for diagnostics.
	const NAME: &'static str;

	/// Classifies one inbound message.
	fn route(&self, message: Value, pending: &PendingRequests) -> Inbound<Self::Event>;
}

/// What to do with an inbound message.
#[derive(Debug)]
pub enum Inbound<E> {
	/// Resolve the pending request `id`.
	Reply { id: u64, result: Result<Value> },
	/// Publish to event subscribers.
	Event(E),
	/// Drop silently.
	Discard,
}

/// Tunables for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
	/// Default per-request timeout.
	pub request_timeout: Duration,
	/// Timeout for establishing the transport.
	pub connect_timeout: Duration,
	/// Events buffered per subscriber before it starts lagging.
	pub event_capacity: usize,
}

impl Default for ConnectionOptions {
	fn default() -> Self {
		Self {
			request_timeout: Duration::from_secs(10),
			connect_timeout: Duration::from_secs(5),
			event_capacity: 1024,
		}
	}
}

enum Outbound {
	Message(Value),
	Close,
}

type EventSender<E> = Arc<Mutex<Option<broadcast::Sender<E>>>>;

/// RAII guard removing a pending entry when a request future is dropped early.
struct CancelGuard {
	id: u64,
	pending: Arc<PendingRequests>,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u64, pending: Arc<PendingRequests>) -> Self {
		Self {
			id,
			pending,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if !self.completed && self.pending.remove(self.id).is_some() {
			debug!(target = "extdev", id = self.id, "removed cancelled request");
		}
	}
}

/// Duplex protocol connection to one browser instance.
pub struct Connection<P: Protocol> {
	address: String,
	last_id: AtomicU64,
	pending: Arc<PendingRequests>,
	outbound_tx: mpsc::UnboundedSender<Outbound>,
	events: EventSender<P::Event>,
	alive: Arc<AtomicBool>,
	options: ConnectionOptions,
	reader: Mutex<Option<JoinHandle<()>>>,
	_protocol: PhantomData<fn() -> P>,
}

impl<P: Protocol> Connection<P> {
	/// Starts the reader, writer and dispatch tasks over `parts`.
	///
	/// Also returns a receiver subscribed before any message is read, so the
	/// very first event cannot be missed.
	pub fn start(parts: TransportParts, protocol: P, options: ConnectionOptions) -> (Arc<Self>, broadcast::Receiver<P::Event>) {
		let TransportParts {
			mut sender,
			receiver,
			mut message_rx,
			address,
		} = parts;

		let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
		let (event_tx, first_rx) = broadcast::channel(options.event_capacity.max(1));
		let events: EventSender<P::Event> = Arc::new(Mutex::new(Some(event_tx)));
		let pending = Arc::new(PendingRequests::new());
		let alive = Arc::new(AtomicBool::new(true));

		let reader = tokio::spawn({
			let address = address.clone();
			async move {
				if let Err(e) = receiver.run().await {
					warn!(target = "extdev", %address, error = %e, "transport read error");
				}
			}
		});

		tokio::spawn({
			let address = address.clone();
			async move {
				while let Some(outbound) = outbound_rx.recv().await {
					match outbound {
						Outbound::Message(message) => {
							if let Err(e) = sender.send(message).await {
								warn!(target = "extdev", %address, error = %e, "transport write error");
								break;
							}
						}
						Outbound::Close => {
							if let Err(e) = sender.close().await {
								debug!(target = "extdev", %address, error = %e, "error while closing transport");
							}
							break;
						}
					}
				}
			}
		});

		tokio::spawn({
			let address = address.clone();
			let pending = Arc::clone(&pending);
			let events = Arc::clone(&events);
			let alive = Arc::clone(&alive);
			async move {
				while let Some(message) = message_rx.recv().await {
					trace!(target = "extdev", protocol = P::NAME, %message, "inbound");
					match protocol.route(message, &pending) {
						Inbound::Reply { id, result } => {
							if !pending.resolve(id, result) {
								debug!(target = "extdev", id, "reply for a request that is no longer pending");
							}
						}
						Inbound::Event(event) => {
							if let Some(tx) = events.lock().as_ref() {
								let _ = tx.send(event);
							}
						}
						Inbound::Discard => {}
					}
				}

				alive.store(false, Ordering::SeqCst);
				events.lock().take();
				let rejected = pending.drain_closed();
				debug!(target = "extdev", %address, rejected, "connection closed");
			}
		});

		let connection = Arc::new(Self {
			address,
			last_id: AtomicU64::new(0),
			pending,
			outbound_tx,
			events,
			alive,
			options,
			reader: Mutex::new(Some(reader)),
			_protocol: PhantomData,
		});

		(connection, first_rx)
	}

	/// Peer address this connection was opened to.
	pub fn address(&self) -> &str {
		&self.address
	}

	pub fn options(&self) -> &ConnectionOptions {
		&self.options
	}

	/// Returns `false` once the transport has closed or [`close`](Self::close) was called.
	pub fn is_alive(&self) -> bool {
		self.alive.load(Ordering::SeqCst)
	}

	/// Number of requests still awaiting a reply.
	pub fn pending_count(&self) -> usize {
		self.pending.len()
	}

	/// Returns `true` if request `id` is still awaiting a reply.
	pub fn is_pending(&self, id: u64) -> bool {
		self.pending.contains(id)
	}

	/// Id that the next request will use.
	pub fn next_id(&self) -> u64 {
		self.last_id.load(Ordering::SeqCst) + 1
	}

	/// Subscribes to unsolicited events.
	///
	/// The receiver reports `Closed` once the connection goes away.
	pub fn subscribe(&self) -> broadcast::Receiver<P::Event> {
		match self.events.lock().as_ref() {
			Some(tx) => tx.subscribe(),
			None => broadcast::channel(1).1,
		}
	}

	/// Runs `handler` for every event on a background task.
	///
	/// Dispatch never blocks the read loop; a slow handler only lags its own
	/// subscription. Dropping the returned guard stops the task.
	pub fn on_event<F>(&self, handler: F) -> EventSubscription
	where
		F: Fn(P::Event) + Send + Sync + 'static,
	{
		let mut rx = self.subscribe();
		let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

		tokio::spawn(async move {
			loop {
				tokio::select! {
					result = rx.recv() => match result {
						Ok(event) => handler(event),
						Err(broadcast::error::RecvError::Lagged(n)) => {
							warn!(target = "extdev", dropped = n, "event handler lagged");
						}
						Err(broadcast::error::RecvError::Closed) => break,
					},
					_ = &mut cancel_rx => break,
				}
			}
		});

		EventSubscription { _cancel: cancel_tx }
	}

	/// Closes the connection and rejects every in-flight request with `Closed`.
	pub fn close(&self) {
		if !self.alive.swap(false, Ordering::SeqCst) {
			return;
		}
		let _ = self.outbound_tx.send(Outbound::Close);
		if let Some(reader) = self.reader.lock().take() {
			reader.abort();
		}
		self.events.lock().take();
		let rejected = self.pending.drain_closed();
		debug!(target = "extdev", address = %self.address, rejected, "connection closed locally");
	}

	/// Issues one request and waits for its correlated reply.
	///
	/// `encode` receives the assigned id and builds the wire message.
	pub(crate) async fn call<F>(&self, method: &str, route: Option<&str>, timeout: Duration, encode: F) -> Result<Value>
	where
		F: FnOnce(u64) -> Result<Value>,
	{
		if !self.is_alive() {
			return Err(Error::Closed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
		let deadline = tokio::time::Instant::now() + timeout;
		let mut rx = self.pending.insert(id, method, route, deadline);
		let mut guard = CancelGuard::new(id, Arc::clone(&self.pending));

		let message = encode(id)?;
		debug!(target = "extdev", protocol = P::NAME, id, method, route, "request");

		if self.outbound_tx.send(Outbound::Message(message)).is_err() {
			return Err(Error::Closed);
		}

		let outcome = tokio::time::timeout(timeout, &mut rx).await;
		guard.complete();

		match outcome {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(Error::Closed),
			Err(_) => match self.pending.remove(id) {
				Some(_) => Err(Error::TimedOut {
					method: method.to_string(),
					timeout_ms: timeout.as_millis() as u64,
				}),
				None => rx.try_recv().unwrap_or(Err(Error::Closed)),
			},
		}
	}
}

impl<P: Protocol> Drop for Connection<P> {
	fn drop(&mut self) {
		if let Some(reader) = self.reader.get_mut().take() {
			reader.abort();
		}
	}
}

/// Guard for an [`Connection::on_event`] handler task; dropping it stops the task.
pub struct EventSubscription {
	_cancel: oneshot::Sender<()>,
}

/// Waits on `rx` for the first event matching `predicate`.
///
/// Returns `None` on timeout or when the connection closes.
pub async fn wait_for_event<E, F>(rx: &mut broadcast::Receiver<E>, timeout: Duration, predicate: F) -> Option<E>
where
	E: Clone,
	F: Fn(&E) -> bool,
{
	tokio::time::timeout(timeout, async {
		loop {
			match rx.recv().await {
				Ok(event) if predicate(&event) => return Some(event),
				Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	})
	.await
	.ok()
	.flatten()
}
