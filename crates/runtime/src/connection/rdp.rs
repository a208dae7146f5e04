//! RDP routing: replies carry no id, so each actor's replies are matched to
//! its requests in send order.

use std::sync::Arc;
use std::time::Duration;

use extdev_protocol::rdp::{RdpPacket, RdpRequest};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Connection, ConnectionOptions, Inbound, PendingRequests, Protocol, RouteMatch};
use crate::error::{Error, Result};
use crate::transport::TransportParts;
use crate::transport::framed::FramedTransport;

/// Router for Firefox Remote Debugging Protocol packets.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rdp;

impl Protocol for Rdp {
	type Event = RdpPacket;

	const NAME: &'static str = "rdp";

	fn route(&self, message: Value, pending: &PendingRequests) -> Inbound<RdpPacket> {
		let packet = match serde_json::from_value::<RdpPacket>(message) {
			Ok(packet) => packet,
			Err(e) => {
				debug!(target = "extdev", error = %e, "ignoring packet without a source actor");
				return Inbound::Discard;
			}
		};

		if packet.is_unsolicited() {
			return Inbound::Event(packet);
		}

		match pending.take_route(&packet.from) {
			RouteMatch::Pending(id) => {
				let result = match &packet.error {
					Some(error) => Err(Error::Actor {
						actor: packet.from.clone(),
						error: error.clone(),
						message: packet.error_message().unwrap_or_default().to_string(),
					}),
					None => Ok(packet.into_value()),
				};
				Inbound::Reply { id, result }
			}
			RouteMatch::Stale(id) => {
				debug!(target = "extdev", id, actor = %packet.from, "discarding reply to timed-out request");
				Inbound::Discard
			}
			RouteMatch::Unmatched => Inbound::Event(packet),
		}
	}
}

impl Connection<Rdp> {
	/// Connects to a Firefox debugger server and waits for the root greeting.
	pub async fn connect(host: &str, port: u16, options: ConnectionOptions) -> Result<Arc<Self>> {
		let parts = FramedTransport::connect(host, port, options.connect_timeout).await?;
		Self::handshake(parts, options).await
	}

	/// Starts over an established transport and waits for the root greeting.
	pub async fn handshake(parts: TransportParts, options: ConnectionOptions) -> Result<Arc<Self>> {
		let address = parts.address.clone();
		let greeting_timeout = options.connect_timeout;
		let (connection, mut events) = Self::start(parts, Rdp, options);

		let greeting = tokio::time::timeout(greeting_timeout, async {
			loop {
				match events.recv().await {
					Ok(packet) if packet.is_greeting() => return Some(packet),
					Ok(packet) => debug!(target = "extdev", from = %packet.from, "packet before greeting"),
					Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
					Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
				}
			}
		})
		.await;

		match greeting {
			Ok(Some(packet)) => {
				debug!(
					target = "extdev",
					%address,
					application = packet.get("applicationType").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
					"debugger server greeted"
				);
				Ok(connection)
			}
			Ok(None) => Err(Error::ConnectionFailed {
				address,
				reason: "closed before greeting".into(),
			}),
			Err(_) => {
				warn!(target = "extdev", %address, "no greeting from debugger server");
				connection.close();
				Err(Error::ConnectionFailed {
					address,
					reason: format!("no greeting within {}ms", greeting_timeout.as_millis()),
				})
			}
		}
	}

	/// Sends `type` to actor `to` with the default timeout.
	pub async fn request(&self, to: &str, kind: &str, params: Value) -> Result<Value> {
		let timeout = self.options().request_timeout;
		self.request_with_timeout(to, kind, params, timeout).await
	}

	/// Sends `type` to actor `to` with an explicit timeout.
	pub async fn request_with_timeout(&self, to: &str, kind: &str, params: Value, timeout: Duration) -> Result<Value> {
		self.call(kind, Some(to), timeout, |_id| Ok(serde_json::to_value(RdpRequest::new(to, kind, params))?))
			.await
	}
}
