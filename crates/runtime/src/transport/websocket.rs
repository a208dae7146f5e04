//! WebSocket transport for the Chrome DevTools Protocol.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, connect_async};
use tracing::{debug, warn};

use super::{BoxFuture, Transport, TransportParts, TransportReceiver};
use crate::error::{Error, Result};

/// Constructors for the WebSocket transport.
pub struct WebSocketTransport;

impl WebSocketTransport {
	/// Opens a WebSocket to a DevTools endpoint (`ws://host:port/devtools/...`).
	pub async fn connect(url: &str, timeout: Duration) -> Result<TransportParts> {
		let handshake = tokio::time::timeout(timeout, connect_async(url))
			.await
			.map_err(|_| Error::ConnectionFailed {
				address: url.to_string(),
				reason: format!("no WebSocket handshake within {}ms", timeout.as_millis()),
			})?;
		let (stream, _response) = handshake.map_err(|e| Error::ConnectionFailed {
			address: url.to_string(),
			reason: e.to_string(),
		})?;

		debug!(target = "extdev", url, "devtools websocket connected");
		Ok(Self::from_stream(stream, url))
	}

	/// Wraps an already-established WebSocket stream.
	pub fn from_stream<S>(stream: WebSocketStream<S>, address: impl Into<String>) -> TransportParts
	where
		S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
	{
		let (sink, stream) = stream.split();
		let (message_tx, message_rx) = mpsc::unbounded_channel();

		TransportParts {
			sender: Box::new(WebSocketTransportSender { sink }),
			receiver: Box::new(WebSocketTransportReceiver { stream, message_tx }),
			message_rx,
			address: address.into(),
		}
	}
}

/// Outbound half: one text frame per message.
pub struct WebSocketTransportSender<S> {
	sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> Transport for WebSocketTransportSender<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			self.sink.send(Message::Text(text)).await.map_err(|e| Error::Transport(e.to_string()))
		})
	}

	fn close(&mut self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move { self.sink.close().await.map_err(|e| Error::Transport(e.to_string())) })
	}
}

/// Inbound half: decodes text and binary frames as JSON.
pub struct WebSocketTransportReceiver<S> {
	stream: SplitStream<WebSocketStream<S>>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<S> WebSocketTransportReceiver<S> {
	/// Forwards one frame; returns `false` once nobody is listening.
	fn forward(&self, bytes: &[u8]) -> bool {
		match serde_json::from_slice::<Value>(bytes) {
			Ok(value) => self.message_tx.send(value).is_ok(),
			Err(e) => {
				warn!(target = "extdev", error = %e, "dropping undecodable devtools frame");
				true
			}
		}
	}
}

impl<S> TransportReceiver for WebSocketTransportReceiver<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	fn run(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			let mut this = *self;
			while let Some(frame) = this.stream.next().await {
				let keep_going = match frame {
					Ok(Message::Text(text)) => this.forward(text.as_bytes()),
					Ok(Message::Binary(bytes)) => this.forward(&bytes),
					Ok(Message::Close(frame)) => {
						debug!(target = "extdev", ?frame, "devtools websocket closed by peer");
						false
					}
					Ok(_) => true,
					Err(e) => return Err(Error::Transport(e.to_string())),
				};
				if !keep_going {
					break;
				}
			}
			Ok(())
		})
	}
}
